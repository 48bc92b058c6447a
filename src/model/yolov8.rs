// 该文件是 Bingzao （病灶） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 检测模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{path::PathBuf, sync::Mutex};

use ndarray::{ArrayViewD, Axis};
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  DEFAULT_CONFIDENCE, FromUrl, FromUrlWithScheme,
  frame::{Letterbox, RgbFrame, RgbNchwFrame},
  model::{DetectItem, DetectResult, LabelTable, Model},
  url_file_path,
};

const YOLOV8_NUM_INPUTS: usize = 1;
const YOLOV8_NUM_OUTPUTS: usize = 1;
const YOLOV8_BOX_ROWS: usize = 4;
const YOLOV8_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLOV8_DEFAULT_IOU: f32 = 0.7;
const YOLOV8_DEFAULT_MAX_DET: usize = 300;

#[derive(Error, Debug)]
pub enum YoloV8Error {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型读取错误: {0}")]
  ModelReadError(#[from] std::io::Error),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出形状无效: {0:?}")]
  InvalidOutput(Vec<usize>),
  #[error("类别编号 {0} 不在类别名称表中")]
  UnknownClass(u32),
  #[error("推理会话不可用")]
  SessionPoisoned,
}

/// 后处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloV8Params {
  pub confidence: f32,
  pub iou: f32,
  pub max_detections: usize,
}

impl Default for YoloV8Params {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE,
      iou: YOLOV8_DEFAULT_IOU,
      max_detections: YOLOV8_DEFAULT_MAX_DET,
    }
  }
}

pub struct YoloV8 {
  session: Mutex<Session>,
  input_name: String,
  input_width: u32,
  input_height: u32,
  labels: LabelTable,
  params: YoloV8Params,
}

impl std::fmt::Debug for YoloV8 {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("YoloV8")
      .field("input_name", &self.input_name)
      .field("input_width", &self.input_width)
      .field("input_height", &self.input_height)
      .field("labels", &self.labels)
      .field("params", &self.params)
      .finish_non_exhaustive()
  }
}

pub struct YoloV8Builder {
  model_path: PathBuf,
  params: YoloV8Params,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for YoloV8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for YoloV8Builder {
  type Error = YoloV8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloV8Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(YoloV8Builder {
      model_path: url_file_path(url),
      params: YoloV8Params::default(),
      intra_threads: None,
    })
  }
}

impl YoloV8Builder {
  /// 非有限值被忽略，保留原阈值
  pub fn confidence(mut self, confidence: f32) -> Self {
    if confidence.is_finite() {
      self.params.confidence = confidence.clamp(0.0, 1.0);
    } else {
      warn!("忽略无效置信度阈值: {}", confidence);
    }
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    if iou.is_finite() {
      self.params.iou = iou.clamp(0.0, 1.0);
    } else {
      warn!("忽略无效 NMS 阈值: {}", iou);
    }
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.params.max_detections = max_detections;
    self
  }

  pub fn intra_threads(mut self, intra_threads: Option<usize>) -> Self {
    self.intra_threads = intra_threads;
    self
  }

  pub fn build(self) -> Result<YoloV8, YoloV8Error> {
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(YoloV8Error::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let mut builder = Session::builder()
      .map_err(|e| YoloV8Error::ModelLoadError(e.to_string()))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| YoloV8Error::ModelLoadError(e.to_string()))?;
    if let Some(threads) = self.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(|e| YoloV8Error::ModelLoadError(e.to_string()))?;
    }
    let session = builder
      .commit_from_memory(&model_data)
      .map_err(|e| YoloV8Error::ModelLoadError(e.to_string()))?;

    let num_inputs = session.inputs.len();
    let num_outputs = session.outputs.len();
    if num_inputs != YOLOV8_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV8_NUM_INPUTS, num_inputs
      );
      return Err(YoloV8Error::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV8_NUM_INPUTS, num_inputs
      )));
    }
    if num_outputs != YOLOV8_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        YOLOV8_NUM_OUTPUTS, num_outputs
      );
      return Err(YoloV8Error::ModelInvalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        YOLOV8_NUM_OUTPUTS, num_outputs
      )));
    }
    let input_name = session.inputs[0].name.clone();
    debug!("模型输入: {}, 模型输出: {}", input_name, session.outputs[0].name);

    let (names, imgsz) = {
      let metadata = session
        .metadata()
        .map_err(|e| YoloV8Error::ModelInvalid(format!("无法读取模型元数据: {}", e)))?;
      (
        metadata.custom("names").ok().flatten(),
        metadata.custom("imgsz").ok().flatten(),
      )
    };

    let labels = names
      .ok_or_else(|| YoloV8Error::ModelInvalid("模型元数据缺少类别名称 names".to_string()))
      .and_then(|names| {
        LabelTable::parse_metadata(&names).map_err(|e| YoloV8Error::ModelInvalid(e.to_string()))
      })?;
    info!("模型类别数量: {}", labels.len());

    let (input_height, input_width) = match imgsz.as_deref().and_then(parse_imgsz) {
      Some(size) => size,
      None => {
        warn!(
          "模型元数据缺少输入尺寸, 使用默认值 {}",
          YOLOV8_DEFAULT_INPUT_SIZE
        );
        (YOLOV8_DEFAULT_INPUT_SIZE, YOLOV8_DEFAULT_INPUT_SIZE)
      }
    };
    debug!("模型输入尺寸: {}x{}", input_width, input_height);
    info!("模型加载完成");

    Ok(YoloV8 {
      session: Mutex::new(session),
      input_name,
      input_width,
      input_height,
      labels,
      params: self.params,
    })
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImgSz {
  Square(u32),
  Dims(Vec<u32>),
}

/// 解析 `[640, 640]` 或 `640` 形式的输入尺寸，返回 (高, 宽)
fn parse_imgsz(text: &str) -> Option<(u32, u32)> {
  let dims = match serde_yaml::from_str::<ImgSz>(text).ok()? {
    ImgSz::Square(side) => vec![side, side],
    ImgSz::Dims(dims) => dims,
  };
  match dims.as_slice() {
    [side] if *side > 0 => Some((*side, *side)),
    [h, w] if *h > 0 && *w > 0 => Some((*h, *w)),
    _ => None,
  }
}

impl YoloV8 {
  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.input_width, self.input_height)
  }
}

impl Model for YoloV8 {
  type Input = RgbFrame;
  type Output = DetectResult;
  type Error = YoloV8Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("预处理输入图像");
    let frame = RgbNchwFrame::letterbox(input.image(), self.input_width, self.input_height);
    let letterbox = *frame.letterbox_info();
    let tensor = Tensor::from_array(frame.into_tensor())
      .map_err(|e| YoloV8Error::InferenceError(e.to_string()))?;

    debug!("执行模型推理");
    let output = {
      let mut session = self
        .session
        .lock()
        .map_err(|_| YoloV8Error::SessionPoisoned)?;
      let outputs = session
        .run(ort::inputs![&self.input_name => tensor])
        .map_err(|e| YoloV8Error::InferenceError(e.to_string()))?;
      outputs[0]
        .try_extract_array::<f32>()
        .map_err(|e| YoloV8Error::InferenceError(e.to_string()))?
        .to_owned()
    };
    debug!("模型输出形状: {:?}", output.shape());

    decode_predictions(output.view(), &letterbox, &self.labels, &self.params)
  }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

/// 解码形状为 `[1, 4 + 类别数, 锚点数]` 的输出。
///
/// 每个锚点取得分最高的类别，保留得分不低于阈值者，按类别做 NMS，
/// 最后把框映射回原图并按置信度降序返回。
pub fn decode_predictions(
  output: ArrayViewD<f32>,
  letterbox: &Letterbox,
  labels: &LabelTable,
  params: &YoloV8Params,
) -> Result<DetectResult, YoloV8Error> {
  let shape = output.shape().to_vec();
  if shape.len() != 3 || shape[0] != 1 || shape[1] != YOLOV8_BOX_ROWS + labels.len() {
    error!(
      "模型输出形状 {:?} 与类别数量 {} 不匹配",
      shape,
      labels.len()
    );
    return Err(YoloV8Error::InvalidOutput(shape));
  }
  let predictions = output.index_axis(Axis(0), 0);
  let num_anchors = shape[2];

  let mut candidates = Vec::new();
  for anchor in 0..num_anchors {
    let column = predictions.index_axis(Axis(1), anchor);

    let mut score = f32::MIN;
    let mut class_id = 0usize;
    for c in 0..labels.len() {
      let s = column[YOLOV8_BOX_ROWS + c];
      if s > score {
        score = s;
        class_id = c;
      }
    }

    if score.is_nan() || score < params.confidence {
      continue;
    }

    let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
    candidates.push(Candidate {
      class_id: class_id as u32,
      score: score.clamp(0.0, 1.0),
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }
  debug!("阈值筛选后候选框数量: {}", candidates.len());

  let kept = nms(candidates, params.iou, params.max_detections);

  let items = kept
    .into_iter()
    .map(|c| {
      let label = labels
        .get(c.class_id)
        .cloned()
        .ok_or(YoloV8Error::UnknownClass(c.class_id))?;
      Ok(DetectItem {
        class_id: c.class_id,
        label,
        score: c.score,
        bbox: letterbox.unmap(c.bbox),
      })
    })
    .collect::<Result<Vec<_>, YoloV8Error>>()?;

  debug!("检测到 {} 个目标", items.len());
  Ok(DetectResult::from(items))
}

/// 按类别的非极大值抑制，结果按置信度降序
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
  candidates.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if kept.len() >= max_detections {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}
