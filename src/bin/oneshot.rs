// 该文件是 Bingzao （病灶） 项目的一部分。
// src/bin/oneshot.rs - 单张图像检测
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use bingzao::{
  DEFAULT_CONFIDENCE, FromUrl,
  input::ImageFileInput,
  model::YoloV8Builder,
  output::{SaveImageFileOutput, draw::Draw},
  parse_threshold,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 对单张图像运行检测并保存标注结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// YOLOv8 ONNX 模型路径
  #[arg(long, value_name = "MODEL", default_value = "yolov8:best.onnx")]
  pub model: Url,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 标注图像输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD", value_parser = parse_threshold)]
  pub confidence: f32,
  /// 标签字体文件
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  bingzao::init_tracing();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let model = YoloV8Builder::from_url(&args.model)?
    .confidence(args.confidence)
    .build()?;
  let input = ImageFileInput::from_url(&args.input)?;
  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None => Draw::default(),
  };
  let output = SaveImageFileOutput::from_url(&args.output)?.with_draw(draw);

  let report = OneShotTask.run_task(input, &model, &output)?;
  println!("{}", report);

  Ok(())
}
