// 该文件是 Bingzao （病灶） 项目的一部分。
// src/args.rs - 服务参数配置
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

use std::{net::SocketAddr, path::PathBuf};

use bingzao::{DEFAULT_CONFIDENCE, parse_threshold};
use clap::Parser;
use url::Url;

/// Bingzao 皮肤病灶检测演示服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// YOLOv8 ONNX 模型路径，例如 yolov8:best.onnx
  #[arg(long, value_name = "MODEL", default_value = "yolov8:best.onnx")]
  pub model: Url,

  /// 监听地址
  #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8501")]
  pub listen: SocketAddr,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD", value_parser = parse_threshold)]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD", value_parser = parse_threshold)]
  pub iou: f32,

  /// 单张图像最多保留的检测数
  #[arg(long, default_value = "300", value_name = "COUNT")]
  pub max_detections: usize,

  /// 标签字体文件（TTF/OTF），不指定时只绘制检测框
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 上传图像大小上限 (MB)
  #[arg(long, default_value = "200", value_name = "MB")]
  pub max_upload_mb: usize,

  /// ONNX Runtime 算子内线程数
  #[arg(long, value_name = "COUNT")]
  pub intra_threads: Option<usize>,
}
