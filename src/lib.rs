// 该文件是 Bingzao （病灶） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod server;
pub mod task;

/// 默认置信度阈值，低于该值的检测结果会被丢弃
pub const DEFAULT_CONFIDENCE: f32 = 0.4;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 默认日志级别，可由 `RUST_LOG` 覆盖
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 日志过滤规则，未设置 `RUST_LOG` 时使用 [`DEFAULT_LOG_FILTER`]
pub fn log_filter() -> tracing_subscriber::EnvFilter {
  tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// 初始化全局日志输出
pub fn init_tracing() {
  tracing_subscriber::fmt().with_env_filter(log_filter()).init();
}

/// 命令行阈值参数解析，只接受 0.0 到 1.0 之间的有限值
pub fn parse_threshold(text: &str) -> Result<f32, String> {
  let value: f32 = text
    .trim()
    .parse()
    .map_err(|e| format!("无法解析阈值 '{}': {}", text, e))?;
  if value.is_finite() && (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(format!("阈值必须在 0.0 到 1.0 之间, 实际为 {}", text))
  }
}

/// 从 URL 中取出文件路径，并还原百分号编码。
///
/// 同时支持 `image:/abs/path.png`、`image:///abs/path.png` 与相对路径
/// `yolov8:best.onnx` 三种写法。
pub fn url_file_path(url: &url::Url) -> std::path::PathBuf {
  let path = match url.host_str() {
    Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
    _ => url.path().to_string(),
  };
  match urlencoding::decode(&path) {
    Ok(decoded) => std::path::PathBuf::from(decoded.into_owned()),
    Err(_) => std::path::PathBuf::from(path),
  }
}
