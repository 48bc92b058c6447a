// 该文件是 Bingzao （病灶） 项目的一部分。
// src/server.rs - 单页演示 HTTP 服务
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

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  extract::{DefaultBodyLimit, State},
  http::StatusCode,
  response::{Html, IntoResponse, Response},
  routing::{get, post},
};
use axum_extra::extract::{Multipart, multipart::MultipartError};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
  frame::RgbFrame,
  input::{DEFAULT_MAX_UPLOAD_SIZE, ImageFileInput, ImageFileInputError, StagedImage, Upload, UploadError},
  model::{DetectResult, Model},
  output::HtmlPage,
  task::{OneShotTask, Task},
};

/// 上传表单字段名
pub const UPLOAD_FIELD: &str = "image";

// multipart 边界与头部的额外开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("请求中缺少图像字段 '{}'", UPLOAD_FIELD)]
  MissingImage,
  #[error("表单解析错误: {0}")]
  Multipart(#[from] MultipartError),
  #[error("{0}")]
  Upload(#[from] UploadError),
  #[error("暂存图像读取错误: {0}")]
  Input(#[from] ImageFileInputError),
  #[error("推理失败: {0}")]
  Inference(anyhow::Error),
  #[error("推理任务异常退出: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl ServerError {
  pub fn status(&self) -> StatusCode {
    match self {
      ServerError::MissingImage => StatusCode::BAD_REQUEST,
      ServerError::Multipart(e) => e.status(),
      ServerError::Upload(UploadError::UnsupportedFormat) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
      ServerError::Upload(UploadError::TooLarge(..)) => StatusCode::PAYLOAD_TOO_LARGE,
      ServerError::Upload(UploadError::Empty | UploadError::Decode(_)) => StatusCode::BAD_REQUEST,
      ServerError::Upload(UploadError::Staging(_) | UploadError::StagingEncode(_))
      | ServerError::Input(_)
      | ServerError::Inference(_)
      | ServerError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ServerError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      ServerError::Inference(e) => format!("{:#}", e),
      other => other.to_string(),
    };
    if status.is_server_error() {
      error!("请求处理失败 ({}): {}", status, message);
    } else {
      warn!("请求被拒绝 ({}): {}", status, message);
    }
    (status, Html(HtmlPage::default().error(&message))).into_response()
  }
}

/// 进程内共享的服务状态，模型在启动时加载一次，之后只读
pub struct AppState<M> {
  model: M,
  page: HtmlPage,
  max_upload_size: usize,
  staging_dir: PathBuf,
}

impl<M> AppState<M>
where
  M: Model<Input = RgbFrame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M, page: HtmlPage) -> Self {
    Self {
      model,
      page,
      max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
      staging_dir: std::env::temp_dir(),
    }
  }

  pub fn with_max_upload_size(mut self, max_upload_size: usize) -> Self {
    self.max_upload_size = max_upload_size;
    self
  }

  pub fn with_staging_dir(mut self, staging_dir: impl Into<PathBuf>) -> Self {
    self.staging_dir = staging_dir.into();
    self
  }

  pub fn max_upload_size(&self) -> usize {
    self.max_upload_size
  }

  /// 解码、暂存、推理、渲染。暂存文件在返回前删除。
  pub fn inspect(&self, bytes: &[u8]) -> Result<String, ServerError> {
    let upload = Upload::from_bytes_with_limit(bytes, self.max_upload_size)?;
    info!(
      "收到上传图像: {:?} {}x{}, {} 字节",
      upload.format(),
      upload.image().width(),
      upload.image().height(),
      upload.size_bytes()
    );

    let staged = StagedImage::persist_in(upload.image(), &self.staging_dir)?;
    let input = ImageFileInput::from_path(staged.path())?;
    OneShotTask
      .run_task(input, &self.model, &self.page)
      .map_err(ServerError::Inference)
  }
}

pub fn router<M>(state: Arc<AppState<M>>) -> Router
where
  M: Model<Input = RgbFrame, Output = DetectResult> + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let body_limit = state.max_upload_size().saturating_add(MULTIPART_OVERHEAD);
  Router::new()
    .route("/", get(index::<M>))
    .route("/detect", post(detect::<M>))
    .route("/healthz", get(|| async { "ok" }))
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn index<M>(State(state): State<Arc<AppState<M>>>) -> Html<String> {
  Html(state.page.landing())
}

async fn detect<M>(
  State(state): State<Arc<AppState<M>>>,
  mut multipart: Multipart,
) -> Result<Html<String>, ServerError>
where
  M: Model<Input = RgbFrame, Output = DetectResult> + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let mut bytes = None;
  while let Some(field) = multipart.next_field().await? {
    if field.name() == Some(UPLOAD_FIELD) {
      bytes = Some(field.bytes().await?);
      break;
    }
  }
  let bytes = bytes.ok_or(ServerError::MissingImage)?;

  // 推理为阻塞计算，放到阻塞线程池执行
  let page = tokio::task::spawn_blocking(move || state.inspect(&bytes)).await??;
  Ok(Html(page))
}

/// 在给定监听器上提供服务，收到 Ctrl-C 后优雅退出
pub async fn serve<M>(listener: TcpListener, state: Arc<AppState<M>>) -> std::io::Result<()>
where
  M: Model<Input = RgbFrame, Output = DetectResult> + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  info!("服务监听地址: http://{}", listener.local_addr()?);
  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!("无法监听中断信号: {}", e);
    std::future::pending::<()>().await;
  }
  info!("收到中断信号，准备退出...");
}
