// 该文件是 Bingzao （病灶） 项目的一部分。
// tests/server.rs - HTTP 服务测试
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

use std::{
  io::Cursor,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
};

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode},
};
use bingzao::{
  frame::RgbFrame,
  model::{DetectItem, DetectResult, Model},
  output::{HtmlPage, NO_LESIONS_MESSAGE},
  server::{AppState, UPLOAD_FIELD, router},
};
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use thiserror::Error;
use tower::util::ServiceExt;

const BOUNDARY: &str = "bingzao-test-boundary";

#[derive(Error, Debug)]
#[error("session exploded")]
struct StubError;

/// 返回固定结果，并记录每次推理看到的暂存文件
struct FixedModel {
  result: DetectResult,
  fail: bool,
  seen: Mutex<Vec<PathBuf>>,
}

impl FixedModel {
  fn returning(items: Vec<DetectItem>) -> Self {
    Self {
      result: DetectResult::from(items),
      fail: false,
      seen: Mutex::new(Vec::new()),
    }
  }

  fn failing() -> Self {
    Self {
      result: DetectResult::default(),
      fail: true,
      seen: Mutex::new(Vec::new()),
    }
  }

  fn seen(&self) -> Vec<PathBuf> {
    self.seen.lock().unwrap().clone()
  }
}

impl Model for FixedModel {
  type Input = RgbFrame;
  type Output = DetectResult;
  type Error = StubError;

  fn infer(&self, input: &RgbFrame) -> Result<DetectResult, StubError> {
    if let Some(path) = input.source() {
      assert!(path.exists(), "staged image should exist during inference");
      self.seen.lock().unwrap().push(path.to_path_buf());
    }
    if self.fail {
      return Err(StubError);
    }
    Ok(self.result.clone())
  }
}

fn app(model: Arc<FixedModel>, staging: &Path, max_upload_size: Option<usize>) -> Router {
  let mut state = AppState::new(model, HtmlPage::default()).with_staging_dir(staging);
  if let Some(max) = max_upload_size {
    state = state.with_max_upload_size(max);
  }
  router(Arc::new(state))
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
  let mut buf = Cursor::new(Vec::new());
  image.write_to(&mut buf, ImageFormat::Png).unwrap();
  buf.into_inner()
}

fn noisy_image(width: u32, height: u32) -> RgbImage {
  let mut state: u32 = 0x1234_5678;
  RgbImage::from_fn(width, height, |_, _| {
    state ^= state << 13;
    state ^= state >> 17;
    state ^= state << 5;
    let [r, g, b, _] = state.to_le_bytes();
    Rgb([r, g, b])
  })
}

fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
Content-Type: application/octet-stream\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

  Request::builder()
    .method(Method::POST)
    .uri("/detect")
    .header(
      "content-type",
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(body))
    .unwrap()
}

async fn read_body(response: axum::response::Response) -> String {
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  String::from_utf8(bytes.to_vec()).unwrap()
}

fn strip_tags(html: &str) -> String {
  let mut text = String::with_capacity(html.len());
  let mut in_tag = false;
  for c in html.chars() {
    match c {
      '<' => in_tag = true,
      '>' => in_tag = false,
      c if !in_tag => text.push(c),
      _ => {}
    }
  }
  text
}

fn staging_is_empty(dir: &Path) -> bool {
  std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn landing_page_prompts_for_upload() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let response = app(model.clone(), staging.path(), None)
    .oneshot(Request::get("/").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  let body = read_body(response).await;
  assert!(body.contains("Upload a skin image to start detection."));
  assert!(body.contains(&format!("name=\"{}\"", UPLOAD_FIELD)));
  assert!(model.seen().is_empty());
}

#[tokio::test]
async fn health_check_answers_ok() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let response = app(model, staging.path(), None)
    .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(read_body(response).await, "ok");
}

#[tokio::test]
async fn blank_image_reports_no_lesions() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let png = png_bytes(&RgbImage::new(64, 48));

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request(UPLOAD_FIELD, "blank.png", &png))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  let body = read_body(response).await;
  assert!(body.contains(NO_LESIONS_MESSAGE));
  assert!(body.contains("Original Image"));
  assert!(body.contains("Model Prediction"));
  assert_eq!(body.matches("data:image/png;base64,").count(), 2);
  assert!(!strip_tags(&body).contains("Detection 1:"));
}

#[tokio::test]
async fn single_detection_is_listed() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(vec![DetectItem {
    class_id: 0,
    label: Arc::from("melanoma"),
    score: 0.85,
    bbox: [0.25, 0.25, 0.75, 0.75],
  }]));
  let png = png_bytes(&noisy_image(80, 60));

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request(UPLOAD_FIELD, "lesion.png", &png))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  let text = strip_tags(&read_body(response).await);
  assert!(text.contains("Detection 1: Class melanoma | Confidence 0.85"));
  assert!(!text.contains("Detection 2:"));
  assert!(!text.contains(NO_LESIONS_MESSAGE));
}

#[tokio::test]
async fn staged_file_is_removed_after_success() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let png = png_bytes(&noisy_image(32, 32));

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request(UPLOAD_FIELD, "a.png", &png))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  let seen = model.seen();
  assert_eq!(seen.len(), 1);
  assert!(seen[0].starts_with(staging.path()));
  assert!(!seen[0].exists());
  assert!(staging_is_empty(staging.path()));
}

#[tokio::test]
async fn staged_file_is_removed_after_inference_failure() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::failing());
  let png = png_bytes(&noisy_image(32, 32));

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request(UPLOAD_FIELD, "a.png", &png))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body = read_body(response).await;
  assert!(body.contains("Detection failed"));
  assert!(body.contains("exploded"));
  assert_eq!(model.seen().len(), 1);
  assert!(staging_is_empty(staging.path()));
}

#[tokio::test]
async fn repeated_uploads_use_distinct_staging_files() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let router = app(model.clone(), staging.path(), None);
  let png = png_bytes(&noisy_image(16, 16));

  for _ in 0..2 {
    let response = router
      .clone()
      .oneshot(multipart_request(UPLOAD_FIELD, "same-name.png", &png))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  let seen = model.seen();
  assert_eq!(seen.len(), 2);
  assert_ne!(seen[0], seen[1]);
  assert!(staging_is_empty(staging.path()));
}

#[tokio::test]
async fn unsupported_format_is_rejected() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let mut bmp = b"BM".to_vec();
  bmp.extend_from_slice(&[0u8; 64]);

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request(UPLOAD_FIELD, "lesion.bmp", &bmp))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
  assert!(model.seen().is_empty());
  assert!(staging_is_empty(staging.path()));
}

#[tokio::test]
async fn corrupt_png_is_a_bad_request() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let png = png_bytes(&noisy_image(32, 32));

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request(UPLOAD_FIELD, "cut.png", &png[..png.len() / 2]))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert!(model.seen().is_empty());
}

#[tokio::test]
async fn missing_image_field_is_a_bad_request() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let png = png_bytes(&noisy_image(8, 8));

  let response = app(model.clone(), staging.path(), None)
    .oneshot(multipart_request("attachment", "a.png", &png))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert!(model.seen().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
  let staging = TempDir::new().unwrap();
  let model = Arc::new(FixedModel::returning(Vec::new()));
  let png = png_bytes(&noisy_image(64, 64));
  assert!(png.len() > 1024);

  let response = app(model.clone(), staging.path(), Some(1024))
    .oneshot(multipart_request(UPLOAD_FIELD, "big.png", &png))
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
  assert!(model.seen().is_empty());
}
