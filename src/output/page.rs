// 该文件是 Bingzao （病灶） 项目的一部分。
// src/output/page.rs - HTML 结果页面
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

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::{
  frame::RgbFrame,
  model::DetectResult,
  output::{
    Render,
    draw::Draw,
    report::{DetectionReport, NO_LESIONS_MESSAGE},
  },
};

const UPLOAD_PROMPT: &str = "⬆️ Upload a skin image to start detection.";

const STYLE: &str = "body{font-family:sans-serif;margin:2rem}\
.title-text{color:#4CAF50}.subtitle{color:#666}\
.columns{display:flex;gap:2rem}.column{flex:1}.column img{width:100%}\
.info{background:#e8f0fe;padding:1rem}.warning{background:#fff4e5;padding:1rem}\
.error{background:#fdecea;padding:1rem}";

#[derive(Error, Debug)]
pub enum HtmlPageError {
  #[error("图像编码错误: {0}")]
  Encode(#[from] image::ImageError),
}

/// 单页演示界面：上传表单、原图与标注图对比、检测详情
#[derive(Clone, Default)]
pub struct HtmlPage {
  draw: Draw,
}

impl HtmlPage {
  pub fn new(draw: Draw) -> Self {
    Self { draw }
  }

  /// 尚未上传图像时的首页
  pub fn landing(&self) -> String {
    layout(&format!("<div class=\"info\">{}</div>", UPLOAD_PROMPT))
  }

  /// 请求失败时的页面
  pub fn error(&self, message: &str) -> String {
    layout(&format!(
      "<div class=\"error\">Detection failed: {}</div>",
      ammonia::clean_text(message)
    ))
  }
}

impl Render<RgbFrame, DetectResult> for HtmlPage {
  type Rendered = String;
  type Error = HtmlPageError;

  fn render_result(
    &self,
    frame: &RgbFrame,
    result: &DetectResult,
  ) -> Result<Self::Rendered, Self::Error> {
    let original = png_data_uri(frame.image())?;
    let annotated = png_data_uri(&self.draw.draw_detection(frame, result))?;

    let mut body = format!(
      "<div class=\"columns\">\
<div class=\"column\"><h3>📷 Original Image</h3><img alt=\"original\" src=\"{}\"></div>\
<div class=\"column\"><h3>🧠 Model Prediction</h3><img alt=\"prediction\" src=\"{}\"></div>\
</div><hr><h3>📊 Detection Details</h3>",
      original, annotated
    );

    match DetectionReport::from(result) {
      DetectionReport::NoLesions => {
        body.push_str(&format!("<div class=\"warning\">{}</div>", NO_LESIONS_MESSAGE));
      }
      DetectionReport::Detections(lines) => {
        body.push_str("<ul class=\"detections\">");
        for line in lines {
          body.push_str(&format!(
            "<li><strong>Detection {}:</strong> Class <code>{}</code> | Confidence <code>{:.2}</code></li>",
            line.index,
            ammonia::clean_text(&line.class_name),
            line.confidence
          ));
        }
        body.push_str("</ul>");
      }
    }

    Ok(layout(&body))
  }
}

fn png_data_uri(image: &RgbImage) -> Result<String, HtmlPageError> {
  let mut buf = Cursor::new(Vec::new());
  image.write_to(&mut buf, ImageFormat::Png)?;
  Ok(format!(
    "data:image/png;base64,{}",
    STANDARD.encode(buf.into_inner())
  ))
}

fn layout(body: &str) -> String {
  format!(
    "<!DOCTYPE html>\
<html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Skin Cancer Detection</title><style>{}</style></head><body>\
<h1 class=\"title-text\">🧬 Skin Cancer Detection System</h1>\
<p class=\"subtitle\">YOLOv8-powered medical image analysis</p><hr>\
<form action=\"/detect\" method=\"post\" enctype=\"multipart/form-data\">\
<label>📤 Upload a skin lesion image \
<input type=\"file\" name=\"image\" accept=\".jpg,.jpeg,.png,image/jpeg,image/png\" required></label>\
<button type=\"submit\">Detect</button></form>{}</body></html>",
    STYLE, body
  )
}
