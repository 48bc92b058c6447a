// 该文件是 Bingzao （病灶） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::{
  frame::RgbFrame,
  model::{DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const MIN_LINE_WIDTH: u32 = 2;

// 按类别编号循环取色
const PALETTE: [[u8; 3]; 20] = [
  [0xFF, 0x38, 0x38],
  [0xFF, 0x9D, 0x97],
  [0xFF, 0x70, 0x1F],
  [0xFF, 0xB2, 0x1D],
  [0xCF, 0xD2, 0x31],
  [0x48, 0xF9, 0x0A],
  [0x92, 0xCC, 0x17],
  [0x3D, 0xDB, 0x86],
  [0x1A, 0x93, 0x34],
  [0x00, 0xD4, 0xBB],
  [0x2C, 0x99, 0xA8],
  [0x00, 0xC2, 0xFF],
  [0x34, 0x45, 0x93],
  [0x64, 0x73, 0xFF],
  [0x00, 0x18, 0xEC],
  [0x84, 0x38, 0xFF],
  [0x52, 0x00, 0x85],
  [0xCB, 0x38, 0xFF],
  [0xFF, 0x95, 0xC8],
  [0xFF, 0x37, 0xC7],
];

#[derive(Error, Debug)]
pub enum FontError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 检测框绘制器。未配置字体时只画框，不画标签文字。
#[derive(Clone, Default)]
pub struct Draw {
  font: Option<FontArc>,
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, FontError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载标签字体: {}", path.display());
    Ok(Self { font: Some(font) })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color_of(class_id: u32) -> [u8; 3] {
    PALETTE[class_id as usize % PALETTE.len()]
  }

  /// 在原图副本上绘制检测结果
  pub fn draw_detection(&self, frame: &RgbFrame, result: &DetectResult) -> RgbImage {
    let mut image = frame.image().clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    let line_width = line_width(image.width(), image.height());
    for item in result.iter() {
      self.draw_bbox_with_label(image, item, line_width);
    }
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem, line_width: u32) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let bbox = &item.bbox;
    let color = Rgb(Self::color_of(item.class_id));

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 由外向内逐层描边
    for t in 0..line_width as i32 {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", item.label, item.score);
    let scale = PxScale::from(LABEL_FONT_SIZE * line_width as f32 / MIN_LINE_WIDTH as f32);
    let (text_w, text_h) = text_size(scale, font, &label);
    let tag_w = text_w as i32 + 2 * LABEL_TEXT_PADDING;
    let tag_h = text_h as i32 + 2 * LABEL_TEXT_PADDING;

    // 标签优先放在框上方，空间不足时放在框内
    let tag_x = x_min;
    let tag_y = if y_min - tag_h >= 0 { y_min - tag_h } else { y_min };

    let max_width = image.width() as i32 - tag_x;
    let tag_w = tag_w.min(max_width);
    if tag_w <= 0 || tag_h <= 0 {
      return;
    }

    let rect = Rect::at(tag_x, tag_y).of_size(tag_w as u32, tag_h as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      tag_x + LABEL_TEXT_PADDING,
      tag_y + LABEL_TEXT_PADDING,
      scale,
      font,
      &label,
    );
  }
}

/// 线宽随图像尺寸增长，最小为 2 像素
fn line_width(width: u32, height: u32) -> u32 {
  (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(MIN_LINE_WIDTH)
}
