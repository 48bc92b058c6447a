// 该文件是 Bingzao （病灶） 项目的一部分。
// src/frame.rs - RGB 帧与 NCHW 张量帧定义
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage, imageops::FilterType};
use ndarray::Array4;

const RGB_CHANNELS: usize = 3;
const LETTERBOX_FILL: u8 = 114;

/// 解码后的原始图像，保持上传时的分辨率
#[derive(Debug, Clone)]
pub struct RgbFrame {
  image: RgbImage,
  source: Option<PathBuf>,
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    Self {
      image,
      source: None,
    }
  }
}

impl RgbFrame {
  pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
    self.source = Some(source.into());
    self
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  /// 帧读取自的文件路径
  pub fn source(&self) -> Option<&Path> {
    self.source.as_deref()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 等比缩放加灰边填充的几何参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub gain: f32,
  pub pad_left: u32,
  pub pad_top: u32,
  pub resized_width: u32,
  pub resized_height: u32,
  pub src_width: u32,
  pub src_height: u32,
}

impl Letterbox {
  pub fn fit(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
    let gain = (dst_width as f32 / src_width as f32).min(dst_height as f32 / src_height as f32);
    let resized_width = ((src_width as f32 * gain).round() as u32).clamp(1, dst_width);
    let resized_height = ((src_height as f32 * gain).round() as u32).clamp(1, dst_height);

    // 填充左右（上下）两侧均分，奇数像素偏向右（下）
    let dw = (dst_width - resized_width) as f32 / 2.0;
    let dh = (dst_height - resized_height) as f32 / 2.0;
    let pad_left = (dw - 0.1).round().max(0.0) as u32;
    let pad_top = (dh - 0.1).round().max(0.0) as u32;

    Self {
      gain,
      pad_left,
      pad_top,
      resized_width,
      resized_height,
      src_width,
      src_height,
    }
  }

  /// 将模型输入坐标系下的 `[x_min, y_min, x_max, y_max]` 映射回原图，
  /// 返回相对原图尺寸归一化后的坐标
  pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.src_width as f32, self.src_height as f32);
    let x_min = ((bbox[0] - self.pad_left as f32) / self.gain).clamp(0.0, w);
    let y_min = ((bbox[1] - self.pad_top as f32) / self.gain).clamp(0.0, h);
    let x_max = ((bbox[2] - self.pad_left as f32) / self.gain).clamp(0.0, w);
    let y_max = ((bbox[3] - self.pad_top as f32) / self.gain).clamp(0.0, h);
    [x_min / w, y_min / h, x_max / w, y_max / h]
  }
}

/// 模型输入张量，形状为 `[1, 3, H, W]`，取值范围 0..1
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  data: Array4<f32>,
  letterbox: Letterbox,
}

impl RgbNchwFrame {
  pub fn letterbox(image: &RgbImage, width: u32, height: u32) -> Self {
    let letterbox = Letterbox::fit(image.width(), image.height(), width, height);
    let resized = image::imageops::resize(
      image,
      letterbox.resized_width,
      letterbox.resized_height,
      FilterType::Triangle,
    );

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(
      &mut canvas,
      &resized,
      letterbox.pad_left as i64,
      letterbox.pad_top as i64,
    );

    let (w, h) = (width as usize, height as usize);
    let mut data = Array4::<f32>::zeros((1, RGB_CHANNELS, h, w));
    for (x, y, pixel) in canvas.enumerate_pixels() {
      for c in 0..RGB_CHANNELS {
        data[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
      }
    }

    Self { data, letterbox }
  }

  pub fn tensor(&self) -> &Array4<f32> {
    &self.data
  }

  pub fn into_tensor(self) -> Array4<f32> {
    self.data
  }

  pub fn letterbox_info(&self) -> &Letterbox {
    &self.letterbox
  }

  pub fn height(&self) -> usize {
    self.data.shape()[2]
  }

  pub fn width(&self) -> usize {
    self.data.shape()[3]
  }
}
