// 该文件是 Bingzao （病灶） 项目的一部分。
// src/input/upload.rs - 上传图像解码与临时文件暂存
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

use image::{ImageFormat, RgbImage};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// 默认上传大小上限 (200 MB)
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 200 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("上传数据为空")]
  Empty,
  #[error("上传数据过大: {0} 字节 (上限 {1} 字节)")]
  TooLarge(usize, usize),
  #[error("不支持的图像格式，仅支持 JPEG 与 PNG")]
  UnsupportedFormat,
  #[error("图像解码失败: {0}")]
  Decode(#[source] image::ImageError),
  #[error("临时文件错误: {0}")]
  Staging(#[from] std::io::Error),
  #[error("临时文件写入失败: {0}")]
  StagingEncode(#[source] image::ImageError),
}

/// 一次上传的已解码图像
#[derive(Debug, Clone)]
pub struct Upload {
  image: RgbImage,
  format: ImageFormat,
  size_bytes: usize,
}

impl Upload {
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, UploadError> {
    Self::from_bytes_with_limit(bytes, DEFAULT_MAX_UPLOAD_SIZE)
  }

  pub fn from_bytes_with_limit(bytes: &[u8], limit: usize) -> Result<Self, UploadError> {
    if bytes.is_empty() {
      return Err(UploadError::Empty);
    }
    if bytes.len() > limit {
      return Err(UploadError::TooLarge(bytes.len(), limit));
    }

    // 根据文件头判断格式，不信任扩展名与 Content-Type
    let format = match image::guess_format(bytes) {
      Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => format,
      _ => return Err(UploadError::UnsupportedFormat),
    };

    let image = image::load_from_memory_with_format(bytes, format)
      .map_err(UploadError::Decode)?
      .to_rgb8();
    debug!(
      "上传图像解码完成: {:?} {}x{}, {} 字节",
      format,
      image.width(),
      image.height(),
      bytes.len()
    );

    Ok(Self {
      image,
      format,
      size_bytes: bytes.len(),
    })
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn format(&self) -> ImageFormat {
    self.format
  }

  pub fn size_bytes(&self) -> usize {
    self.size_bytes
  }
}

/// 推理前暂存到磁盘的图像。
///
/// 文件名由系统保证唯一，值被释放时文件随之删除，
/// 无论推理成功与否。
pub struct StagedImage {
  file: NamedTempFile,
}

impl StagedImage {
  pub fn persist(image: &RgbImage) -> Result<Self, UploadError> {
    Self::persist_in(image, std::env::temp_dir())
  }

  pub fn persist_in(image: &RgbImage, dir: impl AsRef<Path>) -> Result<Self, UploadError> {
    let mut file = tempfile::Builder::new()
      .prefix("bingzao-")
      .suffix(".png")
      .tempfile_in(dir)?;
    image
      .write_to(file.as_file_mut(), ImageFormat::Png)
      .map_err(UploadError::StagingEncode)?;
    debug!("暂存上传图像: {}", file.path().display());
    Ok(Self { file })
  }

  pub fn path(&self) -> &Path {
    self.file.path()
  }
}

impl Drop for StagedImage {
  fn drop(&mut self) {
    debug!("清理暂存图像: {}", self.file.path().display());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;
  use std::io::Cursor;

  fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
  }

  #[test]
  fn decodes_png_and_jpeg() {
    let image = RgbImage::from_pixel(16, 12, Rgb([200, 120, 90]));

    let png = Upload::from_bytes(&encode(&image, ImageFormat::Png)).unwrap();
    assert_eq!(png.format(), ImageFormat::Png);
    assert_eq!(png.image(), &image);

    let jpeg = Upload::from_bytes(&encode(&image, ImageFormat::Jpeg)).unwrap();
    assert_eq!(jpeg.format(), ImageFormat::Jpeg);
    assert_eq!(jpeg.image().dimensions(), (16, 12));
  }

  #[test]
  fn rejects_other_formats() {
    let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
    let bmp = encode(&image, ImageFormat::Bmp);
    assert!(matches!(
      Upload::from_bytes(&bmp),
      Err(UploadError::UnsupportedFormat)
    ));
    assert!(matches!(
      Upload::from_bytes(b"definitely not an image"),
      Err(UploadError::UnsupportedFormat)
    ));
  }

  #[test]
  fn rejects_empty_and_oversized() {
    assert!(matches!(Upload::from_bytes(&[]), Err(UploadError::Empty)));

    let png = encode(&RgbImage::new(4, 4), ImageFormat::Png);
    assert!(matches!(
      Upload::from_bytes_with_limit(&png, 8),
      Err(UploadError::TooLarge(_, 8))
    ));
  }

  #[test]
  fn truncated_png_fails_to_decode() {
    let png = encode(&RgbImage::new(32, 32), ImageFormat::Png);
    assert!(matches!(
      Upload::from_bytes(&png[..png.len() / 2]),
      Err(UploadError::Decode(_))
    ));
  }

  #[test]
  fn staged_image_is_removed_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let image = RgbImage::from_pixel(5, 5, Rgb([1, 2, 3]));

    let staged = StagedImage::persist_in(&image, dir.path()).unwrap();
    let path = staged.path().to_path_buf();
    assert!(path.exists());
    assert_eq!(image::open(&path).unwrap().to_rgb8(), image);

    drop(staged);
    assert!(!path.exists());
  }

  #[test]
  fn staged_names_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let image = RgbImage::new(2, 2);
    let a = StagedImage::persist_in(&image, dir.path()).unwrap();
    let b = StagedImage::persist_in(&image, dir.path()).unwrap();
    assert_ne!(a.path(), b.path());
  }
}
