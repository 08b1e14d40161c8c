// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::{io::Cursor, path::Path};

use image::{ImageFormat, ImageReader};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, PixelEncoding},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(image::ImageError),
  #[error("无效的重复次数: {0}")]
  InvalidRepeat(String),
  #[error("没有读取权限: {0}")]
  AccessDenied(String),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileInputError {
  fn from(err: image::ImageError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

/// 静态图像作为采集源，按 `repeat` 次数重复产出同一帧
///
/// JPEG/PNG 保持压缩编码交给转换器解码，其他格式在此解码为 RGBA。
pub struct ImageFileInput {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  encoding: PixelEncoding,
  remaining: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let repeat = match url.query_pairs().find(|(k, _)| k == "repeat") {
      Some((_, v)) => v
        .parse::<usize>()
        .map_err(|_| ImageFileInputError::InvalidRepeat(v.to_string()))?,
      None => 1,
    };

    Ok(Self::open(url.path())?.with_repeat(repeat))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
      if e.kind() == std::io::ErrorKind::PermissionDenied {
        ImageFileInputError::AccessDenied(path.display().to_string())
      } else {
        ImageFileInputError::from(e)
      }
    })?;

    let format = image::guess_format(&bytes)?;
    let input = match format {
      ImageFormat::Jpeg | ImageFormat::Png => {
        let (width, height) = ImageReader::with_format(Cursor::new(&bytes), format).into_dimensions()?;
        let encoding = if format == ImageFormat::Jpeg {
          PixelEncoding::Jpeg
        } else {
          PixelEncoding::Png
        };
        ImageFileInput {
          data: bytes.into_boxed_slice(),
          width,
          height,
          encoding,
          remaining: 1,
        }
      }
      format => {
        let image = image::load_from_memory_with_format(&bytes, format)?.to_rgba8();
        let (width, height) = image.dimensions();
        ImageFileInput {
          data: image.into_raw().into_boxed_slice(),
          width,
          height,
          encoding: PixelEncoding::Rgba8888,
          remaining: 1,
        }
      }
    };

    info!(
      "已加载图像 {}: {}x{} ({})",
      path.display(),
      input.width,
      input.height,
      input.encoding
    );
    Ok(input)
  }

  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.remaining = repeat;
    self
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn encoding(&self) -> &PixelEncoding {
    &self.encoding
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(Frame::new(
      self.data.clone(),
      self.width,
      self.height,
      self.encoding.clone(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;

  #[test]
  fn png_stays_compressed_and_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(4, 2, Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=3", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.dimensions(), (4, 2));
    assert_eq!(input.encoding(), &PixelEncoding::Png);

    let frames: Vec<_> = input.collect();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.width() == 4 && f.height() == 2));
  }

  #[test]
  fn bad_repeat_is_rejected() {
    let url = Url::parse("image:///tmp/none.png?repeat=many").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::InvalidRepeat(_))
    ));
  }

  #[test]
  fn missing_file_is_io_error() {
    assert!(matches!(
      ImageFileInput::open("/nonexistent/still.png"),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
