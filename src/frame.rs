// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 相机原生帧与转换后的 RGB 缓冲区
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

use std::fmt;

use crate::convert::ConvertError;

pub const RGB_CHANNELS: usize = 3;

/// 相机帧的原生像素编码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelEncoding {
  /// 每像素 4 字节，顺序 A, R, G, B
  Argb8888,
  /// 每像素 4 字节，顺序 R, G, B, A
  Rgba8888,
  /// 每像素 4 字节，顺序 B, G, R, A
  Bgra8888,
  Rgb888,
  Bgr888,
  Jpeg,
  Png,
  /// 无法解码的编码，保留原始名称用于日志
  Other(String),
}

impl PixelEncoding {
  /// 原始编码的每像素字节数，压缩格式或未知格式返回 `None`
  pub fn bytes_per_pixel(&self) -> Option<usize> {
    match self {
      PixelEncoding::Argb8888 | PixelEncoding::Rgba8888 | PixelEncoding::Bgra8888 => Some(4),
      PixelEncoding::Rgb888 | PixelEncoding::Bgr888 => Some(3),
      PixelEncoding::Jpeg | PixelEncoding::Png | PixelEncoding::Other(_) => None,
    }
  }
}

impl fmt::Display for PixelEncoding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PixelEncoding::Argb8888 => write!(f, "ARGB8888"),
      PixelEncoding::Rgba8888 => write!(f, "RGBA8888"),
      PixelEncoding::Bgra8888 => write!(f, "BGRA8888"),
      PixelEncoding::Rgb888 => write!(f, "RGB888"),
      PixelEncoding::Bgr888 => write!(f, "BGR888"),
      PixelEncoding::Jpeg => write!(f, "JPEG"),
      PixelEncoding::Png => write!(f, "PNG"),
      PixelEncoding::Other(name) => write!(f, "{}", name),
    }
  }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// 采集源交付的一帧原生图像
///
/// 帧在被丢弃时调用释放回调（归还采集源的缓冲区），
/// 转换器读取完像素后立即丢弃帧。
pub struct Frame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  encoding: PixelEncoding,
  release: Option<ReleaseHook>,
}

impl Frame {
  pub fn new(data: impl Into<Box<[u8]>>, width: u32, height: u32, encoding: PixelEncoding) -> Self {
    Self {
      data: data.into(),
      width,
      height,
      encoding,
      release: None,
    }
  }

  pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
    self.release = Some(Box::new(release));
    self
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn encoding(&self) -> &PixelEncoding {
    &self.encoding
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }
}

impl Drop for Frame {
  fn drop(&mut self) {
    if let Some(release) = self.release.take() {
      release();
    }
  }
}

impl fmt::Debug for Frame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Frame")
      .field("width", &self.width)
      .field("height", &self.height)
      .field("encoding", &self.encoding)
      .field("len", &self.data.len())
      .field("release", &self.release.is_some())
      .finish()
  }
}

/// 旋转后按行优先排列的 RGB 字节缓冲区，交给推理引擎
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedBuffer {
  data: Box<[u8]>,
  width: u32,
  height: u32,
}

impl ConvertedBuffer {
  /// 由紧密排列的 RGB 数据构造，尺寸为零或长度不符时返回错误
  pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, ConvertError> {
    if width == 0 || height == 0 {
      return Err(ConvertError::EmptyFrame { width, height });
    }

    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(ConvertError::unsupported(
        &PixelEncoding::Rgb888,
        format!("数据长度不匹配: 期望长度 {}, 实际长度 {}", expected, data.len()),
      ));
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// (x, y) 处的 RGB 值，越界返回 `None`
  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }
}

impl AsRef<[u8]> for ConvertedBuffer {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}
