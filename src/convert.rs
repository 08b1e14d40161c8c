// 该文件是 Kanjian （看见） 项目的一部分。
// src/convert.rs - 像素转换：原生帧 -> 旋转后的 RGB 缓冲区
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

//! # 像素转换
//!
//! 将采集源交付的原生帧解码为 32 位 ARGB 像素网格，顺时针旋转 90 度
//! （校正传感器方向），再按行优先顺序逐像素拆出 R、G、B 三个字节。
//!
//! 本模块不做缩放，模型需要的尺寸调整由推理引擎负责。

use image::ImageFormat;
use thiserror::Error;
use tracing::trace;

use crate::frame::{ConvertedBuffer, Frame, PixelEncoding, RGB_CHANNELS};

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("空帧: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("不支持的像素编码 {encoding}: {reason}")]
  UnsupportedEncoding { encoding: String, reason: String },
}

impl ConvertError {
  pub fn unsupported(encoding: &PixelEncoding, reason: impl Into<String>) -> Self {
    ConvertError::UnsupportedEncoding {
      encoding: encoding.to_string(),
      reason: reason.into(),
    }
  }
}

/// 打包的 ARGB 像素网格
struct ArgbGrid {
  pixels: Vec<u32>,
  width: u32,
  height: u32,
}

#[inline]
fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
  u32::from_be_bytes([a, r, g, b])
}

/// 转换一帧。帧在读取完像素后即被释放，不会保留到函数返回之后。
pub fn convert(frame: Frame) -> Result<ConvertedBuffer, ConvertError> {
  let (width, height) = (frame.width(), frame.height());
  if width == 0 || height == 0 {
    return Err(ConvertError::EmptyFrame { width, height });
  }

  let grid = decode_argb(&frame)?;
  drop(frame);

  let rotated = rotate_clockwise(&grid);
  trace!(
    "帧旋转完成: {}x{} -> {}x{}",
    grid.width, grid.height, rotated.width, rotated.height
  );

  let mut data = Vec::with_capacity(rotated.pixels.len() * RGB_CHANNELS);
  for pixel in rotated.pixels.iter() {
    data.push(((pixel >> 16) & 0xFF) as u8);
    data.push(((pixel >> 8) & 0xFF) as u8);
    data.push((pixel & 0xFF) as u8);
  }

  ConvertedBuffer::from_rgb(data, rotated.width, rotated.height)
}

fn decode_argb(frame: &Frame) -> Result<ArgbGrid, ConvertError> {
  let encoding = frame.encoding();
  let (width, height) = (frame.width(), frame.height());

  let pixels = match encoding {
    PixelEncoding::Jpeg => decode_compressed(frame, ImageFormat::Jpeg)?,
    PixelEncoding::Png => decode_compressed(frame, ImageFormat::Png)?,
    PixelEncoding::Other(_) => {
      return Err(ConvertError::unsupported(encoding, "无法解码为像素网格"));
    }
    raw => {
      // 原始编码：每行紧密排列
      let bpp = raw.bytes_per_pixel().unwrap_or(4);
      let expected = width as usize * height as usize * bpp;
      let data = frame.data();
      if data.len() != expected {
        return Err(ConvertError::unsupported(
          raw,
          format!("缓冲区大小不匹配: 期望 {} 字节, 实际 {} 字节", expected, data.len()),
        ));
      }

      data
        .chunks_exact(bpp)
        .map(|p| match raw {
          PixelEncoding::Argb8888 => pack_argb(p[0], p[1], p[2], p[3]),
          PixelEncoding::Rgba8888 => pack_argb(p[3], p[0], p[1], p[2]),
          PixelEncoding::Bgra8888 => pack_argb(p[3], p[2], p[1], p[0]),
          PixelEncoding::Rgb888 => pack_argb(0xFF, p[0], p[1], p[2]),
          _ => pack_argb(0xFF, p[2], p[1], p[0]),
        })
        .collect()
    }
  };

  Ok(ArgbGrid {
    pixels,
    width,
    height,
  })
}

fn decode_compressed(frame: &Frame, format: ImageFormat) -> Result<Vec<u32>, ConvertError> {
  let image = image::load_from_memory_with_format(frame.data(), format)
    .map_err(|e| ConvertError::unsupported(frame.encoding(), e.to_string()))?
    .to_rgba8();

  if image.dimensions() != (frame.width(), frame.height()) {
    return Err(ConvertError::unsupported(
      frame.encoding(),
      format!(
        "解码尺寸 {}x{} 与声明尺寸 {}x{} 不一致",
        image.width(),
        image.height(),
        frame.width(),
        frame.height()
      ),
    ));
  }

  Ok(
    image
      .pixels()
      .map(|p| pack_argb(p[3], p[0], p[1], p[2]))
      .collect(),
  )
}

/// 顺时针旋转 90 度：源像素 (x, y) 落在输出 (H-1-y, x)
fn rotate_clockwise(grid: &ArgbGrid) -> ArgbGrid {
  let (src_w, src_h) = (grid.width as usize, grid.height as usize);
  let (dst_w, dst_h) = (src_h, src_w);
  let mut pixels = vec![0u32; grid.pixels.len()];

  for dst_y in 0..dst_h {
    for dst_x in 0..dst_w {
      let src_x = dst_y;
      let src_y = src_h - 1 - dst_x;
      pixels[dst_y * dst_w + dst_x] = grid.pixels[src_y * src_w + src_x];
    }
  }

  ArgbGrid {
    pixels,
    width: dst_w as u32,
    height: dst_h as u32,
  }
}
