// 该文件是 Kanjian （看见） 项目的一部分。
// src/overlay/draw.rs - 绘制指令光栅化
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

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::overlay::{DrawOp, OverlayStyle, TextAlign};

/// 内置的默认字体
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法加载字体文件: {0}")]
  InvalidFont(String),
}

/// 光栅化器：矩形用 imageproc 绘制，文字使用内置字体或 `--font` 指定的字体
pub struct Draw {
  style: OverlayStyle,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(OverlayStyle::default())
  }
}

fn embedded_font() -> Option<FontArc> {
  match FontArc::try_from_slice(EMBEDDED_FONT) {
    Ok(font) => Some(font),
    Err(e) => {
      warn!("无法加载内置字体，叠加层将不绘制文字: {}", e);
      None
    }
  }
}

/// 画布坐标系下裁剪后的矩形区域 `[x0, x1) × [y0, y1)`
fn clip(canvas: &RgbaImage, x: i64, y: i64, width: i64, height: i64) -> Option<(u32, u32, u32, u32)> {
  let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
  let x0 = x.clamp(0, cw);
  let y0 = y.clamp(0, ch);
  let x1 = x.saturating_add(width).clamp(0, cw);
  let y1 = y.saturating_add(height).clamp(0, ch);
  if x0 >= x1 || y0 >= y1 {
    return None;
  }
  Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

impl Draw {
  pub fn new(style: OverlayStyle) -> Self {
    Self {
      style,
      font: embedded_font(),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| DrawError::InvalidFont(format!("{}: {}", path.display(), e)))?;
    info!("已加载字体: {}", path.display());
    Ok(self.with_font(font))
  }

  pub fn style(&self) -> &OverlayStyle {
    &self.style
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn rasterize(&self, canvas: &mut RgbaImage, ops: &[DrawOp]) {
    for op in ops {
      match op {
        DrawOp::FillRect {
          x,
          y,
          width,
          height,
          color,
        } => fill_rect_blended(canvas, *x, *y, *width, *height, *color),
        DrawOp::StrokeRect {
          x,
          y,
          width,
          height,
          color,
          thickness,
        } => stroke_rect(canvas, *x, *y, *width, *height, *color, *thickness),
        DrawOp::Text {
          text,
          x,
          y,
          align,
          color,
        } => self.draw_text(canvas, text, *x, *y, *align, *color),
      }
    }
  }

  // (x, y) 为基线位置
  fn draw_text(
    &self,
    canvas: &mut RgbaImage,
    text: &str,
    x: i32,
    y: i32,
    align: TextAlign,
    color: Rgba<u8>,
  ) {
    let Some(font) = self.font.as_ref() else {
      return;
    };

    let scale = PxScale::from(self.style.text_size);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent().ceil() as i64;
    let descent = scaled.descent().floor() as i64;
    let (text_width, _) = text_size(scale, font, text);
    let text_width = text_width as i64;

    let left = match align {
      TextAlign::Left => x as i64,
      TextAlign::Center => x as i64 - text_width / 2,
    };
    let top = y as i64 - ascent;

    // 文字完全落在画布之外时跳过，坐标因此始终在 i32 范围内
    if clip(canvas, left, top, text_width + 1, ascent - descent + 1).is_none() {
      return;
    }

    draw_text_mut(canvas, color, left as i32, top as i32, scale, font, text);
  }
}

/// 半透明填充，与画布已有像素混合
fn fill_rect_blended(canvas: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
  let Some((x0, y0, x1, y1)) = clip(canvas, x as i64, y as i64, width as i64, height as i64) else {
    return;
  };

  for py in y0..y1 {
    for px in x0..x1 {
      canvas.get_pixel_mut(px, py).blend(&color);
    }
  }
}

/// 不透明填充，先裁剪到画布内
fn fill_rect_clipped(canvas: &mut RgbaImage, x: i64, y: i64, width: i64, height: i64, color: Rgba<u8>) {
  if let Some((x0, y0, x1, y1)) = clip(canvas, x, y, width, height) {
    let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0);
    draw_filled_rect_mut(canvas, rect, color);
  }
}

/// 边框从外沿向内加粗，四条边分别裁剪后绘制
fn stroke_rect(
  canvas: &mut RgbaImage,
  x: i32,
  y: i32,
  width: u32,
  height: u32,
  color: Rgba<u8>,
  thickness: u32,
) {
  if width == 0 || height == 0 || thickness == 0 {
    return;
  }
  let (x, y, w, h) = (x as i64, y as i64, width as i64, height as i64);
  let t = (thickness as i64).min(w).min(h);

  fill_rect_clipped(canvas, x, y, w, t, color);
  fill_rect_clipped(canvas, x, y + h - t, w, t, color);
  fill_rect_clipped(canvas, x, y, t, h, color);
  fill_rect_clipped(canvas, x + w - t, y, t, h, color);
}

#[cfg(test)]
mod tests {
  use super::*;

  const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

  fn without_font() -> Draw {
    Draw {
      style: OverlayStyle::default(),
      font: None,
    }
  }

  /// 文字为白色，矩形与填充均为红色，绿色通道非零即文字像素
  fn text_pixels(canvas: &RgbaImage) -> Vec<(u32, u32)> {
    canvas
      .enumerate_pixels()
      .filter(|(_, _, p)| p[1] > 0)
      .map(|(x, y, _)| (x, y))
      .collect()
  }

  #[test]
  fn embedded_font_is_the_default() {
    assert!(Draw::default().has_font());
  }

  #[test]
  fn stroke_paints_edges_only() {
    let mut canvas = RgbaImage::new(40, 40);
    let draw = Draw::default();
    let red = draw.style().stroke_color;
    draw.rasterize(
      &mut canvas,
      &[DrawOp::StrokeRect {
        x: 5,
        y: 5,
        width: 20,
        height: 20,
        color: red,
        thickness: 2,
      }],
    );

    assert_eq!(canvas.get_pixel(5, 5), &red);
    assert_eq!(canvas.get_pixel(24, 24), &red);
    assert_eq!(canvas.get_pixel(6, 6), &red);
    assert_eq!(canvas.get_pixel(7, 7), &CLEAR);
    assert_eq!(canvas.get_pixel(15, 15), &CLEAR);
    assert_eq!(canvas.get_pixel(25, 25), &CLEAR);
  }

  #[test]
  fn stroke_partly_outside_is_clipped() {
    let mut canvas = RgbaImage::new(10, 10);
    let draw = Draw::default();
    let red = draw.style().stroke_color;
    draw.rasterize(
      &mut canvas,
      &[DrawOp::StrokeRect {
        x: -5,
        y: 4,
        width: 10,
        height: 20,
        color: red,
        thickness: 1,
      }],
    );

    assert_eq!(canvas.get_pixel(0, 4), &red);
    assert_eq!(canvas.get_pixel(4, 9), &red);
    assert_eq!(canvas.get_pixel(2, 6), &CLEAR);
    assert_eq!(canvas.get_pixel(9, 4), &CLEAR);
  }

  #[test]
  fn extreme_coordinates_do_not_panic() {
    let mut canvas = RgbaImage::new(16, 16);
    let draw = Draw::default();
    let style = draw.style().clone();
    let ops = [
      DrawOp::StrokeRect {
        x: i32::MAX - 1,
        y: 0,
        width: 10,
        height: 10,
        color: style.stroke_color,
        thickness: 5,
      },
      DrawOp::StrokeRect {
        x: i32::MIN,
        y: i32::MIN,
        width: u32::MAX,
        height: u32::MAX,
        color: style.stroke_color,
        thickness: 5,
      },
      DrawOp::FillRect {
        x: i32::MAX,
        y: i32::MAX,
        width: u32::MAX,
        height: u32::MAX,
        color: style.fill_color,
      },
      DrawOp::Text {
        text: "cat (50%)".into(),
        x: i32::MAX,
        y: i32::MIN,
        align: TextAlign::Center,
        color: style.text_color,
      },
    ];
    draw.rasterize(&mut canvas, &ops);
    assert!(text_pixels(&canvas).is_empty());
  }

  #[test]
  fn fill_is_translucent_and_clipped() {
    let mut canvas = RgbaImage::new(10, 10);
    let draw = Draw::default();
    let fill = draw.style().fill_color;
    draw.rasterize(
      &mut canvas,
      &[DrawOp::FillRect {
        x: -5,
        y: 8,
        width: 8,
        height: 8,
        color: fill,
      }],
    );

    let inside = canvas.get_pixel(0, 9);
    assert_eq!(inside[0], 255);
    assert_eq!(inside[3], 60);
    assert_eq!(canvas.get_pixel(3, 9), &CLEAR);
    assert_eq!(canvas.get_pixel(0, 7), &CLEAR);
  }

  #[test]
  fn overlapping_fills_accumulate() {
    let mut canvas = RgbaImage::new(4, 4);
    let draw = Draw::default();
    let fill = draw.style().fill_color;
    let op = DrawOp::FillRect {
      x: 0,
      y: 0,
      width: 4,
      height: 4,
      color: fill,
    };
    draw.rasterize(&mut canvas, &[op.clone()]);
    let once = canvas.get_pixel(1, 1)[3];
    draw.rasterize(&mut canvas, &[op]);
    assert!(canvas.get_pixel(1, 1)[3] > once);
  }

  #[test]
  fn centered_text_straddles_its_anchor() {
    let mut canvas = RgbaImage::new(200, 100);
    let draw = Draw::default();
    draw.rasterize(
      &mut canvas,
      &[DrawOp::Text {
        text: "0.83".into(),
        x: 100,
        y: 50,
        align: TextAlign::Center,
        color: draw.style().text_color,
      }],
    );

    let pixels = text_pixels(&canvas);
    assert!(!pixels.is_empty());
    let min_x = pixels.iter().map(|p| p.0).min().unwrap() as i32;
    let max_x = pixels.iter().map(|p| p.0).max().unwrap() as i32;
    let max_y = pixels.iter().map(|p| p.1).max().unwrap();
    assert!(((min_x + max_x) / 2 - 100).abs() <= 4, "{}..{}", min_x, max_x);
    // 数字没有下行部分，全部位于基线之上
    assert!(max_y <= 51);
  }

  #[test]
  fn left_text_starts_at_anchor_above_baseline() {
    let mut canvas = RgbaImage::new(200, 100);
    let draw = Draw::default();
    draw.rasterize(
      &mut canvas,
      &[DrawOp::Text {
        text: "cat (73%)".into(),
        x: 20,
        y: 60,
        align: TextAlign::Left,
        color: draw.style().text_color,
      }],
    );

    let pixels = text_pixels(&canvas);
    assert!(!pixels.is_empty());
    let min_x = pixels.iter().map(|p| p.0).min().unwrap();
    let min_y = pixels.iter().map(|p| p.1).min().unwrap();
    assert!((18..=26).contains(&min_x), "{}", min_x);
    assert!(min_y < 60 && min_y >= 60 - 40);
  }

  #[test]
  fn text_without_font_is_skipped() {
    let mut canvas = RgbaImage::new(8, 8);
    let draw = without_font();
    assert!(!draw.has_font());
    draw.rasterize(
      &mut canvas,
      &[DrawOp::Text {
        text: "0.50".into(),
        x: 4,
        y: 4,
        align: TextAlign::Center,
        color: Rgba([255, 255, 255, 255]),
      }],
    );
    assert!(canvas.pixels().all(|p| *p == CLEAR));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::default().with_font_file("/nonexistent/font.ttf"),
      Err(DrawError::IoError(_))
    ));
  }
}
