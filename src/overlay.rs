// 该文件是 Kanjian （看见） 项目的一部分。
// src/overlay.rs - 检测框 / 异常热区叠加层
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

use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

use crate::model::BoundingBox;

pub mod draw;
pub use self::draw::{Draw, DrawError};

// 叠加层绘制常量
const STROKE_WIDTH: u32 = 5;
const TEXT_SIZE: f32 = 40.0;
const ANOMALY_FILL_ALPHA: u8 = 60;
const LABEL_OFFSET_Y: i32 = 10;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255]; // 白色

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
  pub stroke_color: Rgba<u8>,
  pub stroke_width: u32,
  pub fill_color: Rgba<u8>,
  pub text_color: Rgba<u8>,
  pub text_size: f32,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    let [r, g, b] = BOX_COLOR;
    Self {
      stroke_color: Rgba([r, g, b, 255]),
      stroke_width: STROKE_WIDTH,
      fill_color: Rgba([r, g, b, ANOMALY_FILL_ALPHA]),
      text_color: Rgba(TEXT_COLOR),
      text_size: TEXT_SIZE,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
  Left,
  Center,
}

/// 一条绘制指令。文本坐标是基线位置。
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
  FillRect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgba<u8>,
  },
  StrokeRect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgba<u8>,
    thickness: u32,
  },
  Text {
    text: String,
    x: i32,
    y: i32,
    align: TextAlign,
    color: Rgba<u8>,
  },
}

/// 异常单元显示的分数
pub fn anomaly_cell_label(confidence: f32) -> String {
  format!("{:.2}", confidence)
}

/// 检测框标签，置信度按百分比四舍五入
pub fn detection_label(label: &str, confidence: f32) -> String {
  format!("{} ({}%)", label, (confidence * 100.0).round() as i64)
}

/// 按给定顺序为每个框生成绘制指令，后面的框覆盖前面的框
pub fn plan(boxes: &[BoundingBox], style: &OverlayStyle) -> Vec<DrawOp> {
  let mut ops = Vec::with_capacity(boxes.len() * 2);
  for bbox in boxes {
    if bbox.is_anomaly_cell() {
      let (cx, cy) = bbox.center();
      ops.push(DrawOp::FillRect {
        x: bbox.x,
        y: bbox.y,
        width: bbox.width,
        height: bbox.height,
        color: style.fill_color,
      });
      ops.push(DrawOp::Text {
        text: anomaly_cell_label(bbox.confidence),
        x: cx,
        y: cy,
        align: TextAlign::Center,
        color: style.text_color,
      });
    } else {
      ops.push(DrawOp::StrokeRect {
        x: bbox.x,
        y: bbox.y,
        width: bbox.width,
        height: bbox.height,
        color: style.stroke_color,
        thickness: style.stroke_width,
      });
      ops.push(DrawOp::Text {
        text: detection_label(&bbox.label, bbox.confidence),
        x: bbox.x,
        y: bbox.y.saturating_sub(LABEL_OFFSET_Y),
        align: TextAlign::Left,
        color: style.text_color,
      });
    }
  }
  ops
}

/// 叠加层渲染器
///
/// 持有当前的框列表（只整体替换）和可见性。绘制区域在第一次布局时确定，
/// 之后不再跟随预览尺寸变化。
pub struct OverlayRenderer {
  boxes: Vec<BoundingBox>,
  visible: bool,
  canvas: Option<RgbaImage>,
  draw: Draw,
  redraws: u64,
}

impl Default for OverlayRenderer {
  fn default() -> Self {
    Self::new(Draw::default())
  }
}

impl OverlayRenderer {
  pub fn new(draw: Draw) -> Self {
    Self {
      boxes: Vec::new(),
      visible: false,
      canvas: None,
      draw,
      redraws: 0,
    }
  }

  /// 确定绘制区域，只在第一次有效调用时生效，返回是否生效
  pub fn attach(&mut self, width: u32, height: u32) -> bool {
    if self.canvas.is_some() || width == 0 || height == 0 {
      return false;
    }

    debug!("叠加层绘制区域: {}x{}", width, height);
    self.canvas = Some(RgbaImage::new(width, height));
    self.redraw();
    true
  }

  pub fn draw_area(&self) -> Option<(u32, u32)> {
    self.canvas.as_ref().map(RgbaImage::dimensions)
  }

  /// 替换框列表并立即重绘，返回重绘后的画布（尚未确定绘制区域时为 `None`）
  pub fn set_boxes(&mut self, boxes: Vec<BoundingBox>) -> Option<&RgbaImage> {
    self.boxes = boxes;
    self.redraw()
  }

  pub fn boxes(&self) -> &[BoundingBox] {
    &self.boxes
  }

  pub fn set_visible(&mut self, visible: bool) {
    self.visible = visible;
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }

  pub fn canvas(&self) -> Option<&RgbaImage> {
    self.canvas.as_ref()
  }

  pub fn redraw_count(&self) -> u64 {
    self.redraws
  }

  fn redraw(&mut self) -> Option<&RgbaImage> {
    let canvas = self.canvas.as_mut()?;
    canvas.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));

    let ops = plan(&self.boxes, self.draw.style());
    self.draw.rasterize(canvas, &ops);
    self.redraws += 1;
    trace!("叠加层重绘 #{}: {} 个框", self.redraws, self.boxes.len());

    Some(&*canvas)
  }
}
