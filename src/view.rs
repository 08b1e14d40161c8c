// 该文件是 Kanjian （看见） 项目的一部分。
// src/view.rs - 结果视图：文字摘要与叠加层
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

use tracing::debug;

use crate::{
  model::{CLASS_ANOMALY, CLASS_NORMAL, InferenceResult},
  overlay::OverlayRenderer,
};

pub const INFERENCE_ERROR_TEXT: &str = "Error running inference";
pub const PERMISSION_REQUIRED_TEXT: &str = "Camera permission required!";

const ANOMALY_THRESHOLD: f32 = 0.50;

/// 预览画面，布局完成后才能报告尺寸
pub trait PreviewSurface {
  fn dimensions(&self) -> Option<(u32, u32)>;
}

/// 尺寸固定的预览画面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPreview {
  pub width: u32,
  pub height: u32,
}

impl PreviewSurface for FixedPreview {
  fn dimensions(&self) -> Option<(u32, u32)> {
    Some((self.width, self.height))
  }
}

impl<P: PreviewSurface + ?Sized> PreviewSurface for Box<P> {
  fn dimensions(&self) -> Option<(u32, u32)> {
    (**self).dimensions()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSurface {
  text: String,
  visible: bool,
}

impl TextSurface {
  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }
}

/// 推理结果视图，只在 UI 线程上修改
#[derive(Default)]
pub struct ResultView {
  overlay: OverlayRenderer,
  text: TextSurface,
}

impl ResultView {
  pub fn new(overlay: OverlayRenderer) -> Self {
    Self {
      overlay,
      text: TextSurface::default(),
    }
  }

  /// 预览画面第一次报告尺寸时确定叠加层的绘制区域
  pub fn layout(&mut self, preview: &dyn PreviewSurface) {
    if self.overlay.draw_area().is_some() {
      return;
    }
    if let Some((width, height)) = preview.dimensions() {
      self.overlay.attach(width, height);
    }
  }

  /// 按结果中存在的通道切换显示模式并更新文字
  ///
  /// 检测框模式显示叠加层、隐藏文字；异常网格模式隐藏叠加层、显示文字。
  pub fn display_result(&mut self, result: Option<&InferenceResult>) {
    self.text.visible = false;
    self.overlay.set_visible(false);

    let Some(result) = result else {
      self.text.text = INFERENCE_ERROR_TEXT.to_string();
      self.text.visible = true;
      return;
    };

    if let Some(detections) = result.object_detections.as_ref() {
      self.overlay.set_visible(true);
      self.overlay.set_boxes(detections.clone());
    }

    if let Some(cells) = result.visual_anomaly_grid_cells.as_ref() {
      self.overlay.set_visible(false);
      self.overlay.set_boxes(cells.clone());
      self.text.visible = true;
    }

    self.text.text = summary_text(result);
    debug!(
      "视图已更新: 叠加层 {}, 文字 {}",
      self.overlay.is_visible(),
      self.text.visible
    );
  }

  /// 显示常驻消息，例如相机权限被拒绝
  pub fn show_message(&mut self, message: impl Into<String>) {
    self.overlay.set_visible(false);
    self.text.text = message.into();
    self.text.visible = true;
  }

  pub fn text(&self) -> &TextSurface {
    &self.text
  }

  pub fn overlay(&self) -> &OverlayRenderer {
    &self.overlay
  }
}

/// 文字摘要：分类结论与两项概率，加上原始异常分数
pub fn summary_text(result: &InferenceResult) -> String {
  let mut text = String::new();

  if result.classification.is_some() {
    let classification = match (
      result.class_probability(CLASS_ANOMALY),
      result.class_probability(CLASS_NORMAL),
    ) {
      (Some(anomaly), Some(normal)) => {
        let verdict = if anomaly > ANOMALY_THRESHOLD {
          "Anomaly \n"
        } else {
          "Normal \n"
        };
        format!(
          "{}Anomaly prob: ({:.2}) \nNormal prob: ({:.2}) \n",
          verdict, anomaly, normal
        )
      }
      _ => " ".to_string(),
    };
    text.push_str(&format!("Inference result:\n{}\n\n", classification));
  }

  if let Some(score) = result.anomaly_score() {
    text.push_str(&format!("Anomaly score:\n{:?}", score));
  }

  text
}
