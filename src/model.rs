// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 推理结果模型与推理引擎接口
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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::ConvertedBuffer;

/// 异常网格单元的保留标签，渲染时切换为填充模式
pub const ANOMALY_LABEL: &str = "anomaly";

/// 分类结果中的异常 / 正常标签
pub const CLASS_ANOMALY: &str = "anomaly";
pub const CLASS_NORMAL: &str = "no anomaly";

/// 异常结果表中的键
pub const ANOMALY_SCORE_KEY: &str = "anomaly";
pub const ANOMALY_MEAN_KEY: &str = "mean";
pub const ANOMALY_MAX_KEY: &str = "max";

/// 推理引擎
///
/// 引擎由工作线程独占，因此 `infer` 取 `&mut self`。
/// 调用是同步阻塞的，没有超时。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&mut self, input: &ConvertedBuffer) -> Result<InferenceResult, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub label: String,
  pub confidence: f32,
  pub x: i32,
  pub y: i32,
  pub width: u32,
  pub height: u32,
}

impl BoundingBox {
  pub fn new(label: impl Into<String>, confidence: f32, x: i32, y: i32, width: u32, height: u32) -> Self {
    Self {
      label: label.into(),
      confidence,
      x,
      y,
      width,
      height,
    }
  }

  pub fn anomaly_cell(confidence: f32, x: i32, y: i32, width: u32, height: u32) -> Self {
    Self::new(ANOMALY_LABEL, confidence, x, y, width, height)
  }

  pub fn is_anomaly_cell(&self) -> bool {
    self.label == ANOMALY_LABEL
  }

  pub fn center(&self) -> (i32, i32) {
    (
      self.x.saturating_add((self.width / 2) as i32),
      self.y.saturating_add((self.height / 2) as i32),
    )
  }
}

/// 各阶段耗时，毫秒字段与微秒字段互不保证一致
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
  pub sampling: u32,
  pub dsp: u32,
  pub classification: u32,
  pub anomaly: u32,
  pub dsp_us: u64,
  pub classification_us: u64,
  pub anomaly_us: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
  pub classification: Option<HashMap<String, f32>>,
  pub object_detections: Option<Vec<BoundingBox>>,
  pub visual_anomaly_grid_cells: Option<Vec<BoundingBox>>,
  pub anomaly_result: Option<HashMap<String, f32>>,
  #[serde(default)]
  pub timing: Timing,
}

impl InferenceResult {
  pub fn anomaly_score(&self) -> Option<f32> {
    self.anomaly_value(ANOMALY_SCORE_KEY)
  }

  pub fn anomaly_mean(&self) -> Option<f32> {
    self.anomaly_value(ANOMALY_MEAN_KEY)
  }

  pub fn anomaly_max(&self) -> Option<f32> {
    self.anomaly_value(ANOMALY_MAX_KEY)
  }

  fn anomaly_value(&self, key: &str) -> Option<f32> {
    self.anomaly_result.as_ref()?.get(key).copied()
  }

  pub fn class_probability(&self, label: &str) -> Option<f32> {
    self.classification.as_ref()?.get(label).copied()
  }

  /// 四个结果通道全部缺失
  pub fn is_empty(&self) -> bool {
    self.classification.is_none()
      && self.object_detections.is_none()
      && self.visual_anomaly_grid_cells.is_none()
      && self.anomaly_result.is_none()
  }
}

pub mod bridge;
pub mod replay;

pub use self::bridge::{BoxScale, InferenceBridge};
pub use self::replay::{ReplayEngine, ReplayError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn absent_channels_deserialize_as_none() {
    let result: InferenceResult = serde_json::from_str(r#"{"anomaly_result": {"anomaly": 0.5}}"#).unwrap();
    assert!(result.classification.is_none());
    assert!(result.object_detections.is_none());
    assert_eq!(result.anomaly_score(), Some(0.5));
    assert_eq!(result.anomaly_max(), None);
    assert_eq!(result.timing, Timing::default());

    let empty: InferenceResult = serde_json::from_str("{}").unwrap();
    assert!(empty.is_empty());
  }

  #[test]
  fn boxes_deserialize_with_timing() {
    let json = r#"{
      "object_detections": [
        {"label": "cat", "confidence": 0.9, "x": 10, "y": 20, "width": 30, "height": 40}
      ],
      "timing": {"sampling": 1, "dsp": 2, "classification": 3, "anomaly": 4,
                 "dsp_us": 2100, "classification_us": 3050, "anomaly_us": 0}
    }"#;
    let result: InferenceResult = serde_json::from_str(json).unwrap();
    let boxes = result.object_detections.unwrap();
    assert_eq!(boxes[0], BoundingBox::new("cat", 0.9, 10, 20, 30, 40));
    assert!(!boxes[0].is_anomaly_cell());
    assert_eq!(boxes[0].center(), (25, 40));
    assert_eq!(result.timing.dsp_us, 2100);
  }

  #[test]
  fn center_saturates_at_the_edge() {
    let bbox = BoundingBox::new("cat", 0.5, i32::MAX - 1, 0, 10, u32::MAX);
    assert_eq!(bbox.center(), (i32::MAX, i32::MAX));
  }

  #[test]
  fn negative_sizes_are_rejected() {
    let json = r#"{"label": "cat", "confidence": 0.9, "x": 0, "y": 0, "width": -1, "height": 4}"#;
    assert!(serde_json::from_str::<BoundingBox>(json).is_err());
  }
}
