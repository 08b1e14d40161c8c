// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/bridge.rs - 推理桥：包装外部推理引擎
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

use tracing::{debug, warn};

use crate::{
  frame::ConvertedBuffer,
  model::{BoundingBox, InferenceEngine, InferenceResult},
};

/// 把模型输入坐标映射到显示坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxScale {
  x_ratio: f32,
  y_ratio: f32,
}

impl BoxScale {
  /// `model` 为模型输入尺寸，`display` 为显示尺寸；任一维度为零时返回 `None`
  pub fn new(model: (u32, u32), display: (u32, u32)) -> Option<Self> {
    if model.0 == 0 || model.1 == 0 || display.0 == 0 || display.1 == 0 {
      return None;
    }
    Some(Self {
      x_ratio: display.0 as f32 / model.0 as f32,
      y_ratio: display.1 as f32 / model.1 as f32,
    })
  }

  // 截断取整
  fn apply(&self, bbox: &mut BoundingBox) {
    bbox.x = (bbox.x as f32 * self.x_ratio) as i32;
    bbox.y = (bbox.y as f32 * self.y_ratio) as i32;
    bbox.width = (bbox.width as f32 * self.x_ratio) as u32;
    bbox.height = (bbox.height as f32 * self.y_ratio) as u32;
  }
}

/// 推理桥
///
/// 返回 `None` 表示本帧没有结果（尺寸不符或引擎失败），失败不会重试。
/// 引擎调用没有超时：引擎卡住时整个流水线随之停顿。
pub struct InferenceBridge<E> {
  engine: E,
  expected_input: Option<(u32, u32)>,
  scale: Option<BoxScale>,
}

impl<E: InferenceEngine> InferenceBridge<E> {
  pub fn new(engine: E) -> Self {
    Self {
      engine,
      expected_input: None,
      scale: None,
    }
  }

  /// 只接受指定尺寸（旋转后）的缓冲区
  pub fn with_expected_input(mut self, size: Option<(u32, u32)>) -> Self {
    self.expected_input = size;
    self
  }

  pub fn with_box_scale(mut self, scale: Option<BoxScale>) -> Self {
    self.scale = scale;
    self
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn infer(&mut self, buffer: &ConvertedBuffer) -> Option<InferenceResult> {
    if let Some((width, height)) = self.expected_input
      && (buffer.width(), buffer.height()) != (width, height)
    {
      warn!(
        "输入尺寸不正确: 期望 {}x{}, 实际 {}x{}",
        width,
        height,
        buffer.width(),
        buffer.height()
      );
      return None;
    }

    let now = std::time::Instant::now();
    let mut result = match self.engine.infer(buffer) {
      Ok(result) => result,
      Err(e) => {
        warn!("推理失败: {}", e);
        return None;
      }
    };
    debug!("推理完成，耗时: {:.2?}, 引擎计时: {:?}", now.elapsed(), result.timing);

    if let Some(detections) = result.object_detections.as_mut() {
      detections.retain(|b| b.confidence != 0.0);
    }

    if let Some(scale) = self.scale {
      for bbox in result
        .object_detections
        .iter_mut()
        .chain(result.visual_anomaly_grid_cells.iter_mut())
        .flatten()
      {
        scale.apply(bbox);
      }
    }

    Some(result)
  }
}

#[cfg(test)]
mod tests {
  use thiserror::Error;

  use super::*;

  #[derive(Error, Debug)]
  #[error("engine offline")]
  struct Offline;

  struct FixedEngine {
    result: Option<InferenceResult>,
    calls: usize,
  }

  impl InferenceEngine for FixedEngine {
    type Error = Offline;

    fn infer(&mut self, _input: &ConvertedBuffer) -> Result<InferenceResult, Self::Error> {
      self.calls += 1;
      self.result.clone().ok_or(Offline)
    }
  }

  fn buffer(width: u32, height: u32) -> ConvertedBuffer {
    ConvertedBuffer::from_rgb(vec![0; (width * height * 3) as usize], width, height).unwrap()
  }

  #[test]
  fn engine_failure_becomes_no_result() {
    let mut bridge = InferenceBridge::new(FixedEngine { result: None, calls: 0 });
    assert!(bridge.infer(&buffer(2, 2)).is_none());
    assert_eq!(bridge.engine().calls, 1);
  }

  #[test]
  fn mismatched_input_skips_engine() {
    let engine = FixedEngine {
      result: Some(InferenceResult::default()),
      calls: 0,
    };
    let mut bridge = InferenceBridge::new(engine).with_expected_input(Some((480, 640)));
    assert!(bridge.infer(&buffer(4, 4)).is_none());
    assert_eq!(bridge.engine().calls, 0);
  }

  #[test]
  fn detections_are_filtered_and_scaled() {
    let result = InferenceResult {
      object_detections: Some(vec![
        BoundingBox::new("cat", 0.8, 10, 20, 5, 5),
        BoundingBox::new("ghost", 0.0, 1, 1, 1, 1),
      ]),
      visual_anomaly_grid_cells: Some(vec![BoundingBox::anomaly_cell(0.0, 8, 8, 8, 8)]),
      ..Default::default()
    };
    let engine = FixedEngine {
      result: Some(result),
      calls: 0,
    };
    let mut bridge = InferenceBridge::new(engine).with_box_scale(BoxScale::new((96, 96), (1080, 2400)));

    let out = bridge.infer(&buffer(2, 2)).unwrap();
    let detections = out.object_detections.unwrap();
    assert_eq!(detections.len(), 1);
    // 1080 / 96 = 11.25, 2400 / 96 = 25
    assert_eq!(detections[0], BoundingBox::new("cat", 0.8, 112, 500, 56, 125));

    // 网格单元不按置信度过滤
    let cells = out.visual_anomaly_grid_cells.unwrap();
    assert_eq!(cells[0], BoundingBox::anomaly_cell(0.0, 90, 200, 90, 200));
  }

  #[test]
  fn zero_sized_scale_is_rejected() {
    assert!(BoxScale::new((0, 96), (1080, 2400)).is_none());
  }
}
