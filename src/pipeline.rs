// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 帧处理流水线
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

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use thiserror::Error;
use tracing::{debug, debug_span, warn};

use crate::{
  convert::convert,
  frame::Frame,
  model::{InferenceBridge, InferenceEngine},
};

pub mod ui;
pub use self::ui::{UI_BACKLOG_LIMIT, UiExecutor, UiHandle, UiJoin, UiTask};

/// 单帧状态：`Captured → Converted → Inferred → Rendered`，或在转换失败时 `Dropped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
  Captured,
  Converted,
  Inferred,
  Rendered,
  Dropped,
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("UI 线程已退出")]
  UiClosed,
  #[error("UI 线程异常退出")]
  UiPanicked,
  #[error("无法启动线程: {0}")]
  SpawnError(#[from] std::io::Error),
}

/// 流水线计数器，工作线程与 UI 线程共享
#[derive(Debug, Default)]
pub struct PipelineStats {
  captured: AtomicU64,
  dropped: AtomicU64,
  inferred: AtomicU64,
  unavailable: AtomicU64,
  rendered: AtomicU64,
  superseded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub captured: u64,
  pub dropped: u64,
  pub inferred: u64,
  /// 推理没有结果的帧，包含在 `inferred` 中
  pub unavailable: u64,
  pub rendered: u64,
  /// UI 积压时被更新结果取代、未显示的帧
  pub superseded: u64,
}

impl PipelineStats {
  pub(crate) fn record(&self, state: FrameState) {
    let counter = match state {
      FrameState::Captured => &self.captured,
      FrameState::Dropped => &self.dropped,
      FrameState::Inferred => &self.inferred,
      FrameState::Rendered => &self.rendered,
      FrameState::Converted => return,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_unavailable(&self) {
    self.unavailable.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_superseded(&self, count: u64) {
    self.superseded.fetch_add(count, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      captured: self.captured.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      inferred: self.inferred.load(Ordering::Relaxed),
      unavailable: self.unavailable.load(Ordering::Relaxed),
      rendered: self.rendered.load(Ordering::Relaxed),
      superseded: self.superseded.load(Ordering::Relaxed),
    }
  }
}

/// 工作线程一侧：转换、推理，然后把结果投递给 UI 线程
///
/// 一次只处理一帧；投递不阻塞工作线程。
pub struct FramePipeline<E> {
  bridge: InferenceBridge<E>,
  ui: UiHandle,
  next_index: u64,
}

impl<E: InferenceEngine> FramePipeline<E> {
  pub fn new(bridge: InferenceBridge<E>, ui: UiHandle) -> Self {
    Self {
      bridge,
      ui,
      next_index: 0,
    }
  }

  pub fn stats(&self) -> &Arc<PipelineStats> {
    self.ui.stats()
  }

  pub fn ui(&self) -> &UiHandle {
    &self.ui
  }

  /// 处理一帧，返回工作线程上的终止状态（`Inferred` 或 `Dropped`）
  pub fn process(&mut self, frame: Frame) -> FrameState {
    let index = self.next_index;
    self.next_index += 1;

    let span = debug_span!("frame", index);
    let _enter = span.enter();
    let stats = self.ui.stats().clone();
    stats.record(FrameState::Captured);

    let buffer = match convert(frame) {
      Ok(buffer) => buffer,
      Err(e) => {
        debug!("丢弃帧: {}", e);
        stats.record(FrameState::Dropped);
        return FrameState::Dropped;
      }
    };
    debug!(state = ?FrameState::Converted, "{}x{}", buffer.width(), buffer.height());

    let result = self.bridge.infer(&buffer);
    if result.is_none() {
      stats.record_unavailable();
    }
    stats.record(FrameState::Inferred);

    if let Err(e) = self.ui.post(UiTask::Display { index, result }) {
      warn!("无法投递结果: {}", e);
    }
    FrameState::Inferred
  }
}
