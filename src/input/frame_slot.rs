// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/frame_slot.rs - 单帧信箱
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

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::frame::Frame;

#[derive(Default)]
struct SlotState {
  pending: Option<Frame>,
  closed: bool,
}

/// 推送式采集源的单帧信箱
///
/// 工作线程忙时新帧替换尚未取走的旧帧，被替换的帧立即释放。
#[derive(Clone, Default)]
pub struct FrameSlot {
  shared: Arc<(Mutex<SlotState>, Condvar)>,
}

impl FrameSlot {
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, SlotState> {
    self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 放入一帧；替换了尚未取走的帧时返回 `true`
  pub fn push(&self, frame: Frame) -> bool {
    let replaced = {
      let mut state = self.state();
      if state.closed {
        debug!("信箱已关闭，丢弃帧");
        return false;
      }
      state.pending.replace(frame)
    };
    self.shared.1.notify_one();

    match replaced {
      Some(old) => {
        debug!("工作线程忙，替换待处理帧");
        drop(old);
        true
      }
      None => false,
    }
  }

  /// 关闭信箱，已放入的帧仍会被取走
  pub fn close(&self) {
    self.state().closed = true;
    self.shared.1.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.state().closed
  }

  /// 阻塞式帧迭代器，信箱关闭且为空时结束
  pub fn frames(&self) -> FrameSlotFrames {
    FrameSlotFrames { slot: self.clone() }
  }
}

pub struct FrameSlotFrames {
  slot: FrameSlot,
}

impl Iterator for FrameSlotFrames {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let (_, condvar) = &*self.slot.shared;
    let mut state = self.slot.state();
    loop {
      if let Some(frame) = state.pending.take() {
        return Some(frame);
      }
      if state.closed {
        return None;
      }
      state = condvar.wait(state).unwrap_or_else(PoisonError::into_inner);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::frame::PixelEncoding;

  fn frame(tag: u8, released: &Arc<AtomicUsize>) -> Frame {
    let released = released.clone();
    Frame::new(vec![tag; 3], 1, 1, PixelEncoding::Rgb888).with_release(move || {
      released.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[test]
  fn push_replaces_pending_frame() {
    let released = Arc::new(AtomicUsize::new(0));
    let slot = FrameSlot::new();

    assert!(!slot.push(frame(1, &released)));
    assert!(slot.push(frame(2, &released)));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    slot.close();
    let frames: Vec<_> = slot.frames().map(|f| f.data()[0]).collect();
    assert_eq!(frames, vec![2]);
    assert_eq!(released.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn push_after_close_is_released() {
    let released = Arc::new(AtomicUsize::new(0));
    let slot = FrameSlot::new();
    slot.close();
    assert!(!slot.push(frame(1, &released)));
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(slot.frames().next().is_none());
  }

  #[test]
  fn frames_block_until_pushed() {
    let released = Arc::new(AtomicUsize::new(0));
    let slot = FrameSlot::new();
    let consumer = {
      let slot = slot.clone();
      std::thread::spawn(move || slot.frames().count())
    };

    slot.push(frame(1, &released));
    slot.close();
    let count = consumer.join().unwrap();
    assert!(count <= 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
  }
}
