// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
};

use tracing::{info, warn};

#[cfg(feature = "ingest_upload")]
use crate::{
  convert::convert,
  ingest::{IngestUploader, sample_file_name},
};
use crate::{
  frame::Frame,
  model::InferenceEngine,
  pipeline::{FramePipeline, FrameState},
};

pub trait Task<I, E>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: FramePipeline<E>) -> Result<(), Self::Error>;
}

/// 只处理第一帧
pub struct OneShotTask;

impl<I, E> Task<I, E> for OneShotTask
where
  I: Iterator<Item = Frame>,
  E: InferenceEngine,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut pipeline: FramePipeline<E>) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let state = pipeline.process(frame);
    let elapsed = now.elapsed();
    match state {
      FrameState::Dropped => warn!("输入帧无法转换，已丢弃"),
      _ => info!("推理完成，耗时: {:.2?}", elapsed),
    }

    Ok(())
  }
}

/// 逐帧处理直到输入结束、达到帧数或收到停止信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 标志被置位后在下一帧之前退出
  pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stopped(&self) -> bool {
    self
      .stop
      .as_ref()
      .map(|s| s.load(Ordering::SeqCst))
      .unwrap_or(false)
  }
}

impl<I, E> Task<I, E> for ContinuousTask
where
  I: Iterator<Item = Frame>,
  E: InferenceEngine,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut pipeline: FramePipeline<E>) -> Result<(), Self::Error> {
    info!("开始任务...");

    let mut frame_index = 0;
    loop {
      // 先检查帧数与停止信号，再向输入索取下一帧
      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if self.stopped() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      let Some(frame) = input.next() else {
        break;
      };

      frame_index += 1;
      info!("处理第 {} 帧图像", frame_index);
      let now = std::time::Instant::now();
      let state = pipeline.process(frame);
      info!("{:?}，耗时: {:.2?}", state, now.elapsed());
    }

    let stats = pipeline.stats().snapshot();
    info!(
      "任务完成，退出: 采集 {} 帧, 丢弃 {} 帧, 推理 {} 帧 (无结果 {} 帧)",
      stats.captured, stats.dropped, stats.inferred, stats.unavailable
    );
    Ok(())
  }
}

/// 采样结果计数
#[cfg(feature = "ingest_upload")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleReport {
  pub uploaded: u64,
  pub failed: u64,
  pub dropped: u64,
}

/// 将采集到的帧转换后作为带标签的训练样本上传，不经过推理
///
/// 单帧上传失败只记录日志，继续处理后续帧。
#[cfg(feature = "ingest_upload")]
pub struct SampleTask {
  uploader: IngestUploader,
  frame_number: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

#[cfg(feature = "ingest_upload")]
impl SampleTask {
  pub fn new(uploader: IngestUploader) -> Self {
    Self {
      uploader,
      frame_number: Some(1),
      stop: None,
    }
  }

  /// `None` 表示直到输入结束
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  pub fn run<I: Iterator<Item = Frame>>(self, mut input: I) -> SampleReport {
    info!("开始采样, 标签: {}", self.uploader.label());
    let mut report = SampleReport::default();
    let mut frame_index = 0;
    loop {
      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        break;
      }
      if self.stop.as_ref().map(|s| s.load(Ordering::SeqCst)).unwrap_or(false) {
        warn!("中断信号接收，退出采样");
        break;
      }
      let Some(frame) = input.next() else {
        break;
      };
      frame_index += 1;

      let buffer = match convert(frame) {
        Ok(buffer) => buffer,
        Err(e) => {
          warn!("第 {} 帧无法转换: {}", frame_index, e);
          report.dropped += 1;
          continue;
        }
      };

      let name = sample_file_name(self.uploader.label(), frame_index);
      match self.uploader.upload(&name, &buffer) {
        Ok(status) => {
          info!("已上传 {}: {}", name, status);
          report.uploaded += 1;
        }
        Err(e) => {
          warn!("上传 {} 失败: {}", name, e);
          report.failed += 1;
        }
      }
    }

    info!(
      "采样完成: 上传 {} 张, 失败 {} 张, 丢弃 {} 帧",
      report.uploaded, report.failed, report.dropped
    );
    report
  }
}

/// 在独立的工作线程上运行任务
pub fn spawn_task<T, I, E>(
  task: T,
  input: I,
  pipeline: FramePipeline<E>,
) -> std::io::Result<JoinHandle<Result<(), T::Error>>>
where
  T: Task<I, E> + Send + 'static,
  T::Error: Send + 'static,
  I: Send + 'static,
  E: Send + 'static,
{
  thread::Builder::new()
    .name("kanjian-worker".to_string())
    .spawn(move || task.run_task(input, pipeline))
}
