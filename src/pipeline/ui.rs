// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline/ui.rs - UI 线程执行器
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
  collections::VecDeque,
  fmt::Display,
  sync::{
    Arc,
    mpsc::{self, Receiver, Sender},
  },
  thread::{self, JoinHandle},
};

use tracing::{debug, info, warn};

use crate::{
  model::InferenceResult,
  output::Render,
  pipeline::{FrameState, PipelineError, PipelineStats},
  view::{PreviewSurface, ResultView},
};

/// 待处理任务超过该数量时，只保留最新的一个 `Display`
pub const UI_BACKLOG_LIMIT: usize = 8;

/// 投递给 UI 线程的任务
#[derive(Debug)]
pub enum UiTask {
  Display {
    index: u64,
    result: Option<InferenceResult>,
  },
  /// 常驻消息，例如相机权限被拒绝
  Message(String),
}

#[derive(Clone)]
pub struct UiHandle {
  tx: Sender<UiTask>,
  stats: Arc<PipelineStats>,
}

impl UiHandle {
  /// 不阻塞工作线程；UI 线程落后时旧结果在 UI 一侧被合并
  pub fn post(&self, task: UiTask) -> Result<(), PipelineError> {
    self.tx.send(task).map_err(|_| PipelineError::UiClosed)
  }

  pub fn show_message(&self, message: impl Into<String>) -> Result<(), PipelineError> {
    self.post(UiTask::Message(message.into()))
  }

  pub fn stats(&self) -> &Arc<PipelineStats> {
    &self.stats
  }
}

pub struct UiJoin {
  handle: JoinHandle<ResultView>,
}

impl UiJoin {
  /// 等待所有 `UiHandle` 被丢弃、队列清空后取回最终视图
  pub fn join(self) -> Result<ResultView, PipelineError> {
    self.handle.join().map_err(|_| PipelineError::UiPanicked)
  }
}

/// 唯一修改视图的线程
pub struct UiExecutor;

impl UiExecutor {
  pub fn spawn<O, P>(
    view: ResultView,
    output: O,
    preview: P,
  ) -> Result<(UiHandle, UiJoin), PipelineError>
  where
    O: Render + Send + 'static,
    O::Error: Display,
    P: PreviewSurface + Send + 'static,
  {
    let (tx, rx) = mpsc::channel();
    let stats = Arc::new(PipelineStats::default());

    let thread_stats = stats.clone();
    let handle = thread::Builder::new()
      .name("kanjian-ui".to_string())
      .spawn(move || run(rx, view, output, preview, thread_stats))?;

    Ok((UiHandle { tx, stats }, UiJoin { handle }))
  }
}

fn run<O, P>(
  rx: Receiver<UiTask>,
  mut view: ResultView,
  mut output: O,
  preview: P,
  stats: Arc<PipelineStats>,
) -> ResultView
where
  O: Render,
  O::Error: Display,
  P: PreviewSurface,
{
  info!("UI 线程启动");
  let mut pending = VecDeque::new();
  loop {
    if pending.is_empty() {
      match rx.recv() {
        Ok(task) => pending.push_back(task),
        Err(_) => break,
      }
    }
    pending.extend(rx.try_iter());
    if pending.len() > UI_BACKLOG_LIMIT {
      coalesce(&mut pending, &stats);
    }
    let Some(task) = pending.pop_front() else {
      continue;
    };

    view.layout(&preview);
    match task {
      UiTask::Display { index, result } => {
        view.display_result(result.as_ref());
        stats.record(FrameState::Rendered);
        debug!(index, state = ?FrameState::Rendered, "帧已显示");
      }
      UiTask::Message(message) => {
        info!("显示消息: {}", message);
        view.show_message(message);
      }
    }

    if let Err(e) = output.render_view(&view) {
      warn!("输出失败: {}", e);
    }
  }
  info!("UI 线程退出");
  view
}

/// 丢弃除最后一个之外的 `Display`，消息保持原有顺序
fn coalesce(pending: &mut VecDeque<UiTask>, stats: &PipelineStats) {
  let Some(last) = pending
    .iter()
    .rposition(|t| matches!(t, UiTask::Display { .. }))
  else {
    return;
  };

  let before = pending.len();
  let mut position = 0;
  pending.retain(|t| {
    let keep = position == last || !matches!(t, UiTask::Display { .. });
    position += 1;
    keep
  });
  let skipped = before - pending.len();
  if skipped > 0 {
    stats.record_superseded(skipped as u64);
    debug!("UI 积压, 跳过 {} 个过期结果", skipped);
  }
}
