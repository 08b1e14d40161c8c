// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/live.rs - 连续帧推理与叠加显示
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
  thread,
  time::Duration,
};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use kanjian::{
  FromUrl,
  args::PipelineArgs,
  input::InputWrapper,
  model::ReplayEngine,
  output::OutputWrapper,
  pipeline::{FramePipeline, UiExecutor},
  task::{ContinuousTask, spawn_task},
  view::PERMISSION_REQUIRED_TEXT,
};

/// Kanjian 连续推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 最大处理帧数，不指定时处理到输入结束
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.pipeline.input);
  info!("推理引擎: {}", args.pipeline.model);
  info!("输出路径: {}", args.pipeline.output);

  let view = args.pipeline.result_view()?;
  let output = OutputWrapper::from_url(&args.pipeline.output)?;
  let (ui, ui_join) = UiExecutor::spawn(view, output, args.pipeline.preview())?;

  let input = match InputWrapper::from_url(&args.pipeline.input) {
    Ok(input) => input,
    Err(e) if e.is_access_denied() => {
      error!("无法打开输入: {}", e);
      ui.show_message(PERMISSION_REQUIRED_TEXT)?;
      drop(ui);
      ui_join.join()?;
      return Err(e.into());
    }
    Err(e) => return Err(e.into()),
  };
  let engine = ReplayEngine::from_url(&args.pipeline.model)?;
  let pipeline = FramePipeline::new(args.pipeline.bridge(engine), ui);

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
  }

  let task = ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_stop(stop);
  let worker = spawn_task(task, input, pipeline)?;
  worker
    .join()
    .map_err(|_| anyhow::anyhow!("工作线程异常退出"))??;

  let view = ui_join.join()?;
  info!(
    "处理结束，叠加层重绘 {} 次",
    view.overlay().redraw_count()
  );

  Ok(())
}
