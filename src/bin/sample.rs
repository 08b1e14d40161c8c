// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/sample.rs - 采集带标签的训练样本并上传
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
  atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use kanjian::{FromUrl, ingest::IngestUploader, input::InputWrapper, task::SampleTask};

/// Kanjian 样本采集参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，与推理程序相同
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 上传目标: ingest:///?label=cat&api_key=ei_...
  #[arg(long, value_name = "TARGET")]
  pub target: Url,

  /// 上传的样本数量
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 1)]
  pub frame_number: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  let uploader = IngestUploader::from_url(&args.target)?;
  let input = InputWrapper::from_url(&args.input).inspect_err(|e| error!("无法打开输入: {}", e))?;

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
    })?;
  }

  let report = SampleTask::new(uploader)
    .with_frame_number(Some(args.frame_number))
    .with_stop(stop)
    .run(input);
  if report.uploaded == 0 {
    anyhow::bail!("没有样本上传成功");
  }

  Ok(())
}
