// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Args;
use url::Url;

use crate::{
  model::{BoxScale, InferenceBridge, InferenceEngine},
  overlay::{Draw, DrawError, OverlayRenderer, OverlayStyle},
  view::{FixedPreview, ResultView},
};

/// 各个程序共用的流水线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 输入来源
  /// - 图片: image:///path/to/image.png?repeat=N
  /// - 摄像头: gst://camera/dev/video0?width=640&height=480
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 推理引擎，例如 replay:///path/to/results.jsonl
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输出: log://, image:///path.png, folder:///dir?always
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 叠加层文字使用的字体文件，不指定时使用内置的 DejaVu Sans
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 模型期望的输入尺寸（旋转后），格式 WxH
  #[arg(long, value_name = "WxH", value_parser = parse_dims)]
  pub expect_input: Option<(u32, u32)>,

  /// 模型输出框的坐标空间，格式 WxH
  #[arg(long, value_name = "WxH", value_parser = parse_dims)]
  pub model_size: Option<(u32, u32)>,

  /// 显示坐标空间，格式 WxH
  #[arg(long, value_name = "WxH", value_parser = parse_dims)]
  pub display_size: Option<(u32, u32)>,

  /// 预览画面尺寸，格式 WxH
  #[arg(long, value_name = "WxH", value_parser = parse_dims, default_value = "480x640")]
  pub preview_size: (u32, u32),
}

impl PipelineArgs {
  pub fn bridge<E: InferenceEngine>(&self, engine: E) -> InferenceBridge<E> {
    let scale = match (self.model_size, self.display_size) {
      (Some(model), Some(display)) => BoxScale::new(model, display),
      _ => None,
    };
    InferenceBridge::new(engine)
      .with_expected_input(self.expect_input)
      .with_box_scale(scale)
  }

  pub fn result_view(&self) -> Result<ResultView, DrawError> {
    let mut draw = Draw::new(OverlayStyle::default());
    if let Some(font) = self.font.as_ref() {
      draw = draw.with_font_file(font)?;
    }
    Ok(ResultView::new(OverlayRenderer::new(draw)))
  }

  pub fn preview(&self) -> FixedPreview {
    FixedPreview {
      width: self.preview_size.0,
      height: self.preview_size.1,
    }
  }
}

/// 解析 `WxH` 格式的尺寸
pub fn parse_dims(s: &str) -> Result<(u32, u32), String> {
  let (w, h) = s
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("尺寸格式应为 WxH: {}", s))?;
  let w = w
    .trim()
    .parse::<u32>()
    .map_err(|e| format!("无效的宽度 '{}': {}", w, e))?;
  let h = h
    .trim()
    .parse::<u32>()
    .map_err(|e| format!("无效的高度 '{}': {}", h, e))?;
  Ok((w, h))
}
