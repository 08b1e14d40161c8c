// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbaImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, view::ResultView};

/// 在 UI 线程上，每次视图更新之后调用
pub trait Render {
  type Error;
  fn render_view(&mut self, view: &ResultView) -> Result<(), Self::Error>;
}

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 叠加层当前可见的画面：叠加层隐藏时为同尺寸的透明图像
pub(crate) fn visible_overlay(view: &ResultView) -> Option<RgbaImage> {
  let canvas = view.overlay().canvas()?;
  if view.overlay().is_visible() {
    Some(canvas.clone())
  } else {
    Some(RgbaImage::new(canvas.width(), canvas.height()))
  }
}

/// 当前可见的文字，文字层隐藏时为空
pub(crate) fn visible_text(view: &ResultView) -> &str {
  if view.text().is_visible() {
    view.text().text()
  } else {
    ""
  }
}

/// 只把视图状态写入日志
#[derive(Debug, Default)]
pub struct LogOutput {
  updates: u64,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(LogOutput::default())
  }
}

impl Render for LogOutput {
  type Error = OutputError;

  fn render_view(&mut self, view: &ResultView) -> Result<(), Self::Error> {
    self.updates += 1;
    let overlay = view.overlay();
    info!(
      "第 {} 次更新: 叠加层 {} ({} 个框), 文字 {}",
      self.updates,
      if overlay.is_visible() { "显示" } else { "隐藏" },
      overlay.boxes().len(),
      if view.text().is_visible() { "显示" } else { "隐藏" },
    );
    for line in visible_text(view).lines() {
      info!("  {}", line);
    }
    Ok(())
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_view(&mut self, view: &ResultView) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_view(view),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        output.render_view(view).map_err(OutputError::from)
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.render_view(view).map_err(OutputError::from)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn log_output_accepts_any_view() {
    let url = Url::parse("log://").unwrap();
    let mut output = OutputWrapper::from_url(&url).unwrap();
    let mut view = ResultView::default();
    view.display_result(None);
    output.render_view(&view).unwrap();
    assert_eq!(visible_text(&view), crate::view::INFERENCE_ERROR_TEXT);
    assert!(visible_overlay(&view).is_none());
  }
}
