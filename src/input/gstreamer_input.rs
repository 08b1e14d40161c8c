// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 支持两类视频源：
//! - 摄像头捕获（V4L2）：`gst://camera/dev/video0?width=640&height=480&fps=15&format=YUY2`
//! - 视频文件读取：`gst://file/path/to/video.mp4`
//!
//! 可选参数 `target` 指定 appsink 的输出格式（默认 `RGB`），
//! 输出的原始格式映射为 [`PixelEncoding`]，由转换器统一转为 RGB。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::{collections::HashMap, fs::OpenOptions, io::ErrorKind};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, PixelEncoding},
};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 15;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("无法获取 appsink 元素")]
  AppSinkNotFound,
  #[error("无法将元素转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 摄像头设备没有访问权限
  #[error("没有摄像头访问权限: {0}")]
  AccessDenied(String),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode_str, format, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl GStreamerInputPipelineBuilder {
  pub fn new() -> Self {
    Self { items: Vec::new() }
  }

  pub fn camera(mut self, device: &str, format: &str, width: u32, height: u32, fps: u32) -> Self {
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: device.to_string(),
      io_mode: None,
      format: format.to_string(),
      width,
      height,
      fps,
    });
    self
  }

  /// 设置最近添加的摄像头源的 v4l2 io-mode
  pub fn io_mode(mut self, mode: Option<u32>) -> Self {
    if let Some(GStreamerInputBuilderItem::CameraSource { io_mode, .. }) = self.items.last_mut() {
      *io_mode = mode;
    }
    self
  }

  pub fn file(mut self, path: &str) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::FileSource(path.to_string()));
    self
  }

  pub fn target_format(mut self, format: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.to_string(),
    });
    self
  }

  fn build_video_pipline(
    path: &str,
    query: &HashMap<String, String>,
  ) -> Result<Self, GStreamerInputError> {
    check_device_access(path)?;

    let io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
    let format = query.get("format").map(String::as_str).unwrap_or("YUY2");
    let width = query
      .get("width")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_WIDTH);
    let height = query
      .get("height")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_HEIGHT);
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_FPS);

    Ok(
      Self::new()
        .camera(path, format, width, height, fps)
        .io_mode(io_mode),
    )
  }

  fn build_file_pipeline(path: &str) -> Result<Self, GStreamerInputError> {
    Ok(Self::new().file(path))
  }

  /// 完整的 `gst-launch` 管道描述
  fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 工作线程忙时由 appsink 丢弃旧帧
    format!(
      "{} ! appsink max-buffers=1 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description();

    info!("GStreamer 管道描述: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }
}

impl Default for GStreamerInputPipelineBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let builder = match url.host_str() {
      Some("camera") => Self::build_video_pipline(url.path(), &query)?,
      Some("file") => Self::build_file_pipeline(url.path())?,
      _ => {
        return Err(GStreamerInputError::SchemeMismatch);
      }
    };

    let target = query.get("target").map(String::as_str).unwrap_or("RGB");
    Ok(builder.target_format(target))
  }
}

/// 先尝试打开设备节点，把权限错误与其他管道错误区分开
fn check_device_access(device: &str) -> Result<(), GStreamerInputError> {
  match OpenOptions::new().read(true).open(device) {
    Ok(_) => Ok(()),
    Err(e) if e.kind() == ErrorKind::PermissionDenied => {
      warn!("没有摄像头访问权限: {}", device);
      Err(GStreamerInputError::AccessDenied(device.to_string()))
    }
    Err(e) => {
      debug!("预检摄像头设备 {} 失败: {}", device, e);
      Ok(())
    }
  }
}

/// GStreamer 视频输入
///
/// 管理 GStreamer 管道和 appsink，逐帧产出 [`Frame`]。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    self
      .appsink
      .pull_sample()
      .map_err(|e| {
        error!("拉取样本失败: {}", e);
        e
      })
      .ok()
  }
}

impl Iterator for GStreamerInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let sample = self.pull_sample()?;
      match convert_sample_to_frame(sample) {
        Ok(frame) => return Some(frame),
        Err(e) => error!("无法读取样本: {}", e),
      }
    }
  }
}

fn pixel_encoding(format: gst_video::VideoFormat) -> PixelEncoding {
  match format {
    gst_video::VideoFormat::Rgb => PixelEncoding::Rgb888,
    gst_video::VideoFormat::Bgr => PixelEncoding::Bgr888,
    gst_video::VideoFormat::Rgba => PixelEncoding::Rgba8888,
    gst_video::VideoFormat::Bgra => PixelEncoding::Bgra8888,
    gst_video::VideoFormat::Argb => PixelEncoding::Argb8888,
    other => PixelEncoding::Other(other.to_str().to_string()),
  }
}

fn convert_sample_to_frame(sample: gst::Sample) -> Result<Frame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width();
  let height = video_info.height();
  let encoding = pixel_encoding(video_info.format());

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  // 未知格式原样交给转换器，由转换器拒绝
  let Some(bpp) = encoding.bytes_per_pixel() else {
    return Ok(Frame::new(data.to_vec(), width, height, encoding));
  };

  let row = width as usize * bpp;
  let stride = video_info
    .stride()
    .first()
    .map(|s| *s as usize)
    .unwrap_or(row)
    .max(row);
  if height == 0 {
    return Ok(Frame::new(Vec::new(), width, height, encoding));
  }
  let expected = stride * (height as usize - 1) + row;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  // 去掉行尾对齐填充
  let mut packed = Vec::with_capacity(row * height as usize);
  for y in 0..height as usize {
    packed.extend_from_slice(&data[y * stride..y * stride + row]);
  }

  Ok(Frame::new(packed, width, height, encoding))
}
