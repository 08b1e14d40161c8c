// 该文件是 Kanjian （看见） 项目的一部分。
// src/ingest.rs - 带标签的训练样本上传
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

use std::{io::Cursor, time::Duration};

use image::{ImageFormat, RgbImage};
use reqwest::blocking::{
  Client,
  multipart::{Form, Part},
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ConvertedBuffer};

pub const DEFAULT_INGEST_HOST: &str = "ingestion.edgeimpulse.com";
pub const DEFAULT_INGEST_PATH: &str = "/api/training/files";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum IngestError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少参数: {0}")]
  MissingParameter(&'static str),
  #[error("HTTP 错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("PNG 编码失败: {0}")]
  EncodeError(#[from] image::ImageError),
  #[error("无效的图像缓冲区: {0}x{1}")]
  InvalidBuffer(u32, u32),
  #[error("服务器拒绝上传: {status} {message}")]
  Rejected { status: u16, message: String },
}

/// 以 multipart 表单上传 PNG 样本，标签与 API key 放在请求头中
///
/// URL 形式: `ingest://[host[:port]][/path]?label=..&api_key=..[&plain]`，
/// 省略 host 时使用默认的采集服务，`plain` 改用 http。
pub struct IngestUploader {
  client: Client,
  endpoint: String,
  label: String,
  api_key: String,
}

impl FromUrlWithScheme for IngestUploader {
  const SCHEME: &'static str = "ingest";
}

impl FromUrl for IngestUploader {
  type Error = IngestError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(IngestError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = |key: &str| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
    };
    let label = query("label")
      .filter(|v| !v.is_empty())
      .ok_or(IngestError::MissingParameter("label"))?;
    let api_key = query("api_key")
      .filter(|v| !v.is_empty())
      .ok_or(IngestError::MissingParameter("api_key"))?;
    let scheme = if query("plain").is_some() { "http" } else { "https" };

    let host = url
      .host_str()
      .filter(|h| !h.is_empty())
      .unwrap_or(DEFAULT_INGEST_HOST);
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = match url.path() {
      "" | "/" => DEFAULT_INGEST_PATH,
      path => path,
    };

    Self::new(format!("{}://{}{}{}", scheme, host, port, path), label, api_key)
  }
}

impl IngestUploader {
  pub fn new(
    endpoint: impl Into<String>,
    label: impl Into<String>,
    api_key: impl Into<String>,
  ) -> Result<Self, IngestError> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let endpoint = endpoint.into();
    info!("样本上传地址: {}", endpoint);
    Ok(Self {
      client,
      endpoint,
      label: label.into(),
      api_key: api_key.into(),
    })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  /// 上传一张已编码的 PNG，成功时返回 HTTP 状态码
  pub fn upload_png(&self, file_name: &str, png: Vec<u8>) -> Result<u16, IngestError> {
    let size = png.len();
    let part = Part::bytes(png)
      .file_name(file_name.to_string())
      .mime_str("image/png")?;
    let form = Form::new().part("data", part);

    let response = self
      .client
      .post(self.endpoint.as_str())
      .header("x-label", self.label.as_str())
      .header("x-api-key", self.api_key.as_str())
      .multipart(form)
      .send()?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().unwrap_or_default();
      return Err(IngestError::Rejected {
        status: status.as_u16(),
        message,
      });
    }
    debug!("已上传 {} ({} 字节): {}", file_name, size, status);
    Ok(status.as_u16())
  }

  pub fn upload(&self, file_name: &str, buffer: &ConvertedBuffer) -> Result<u16, IngestError> {
    self.upload_png(file_name, encode_png(buffer)?)
  }
}

/// 将 RGB 缓冲区编码为 PNG
pub fn encode_png(buffer: &ConvertedBuffer) -> Result<Vec<u8>, IngestError> {
  let (width, height) = (buffer.width(), buffer.height());
  let image = RgbImage::from_raw(width, height, buffer.as_bytes().to_vec())
    .ok_or(IngestError::InvalidBuffer(width, height))?;
  let mut png = Cursor::new(Vec::new());
  image.write_to(&mut png, ImageFormat::Png)?;
  Ok(png.into_inner())
}

/// 样本文件名: `<label>.<序号>.png`
pub fn sample_file_name(label: &str, index: usize) -> String {
  format!("{}.{:04}.png", label, index)
}
