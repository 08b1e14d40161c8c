// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 回放推理结果的引擎
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

//! # 回放引擎
//!
//! 从 JSON Lines 文件读取事先记录的推理结果，每次推理返回下一条，
//! 读到末尾后从头循环。`null` 行表示该次推理没有结果。
//!
//! ```text
//! replay:///path/to/results.jsonl
//! ```

use std::io::BufRead;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ConvertedBuffer,
  model::{InferenceEngine, InferenceResult},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行 JSON 解析错误: {source}")]
  JsonError {
    line: usize,
    source: serde_json::Error,
  },
  #[error("回放文件中没有记录")]
  Empty,
  #[error("第 {0} 条记录没有推理结果")]
  NoResult(usize),
}

pub struct ReplayEngine {
  records: Vec<Option<InferenceResult>>,
  cursor: usize,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    info!("加载回放文件: {}", url.path());
    let file = std::fs::File::open(url.path())?;
    Self::from_reader(std::io::BufReader::new(file))
  }
}

impl ReplayEngine {
  pub fn new(records: Vec<Option<InferenceResult>>) -> Result<Self, ReplayError> {
    if records.is_empty() {
      return Err(ReplayError::Empty);
    }
    Ok(Self { records, cursor: 0 })
  }

  pub fn from_reader(reader: impl BufRead) -> Result<Self, ReplayError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      let record = serde_json::from_str::<Option<InferenceResult>>(&line).map_err(|source| {
        ReplayError::JsonError {
          line: index + 1,
          source,
        }
      })?;
      records.push(record);
    }

    debug!("回放记录数: {}", records.len());
    Self::new(records)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ReplayError;

  fn infer(&mut self, _input: &ConvertedBuffer) -> Result<InferenceResult, Self::Error> {
    let index = self.cursor % self.records.len();
    self.cursor = self.cursor.wrapping_add(1);
    self.records[index]
      .clone()
      .ok_or(ReplayError::NoResult(index))
  }
}
