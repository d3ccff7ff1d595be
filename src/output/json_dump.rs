// 该文件是 Darkbridge 项目的一部分。
// src/output/json_dump.rs - 检测结果 JSON 输出
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  model::DetectResult,
  output::{RecordStyle, Render},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum JsonDumpOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 把检测结果写成 JSON 数组
///
/// 路径为已存在的目录时，每帧写入 `<目录>/<文件名>.json`，否则覆盖写入同一个文件。
pub struct JsonDumpOutput {
  path: PathBuf,
  style: RecordStyle,
}

impl FromUrlWithScheme for JsonDumpOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonDumpOutput {
  type Error = JsonDumpOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonDumpOutputError::SchemeMismatch);
    }
    Ok(Self::new(url_file_path(url)))
  }
}

impl JsonDumpOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      style: RecordStyle::default(),
    }
  }

  pub fn with_style(mut self, style: RecordStyle) -> Self {
    self.style = style;
    self
  }

  fn target(&self, frame: &ImageFrame) -> PathBuf {
    if self.path.is_dir() {
      let stem = Path::new(&frame.name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result".to_string());
      self.path.join(format!("{stem}.json"))
    } else {
      self.path.clone()
    }
  }
}

impl Render<ImageFrame, DetectResult> for JsonDumpOutput {
  type Error = JsonDumpOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let target = self.target(frame);
    if let Some(parent) = target.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let records = self.style.records(result);
    std::fs::write(&target, serde_json::to_string_pretty(&records)?)?;
    info!("写入 {} 条检测记录到 {}", records.len(), target.display());
    Ok(())
  }
}
