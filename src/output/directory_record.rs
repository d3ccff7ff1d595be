// 该文件是 Darkbridge 项目的一部分。
// src/output/directory_record.rs - 按日期归档的目录记录输出
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  model::DetectResult,
  output::{RecordStyle, Render, draw::Draw},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

pub enum DrawWrapper {
  /// 保存带检测框的图像
  Draw(Box<Draw>),
  /// 保存原图，并在旁边写一份 JSON 记录
  Record,
}

impl DrawWrapper {
  fn save_result(
    &self,
    path: &Path,
    frame: &ImageFrame,
    result: &DetectResult,
    style: &RecordStyle,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_detection(&frame.image, result).save(path)?;
      }
      DrawWrapper::Record => {
        frame.image.save(path)?;
        let records = style.records(result);
        std::fs::write(
          path.with_extension("json"),
          serde_json::to_string_pretty(&records)?,
        )?;
      }
    };

    Ok(())
  }
}

/// 把每帧结果存入 `<目录>/<年>/<月>/<日>/<时-分-秒>-<序号>.png`
///
/// 默认只保存有检测结果的帧，带 `always` 参数时每帧都保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  style: RecordStyle,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: url_file_path(uri),
      draw: if record {
        DrawWrapper::Record
      } else {
        DrawWrapper::Draw(Box::default())
      },
      style: RecordStyle::default(),
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn with_style(mut self, style: RecordStyle) -> Self {
    self.style = style;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<ImageFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let path = self.frame_path(Utc::now())?;
    self.draw.save_result(&path, frame, result, &self.style)?;
    debug!("记录 {} 到 {}", frame.name, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transform::ResultBox;
  use chrono::TimeZone;
  use image::RgbImage;

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).expect("url");
    DirectoryRecordOutput::from_url(&url).expect("from_url")
  }

  fn frame() -> ImageFrame {
    ImageFrame {
      name: "x.png".to_string(),
      image: RgbImage::new(6, 6),
    }
  }

  #[test]
  fn frame_path_is_dated_and_counted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = output(dir.path(), "");
    let now = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).single().expect("time");

    let first = out.frame_path(now).expect("path");
    let second = out.frame_path(now).expect("path");
    assert_eq!(first, dir.path().join("2026/03/07/09-05-01-0001.png"));
    assert_eq!(second, dir.path().join("2026/03/07/09-05-01-0002.png"));
    assert!(dir.path().join("2026/03/07").is_dir());
  }

  #[test]
  fn empty_results_skipped_unless_always() {
    let dir = tempfile::tempdir().expect("tempdir");
    output(dir.path(), "")
      .render_result(&frame(), &DetectResult::default())
      .expect("render");
    assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);

    output(dir.path(), "?always")
      .render_result(&frame(), &DetectResult::default())
      .expect("render");
    assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 1);
  }

  #[test]
  fn record_mode_writes_json_sidecar() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = output(dir.path(), "?record");
    let result: DetectResult = vec![ResultBox {
      left: 0.0,
      top: 0.0,
      right: 3.0,
      bottom: 3.0,
      class_id: 4,
      confidence: 0.6,
    }]
    .into();
    out.render_result(&frame(), &result).expect("render");

    let now = Utc::now();
    let day = dir
      .path()
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    let json: Vec<PathBuf> = std::fs::read_dir(&day)
      .expect("read_dir")
      .filter_map(|e| e.ok().map(|e| e.path()))
      .filter(|p| p.extension().is_some_and(|e| e == "json"))
      .collect();
    assert_eq!(json.len(), 1);
    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&json[0]).expect("read")).expect("json");
    assert_eq!(value[0]["classID"], 5);
  }
}
