// 该文件是 Darkbridge 项目的一部分。
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

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::config::{ClassIdPolicy, Labels};
use crate::input::ImageFrame;
use crate::model::DetectResult;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// JSON 中的一条检测记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  #[serde(rename = "classID")]
  pub class_id: i32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub confidence: f32,
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

/// 输出端共用的类别映射与标签
#[derive(Debug, Clone, Default)]
pub struct RecordStyle {
  pub policy: ClassIdPolicy,
  pub labels: Option<Labels>,
}

impl RecordStyle {
  /// 标签按检测器原始类别 ID 查找，输出 ID 按策略映射
  pub fn records(&self, result: &DetectResult) -> Vec<DetectionRecord> {
    result
      .iter()
      .map(|item| DetectionRecord {
        class_id: self.policy.apply(item.class_id),
        name: self
          .labels
          .as_ref()
          .and_then(|labels| labels.name(item.class_id))
          .map(str::to_string),
        confidence: item.confidence,
        x1: item.left,
        y1: item.top,
        x2: item.right,
        y2: item.bottom,
      })
      .collect()
  }
}

mod json_dump;
pub use self::json_dump::{JsonDumpOutput, JsonDumpOutputError};

#[cfg(feature = "save_image_file")]
pub mod draw;

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
  #[error("JSON 输出错误: {0}")]
  JsonDumpOutputError(#[from] JsonDumpOutputError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  JsonDumpOutput(JsonDumpOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonDumpOutput::SCHEME => {
        let output = JsonDumpOutput::from_url(url)?;
        Ok(OutputWrapper::JsonDumpOutput(output))
      }
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

impl OutputWrapper {
  pub fn with_style(self, style: RecordStyle) -> Self {
    match self {
      OutputWrapper::JsonDumpOutput(output) => {
        OutputWrapper::JsonDumpOutput(output.with_style(style))
      }
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => OutputWrapper::SaveImageFileOutput(output),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        OutputWrapper::DirectoryRecordOutput(output.with_style(style))
      }
    }
  }
}

impl Render<ImageFrame, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonDumpOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
