// 该文件是 Darkbridge 项目的一部分。
// src/config.rs - 运行配置、darknet 数据文件与类别标签
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
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{GridParam, NetworkSpec, SlidingWindow};

const DEFAULT_THRESH: f32 = 0.24;
const DEFAULT_HIER_THRESH: f32 = 0.5;
const DEFAULT_NAMES: &str = "data/names.list";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("缺少模型描述文件 (yolo.model_def_path)")]
  MissingModelDef,
}

/// `yolo` 小节
#[derive(Debug, Clone, Deserialize)]
pub struct YoloSection {
  pub model_def_path: Option<PathBuf>,
  #[serde(default = "default_thresh")]
  pub thresh: f32,
  #[serde(default = "default_hier_thresh")]
  pub hier_thresh: f32,
  pub cfg_width: Option<i32>,
}

/// `pred_options` 小节，优先级高于 `yolo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredOptions {
  pub thresh: Option<f32>,
  pub cfg_width: Option<i32>,
}

/// `sliding_predict` 小节
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlidingSection {
  #[serde(default)]
  pub sliding_window: bool,
  #[serde(default)]
  pub step: u32,
  #[serde(default)]
  pub overlap: u32,
}

/// JSON 运行配置
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
  pub weights: Option<PathBuf>,
  /// darknet `.data` 文件
  pub hypes: Option<PathBuf>,
  pub yolo: YoloSection,
  #[serde(default)]
  pub pred_options: Option<PredOptions>,
  #[serde(default)]
  pub sliding_predict: Option<SlidingSection>,
  /// 固定输出的类别 ID
  #[serde(rename = "classID")]
  pub class_id: Option<i32>,
}

fn default_thresh() -> f32 {
  DEFAULT_THRESH
}

fn default_hier_thresh() -> f32 {
  DEFAULT_HIER_THRESH
}

impl RunConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Self::from_json(&content)
  }

  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: RunConfig = serde_json::from_str(content)?;
    if config.yolo.model_def_path.is_none() {
      return Err(ConfigError::MissingModelDef);
    }
    Ok(config)
  }

  pub fn threshold(&self) -> f32 {
    self
      .pred_options
      .as_ref()
      .and_then(|p| p.thresh)
      .unwrap_or(self.yolo.thresh)
  }

  pub fn hier_threshold(&self) -> f32 {
    self.yolo.hier_thresh
  }

  /// 网格宽度覆盖，取正方形以保持宽高比
  pub fn grid(&self) -> Option<GridParam> {
    self
      .pred_options
      .as_ref()
      .and_then(|p| p.cfg_width)
      .or(self.yolo.cfg_width)
      .map(GridParam::square)
  }

  pub fn network_spec(&self) -> Result<NetworkSpec, ConfigError> {
    let config = self
      .yolo
      .model_def_path
      .clone()
      .ok_or(ConfigError::MissingModelDef)?;
    Ok(NetworkSpec {
      config,
      weights: self.weights.clone(),
      grid: self.grid(),
    })
  }

  pub fn sliding_window(&self) -> Option<SlidingWindow> {
    self
      .sliding_predict
      .as_ref()
      .filter(|s| s.sliding_window)
      .map(|s| SlidingWindow {
        step: s.step,
        overlap: s.overlap,
      })
  }

  pub fn class_id_policy(&self) -> ClassIdPolicy {
    match self.class_id {
      Some(id) => ClassIdPolicy::Fixed(id),
      None => ClassIdPolicy::Shifted,
    }
  }

  /// 通过 `hypes` 指向的 `.data` 文件读取类别名称，路径按 darknet 习惯相对当前目录
  pub fn load_labels(&self) -> Result<Option<Labels>, ConfigError> {
    let Some(hypes) = &self.hypes else {
      return Ok(None);
    };
    let data = DataConfig::from_file(hypes)?;
    let labels = Labels::from_file(data.names_path())?;
    if let Some(classes) = data.classes()
      && classes != labels.len()
    {
      warn!(
        "类别数 {} 与名称文件中的 {} 个名称不一致",
        classes,
        labels.len()
      );
    }
    Ok(Some(labels))
  }
}

/// 输出类别 ID 的映射方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassIdPolicy {
  /// 检测器原始 ID
  Raw,
  /// 原始 ID + 1，0 号留给背景
  #[default]
  Shifted,
  /// 固定 ID
  Fixed(i32),
}

impl ClassIdPolicy {
  pub fn apply(&self, class_id: i32) -> i32 {
    match self {
      ClassIdPolicy::Raw => class_id,
      ClassIdPolicy::Shifted => class_id + 1,
      ClassIdPolicy::Fixed(id) => *id,
    }
  }
}

/// darknet `.data` 选项文件（`key = value`，`#` 开头为注释）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataConfig {
  options: BTreeMap<String, String>,
}

impl DataConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(Self::parse(&content))
  }

  pub fn parse(content: &str) -> Self {
    let mut options = BTreeMap::new();
    for (lineno, line) in content.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        continue;
      }
      match line.split_once('=') {
        Some((key, value)) => {
          options.insert(key.trim().to_string(), value.trim().to_string());
        }
        None => warn!("无法解析第 {} 行: {}", lineno + 1, line),
      }
    }
    Self { options }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.options.get(key).map(String::as_str)
  }

  pub fn classes(&self) -> Option<usize> {
    self.get("classes").and_then(|v| v.parse().ok())
  }

  pub fn names_path(&self) -> PathBuf {
    PathBuf::from(self.get("names").unwrap_or(DEFAULT_NAMES))
  }
}

/// 类别名称列表，每行一个
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let labels = Self::parse(&content);
    debug!("读取 {} 个类别名称", labels.len());
    Ok(labels)
  }

  pub fn parse(content: &str) -> Self {
    Self {
      names: content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: i32) -> Option<&str> {
    usize::try_from(class_id)
      .ok()
      .and_then(|idx| self.names.get(idx))
      .map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"{
    "weights": "backup/yolo-my_final.weights",
    "hypes": "ds/my.data",
    "yolo": {
      "model_def_path": "cfg/yolo-my-test.cfg",
      "thresh": 0.3,
      "hier_thresh": 0.4,
      "cfg_width": 608
    },
    "sliding_predict": { "sliding_window": true, "step": 416, "overlap": 32 }
  }"#;

  #[test]
  fn parses_run_config() {
    let config = RunConfig::from_json(SAMPLE).expect("config");
    assert_eq!(config.threshold(), 0.3);
    assert_eq!(config.hier_threshold(), 0.4);
    assert_eq!(config.grid(), Some(GridParam::square(608)));
    assert_eq!(
      config.sliding_window(),
      Some(SlidingWindow {
        step: 416,
        overlap: 32
      })
    );
    assert_eq!(config.class_id_policy(), ClassIdPolicy::Shifted);

    let spec = config.network_spec().expect("spec");
    assert_eq!(spec.config, PathBuf::from("cfg/yolo-my-test.cfg"));
    assert_eq!(
      spec.weights,
      Some(PathBuf::from("backup/yolo-my_final.weights"))
    );
  }

  #[test]
  fn pred_options_override_yolo() {
    let json = r#"{
      "yolo": { "model_def_path": "a.cfg", "thresh": 0.3, "cfg_width": 416 },
      "pred_options": { "thresh": 0.6, "cfg_width": 320 },
      "classID": 7
    }"#;
    let config = RunConfig::from_json(json).expect("config");
    assert_eq!(config.threshold(), 0.6);
    assert_eq!(config.hier_threshold(), DEFAULT_HIER_THRESH);
    assert_eq!(config.grid(), Some(GridParam::square(320)));
    assert_eq!(config.sliding_window(), None);
    assert_eq!(config.class_id_policy(), ClassIdPolicy::Fixed(7));
  }

  #[test]
  fn model_def_is_required() {
    let json = r#"{ "yolo": { "thresh": 0.3 } }"#;
    assert!(matches!(
      RunConfig::from_json(json),
      Err(ConfigError::MissingModelDef)
    ));
  }

  #[test]
  fn class_id_policy() {
    assert_eq!(ClassIdPolicy::Raw.apply(3), 3);
    assert_eq!(ClassIdPolicy::Shifted.apply(3), 4);
    assert_eq!(ClassIdPolicy::Fixed(9).apply(3), 9);
  }

  #[test]
  fn parses_data_file() {
    let data = DataConfig::parse(
      "# comment\nclasses= 19\ntrain  = ds/train.txt\nnames = ds/names.list\n\nbroken line\n",
    );
    assert_eq!(data.classes(), Some(19));
    assert_eq!(data.get("train"), Some("ds/train.txt"));
    assert_eq!(data.names_path(), PathBuf::from("ds/names.list"));
    assert_eq!(DataConfig::default().names_path(), PathBuf::from(DEFAULT_NAMES));
  }

  #[test]
  fn labels_lookup() {
    let labels = Labels::parse("person\ncar\n\n");
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.name(1), Some("car"));
    assert_eq!(labels.name(2), None);
    assert_eq!(labels.name(-1), None);
  }

  #[test]
  fn labels_through_hypes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let names = dir.path().join("names.list");
    std::fs::write(&names, "bolt\nnut\n").expect("write");
    let data = dir.path().join("my.data");
    std::fs::write(&data, format!("classes = 2\nnames = {}\n", names.display())).expect("write");

    let json = format!(
      r#"{{ "hypes": {:?}, "yolo": {{ "model_def_path": "a.cfg" }} }}"#,
      data.display().to_string()
    );
    let config = RunConfig::from_json(&json).expect("config");
    let labels = config.load_labels().expect("labels").expect("some");
    assert_eq!(labels.name(1), Some("nut"));

    let bare = RunConfig::from_json(r#"{ "yolo": { "model_def_path": "a.cfg" } }"#).expect("config");
    assert!(bare.load_labels().expect("labels").is_none());
  }
}
