// 该文件是 Darkbridge 项目的一部分。
// src/model.rs - 检测器接口与检测结果
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::LetterboxFrame,
  transform::{NetBox, ResultBox},
  url_file_path,
};

/// 外部目标检测器
///
/// 网络解析、权重加载、前向推理和 NMS 都由实现方负责，
/// 本库只消费 `predict` 返回的原始框与类别概率。
pub trait Detector: Sized {
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(spec: &NetworkSpec) -> Result<Self, Self::Error>;

  /// 网络输入帧尺寸 (宽, 高)
  fn network_size(&self) -> (u32, u32);

  fn predict(
    &mut self,
    frame: &LetterboxFrame,
    threshold: f32,
    hier_threshold: f32,
  ) -> Result<Vec<RawDetection>, Self::Error>;
}

/// 检测器输出的一行：网络空间边界框和每个类别的概率
#[derive(Debug, Clone)]
pub struct RawDetection {
  pub bbox: NetBox,
  pub probs: Box<[f32]>,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[ResultBox]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ResultBox> {
    self.items.iter()
  }
}

impl From<Vec<ResultBox>> for DetectResult {
  fn from(items: Vec<ResultBox>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 初始化时覆盖网络输入尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GridParam {
  pub width: i32,
  pub height: i32,
}

impl GridParam {
  /// 正方形网格，保持 letterbox 的宽高比
  pub fn square(size: i32) -> Self {
    Self {
      width: size,
      height: size,
    }
  }
}

/// 检测器的加载参数
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
  pub config: PathBuf,
  pub weights: Option<PathBuf>,
  pub grid: Option<GridParam>,
}

impl NetworkSpec {
  pub fn new(config: impl Into<PathBuf>) -> Self {
    Self {
      config: config.into(),
      weights: None,
      grid: None,
    }
  }

  pub fn weights(mut self, weights: impl Into<PathBuf>) -> Self {
    self.weights = Some(weights.into());
    self
  }

  pub fn grid(mut self, grid: Option<GridParam>) -> Self {
    self.grid = grid;
    self
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum NetworkSpecError {
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
  #[error("网格参数无效: {0}")]
  InvalidGrid(String),
}

impl FromUrlWithScheme for NetworkSpec {
  const SCHEME: &'static str = "darknet";
}

impl FromUrl for NetworkSpec {
  type Error = NetworkSpecError;

  /// `darknet:///cfg/yolo.cfg?weights=/backup/yolo.weights&width=608&height=608`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(NetworkSpecError::SchemeMismatch(Self::SCHEME));
    }

    let mut spec = NetworkSpec::new(url_file_path(url));
    let mut width = None;
    let mut height = None;

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "weights" => spec.weights = Some(PathBuf::from(v.as_ref())),
        "width" => width = Some(parse_grid(&v)?),
        "height" => height = Some(parse_grid(&v)?),
        "grid" => {
          let size = parse_grid(&v)?;
          width = Some(size);
          height = Some(size);
        }
        _ => {}
      }
    }

    spec.grid = match (width, height) {
      (Some(width), Some(height)) => Some(GridParam { width, height }),
      (Some(size), None) | (None, Some(size)) => Some(GridParam::square(size)),
      (None, None) => None,
    };

    Ok(spec)
  }
}

fn parse_grid(value: &str) -> Result<i32, NetworkSpecError> {
  match value.parse::<i32>() {
    Ok(size) if size > 0 => Ok(size),
    _ => Err(NetworkSpecError::InvalidGrid(value.to_string())),
  }
}

mod session;
pub use self::session::{Session, SessionError, SlidingWindow};

#[cfg(feature = "darknet")]
mod darknet;
#[cfg(feature = "darknet")]
pub use self::darknet::{DarknetDetector, DarknetError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn spec_from_url() {
    let url =
      Url::parse("darknet:///cfg/yolo.cfg?weights=/backup/yolo.weights&width=608&height=416")
        .expect("url");
    let spec = NetworkSpec::from_url(&url).expect("spec");
    assert_eq!(spec.config, PathBuf::from("/cfg/yolo.cfg"));
    assert_eq!(spec.weights, Some(PathBuf::from("/backup/yolo.weights")));
    assert_eq!(
      spec.grid,
      Some(GridParam {
        width: 608,
        height: 416
      })
    );
  }

  #[test]
  fn single_grid_dimension_is_square() {
    let url = Url::parse("darknet:///yolo.cfg?width=320").expect("url");
    let spec = NetworkSpec::from_url(&url).expect("spec");
    assert_eq!(spec.grid, Some(GridParam::square(320)));
    assert_eq!(spec.weights, None);
  }

  #[test]
  fn spec_rejects_other_scheme() {
    let url = Url::parse("image:///yolo.cfg").expect("url");
    assert_eq!(
      NetworkSpec::from_url(&url),
      Err(NetworkSpecError::SchemeMismatch("darknet"))
    );
  }

  #[test]
  fn spec_rejects_bad_grid() {
    let url = Url::parse("darknet:///yolo.cfg?grid=-1").expect("url");
    assert!(matches!(
      NetworkSpec::from_url(&url),
      Err(NetworkSpecError::InvalidGrid(_))
    ));
  }
}
