// 该文件是 Darkbridge 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  model::DetectResult,
  output::{Render, draw::Draw},
  url_file_path,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    if let Some(thickness) = uri
      .query_pairs()
      .find(|(k, _)| k == "thickness")
      .and_then(|(_, v)| v.parse().ok())
    {
      draw = draw.with_thickness(thickness);
    }

    Ok(SaveImageFileOutput {
      path: url_file_path(uri),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      draw: Draw::default(),
    }
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<ImageFrame, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.draw_detection(&frame.image, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transform::ResultBox;
  use image::RgbImage;

  #[test]
  fn saves_annotated_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("pred.png");
    let output = SaveImageFileOutput::new(&path);

    let frame = ImageFrame {
      name: "in.png".to_string(),
      image: RgbImage::new(16, 12),
    };
    let result: DetectResult = vec![ResultBox {
      left: 1.0,
      top: 1.0,
      right: 10.0,
      bottom: 8.0,
      class_id: 0,
      confidence: 0.7,
    }]
    .into();
    output.render_result(&frame, &result).expect("render");

    let saved = image::open(&path).expect("open").to_rgb8();
    assert_eq!(saved.dimensions(), (16, 12));
    assert_eq!(saved.get_pixel(1, 1).0, [255, 0, 0]);
  }

  #[test]
  fn thickness_from_query() {
    let url = Url::parse("image:///tmp/out.png?thickness=4").expect("url");
    let output = SaveImageFileOutput::from_url(&url).expect("from_url");
    assert_eq!(output.path, PathBuf::from("/tmp/out.png"));
  }
}
