// 该文件是 Darkbridge 项目的一部分。
// src/input/image_folder.rs - 图像目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{ImageFrame, read_image_file::read_frame},
  url_file_path,
};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序遍历目录中的图像，无法解码的文件会被跳过
pub struct ImageFolderInput {
  files: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFolderInputError::SchemaMismatch);
    }
    Self::open(url_file_path(url))
  }
}

impl ImageFolderInput {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, ImageFolderInputError> {
    let directory = directory.into();
    let mut files: Vec<PathBuf> = std::fs::read_dir(&directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.is_file() && is_image(path))
      .collect();
    files.sort();

    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());
    Ok(Self {
      files: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

fn is_image(path: &std::path::Path) -> bool {
  path
    .extension()
    .map(|ext| ext.to_string_lossy().to_lowercase())
    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

impl Iterator for ImageFolderInput {
  type Item = ImageFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.files.pop_front() {
      match read_frame(&path) {
        Ok(frame) => return Some(frame),
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}
