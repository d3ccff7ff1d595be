// 该文件是 Darkbridge 项目的一部分。
// src/input.rs - 图像输入
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

use image::RgbImage;
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

/// 一张待推理的原始图像
#[derive(Debug, Clone)]
pub struct ImageFrame {
  /// 来源文件名（不含目录）
  pub name: String,
  pub image: RgbImage,
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod image_folder;
pub use self::image_folder::{ImageFolderInput, ImageFolderInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Image folder input error: {0}")]
  ImageFolderInputError(#[from] ImageFolderInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  ImageFolder(ImageFolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      ImageFolderInput::SCHEME => Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = ImageFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::ImageFolder(input) => input.next(),
    }
  }
}
