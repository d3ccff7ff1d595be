// 该文件是 Darkbridge 项目的一部分。
// src/frame.rs - letterbox 网络输入帧定义
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

use image::{Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::transform::TransformParams;

const RGB_CHANNELS: usize = 3;
const PAD_VALUE: f32 = 0.5;

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
  #[error("空图像: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("网络输入尺寸无效: {0}x{1}")]
  InvalidFrameSize(u32, u32),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("不支持的通道数: {0}")]
  UnsupportedChannels(usize),
}

/// letterbox 之后的网络输入帧
///
/// 数据为 CHW 排列的 `f32`，取值范围 [0, 1]，填充区域为 0.5 灰色。
#[derive(Debug, Clone)]
pub struct LetterboxFrame {
  data: Box<[f32]>,
  width: u32,
  height: u32,
  content_width: u32,
  content_height: u32,
  original_width: u32,
  original_height: u32,
}

/// 保持宽高比时内容区域的尺寸
pub fn letterbox_content_size(original: (u32, u32), frame: (u32, u32)) -> (u32, u32) {
  let (orig_w, orig_h) = original;
  let (frame_w, frame_h) = frame;

  let (w, h) = if (frame_w as f32 / orig_w as f32) < (frame_h as f32 / orig_h as f32) {
    let h = (orig_h as u64 * frame_w as u64) / orig_w as u64;
    (frame_w, h as u32)
  } else {
    let w = (orig_w as u64 * frame_h as u64) / orig_h as u64;
    (w as u32, frame_h)
  };

  (w.max(1), h.max(1))
}

impl LetterboxFrame {
  /// 将 RGB 图像等比缩放并居中填充到 `width` x `height`
  pub fn letterbox(image: &RgbImage, width: u32, height: u32) -> Result<Self, FrameError> {
    let (orig_w, orig_h) = image.dimensions();
    if orig_w == 0 || orig_h == 0 {
      return Err(FrameError::EmptyImage(orig_w, orig_h));
    }
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidFrameSize(width, height));
    }

    let (content_w, content_h) = letterbox_content_size((orig_w, orig_h), (width, height));
    debug!(
      "letterbox: {}x{} -> {}x{} (帧 {}x{})",
      orig_w, orig_h, content_w, content_h, width, height
    );

    let resized = image::imageops::resize(image, content_w, content_h, FilterType::Triangle);

    let plane = (width as usize) * (height as usize);
    let mut data = vec![PAD_VALUE; RGB_CHANNELS * plane].into_boxed_slice();

    let dx = ((width - content_w) / 2) as usize;
    let dy = ((height - content_h) / 2) as usize;

    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize + dy) * (width as usize) + (x as usize + dx);
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Ok(Self {
      data,
      width,
      height,
      content_width: content_w,
      content_height: content_h,
      original_width: orig_w,
      original_height: orig_h,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn content_size(&self) -> (u32, u32) {
    (self.content_width, self.content_height)
  }

  pub fn original_size(&self) -> (u32, u32) {
    (self.original_width, self.original_height)
  }

  pub fn as_chw(&self) -> &[f32] {
    &self.data
  }

  /// 本帧对应的逆变换参数
  pub fn transform_params(&self) -> TransformParams {
    TransformParams::new(
      (self.width, self.height),
      (self.original_width, self.original_height),
      (self.content_width, self.content_height),
    )
  }
}

/// 将 CHW 排列、取值 [0, 1] 的浮点图像转换为 RGB 图像
///
/// 单通道图像会复制到三个通道。
pub fn planar_to_rgb(
  data: &[f32],
  width: u32,
  height: u32,
  channels: usize,
) -> Result<RgbImage, FrameError> {
  if channels != 1 && channels != RGB_CHANNELS {
    return Err(FrameError::UnsupportedChannels(channels));
  }
  let plane = (width as usize) * (height as usize);
  if data.len() != plane * channels {
    return Err(FrameError::LengthMismatch {
      expected: plane * channels,
      actual: data.len(),
    });
  }

  let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;

  Ok(RgbImage::from_fn(width, height, |x, y| {
    let idx = (y as usize) * (width as usize) + x as usize;
    if channels == 1 {
      let v = to_u8(data[idx]);
      Rgb([v, v, v])
    } else {
      Rgb([
        to_u8(data[idx]),
        to_u8(data[plane + idx]),
        to_u8(data[2 * plane + idx]),
      ])
    }
  }))
}
