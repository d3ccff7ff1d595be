// 该文件是 Darkbridge 项目的一部分。
// src/transform.rs - 网络空间边界框到原图坐标的逆变换
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

/// 网络空间中的边界框，中心点与宽高均归一化到 [0, 1]（相对于填充后的输入帧）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct NetBox {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl NetBox {
  pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
    Self { x, y, w, h }
  }

  fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
  }
}

/// 原图像素坐标下的检测框
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[repr(C)]
pub struct ResultBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
  pub class_id: i32,
  pub confidence: f32,
}

/// 单张图像的 letterbox 逆变换参数
///
/// `start_*` 为填充偏移，`end_*` 为有效区域的最后一个像素（含），
/// `frame_*` 为填充后网络输入帧的尺寸，`scale_*` 为原图与缩放内容的比值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
  pub start_x: i32,
  pub start_y: i32,
  pub end_x: i32,
  pub end_y: i32,
  pub frame_width: u32,
  pub frame_height: u32,
  pub original_width: u32,
  pub original_height: u32,
  pub scale_w: f64,
  pub scale_h: f64,
}

impl TransformParams {
  /// 根据网络帧尺寸、原图尺寸和 letterbox 内容尺寸计算变换参数
  ///
  /// 宽度缩放比更小时宽度方向不填充（`start_x = 0`），高度方向居中填充；反之亦然。
  pub fn new(
    frame: (u32, u32),
    original: (u32, u32),
    content: (u32, u32),
  ) -> Self {
    let (frame_width, frame_height) = frame;
    let (original_width, original_height) = original;
    let (content_width, content_height) = content;

    let width_ratio = frame_width as f32 / original_width as f32;
    let height_ratio = frame_height as f32 / original_height as f32;

    let (start_x, start_y) = if width_ratio < height_ratio {
      (0, (frame_height as i32 - content_height as i32) / 2)
    } else {
      ((frame_width as i32 - content_width as i32) / 2, 0)
    };

    Self {
      start_x,
      start_y,
      end_x: start_x + content_width as i32 - 1,
      end_y: start_y + content_height as i32 - 1,
      frame_width,
      frame_height,
      original_width,
      original_height,
      scale_w: original_width as f64 / content_width as f64,
      scale_h: original_height as f64 / content_height as f64,
    }
  }

  /// 将网络空间边界框映射回原图坐标
  ///
  /// 完全落在填充区域内、或裁剪后退化为零面积的框返回 `None`。
  pub fn transform_box(&self, b: &NetBox, class_id: i32, confidence: f32) -> Option<ResultBox> {
    if !b.is_finite() {
      return None;
    }

    let (x, y, w, h) = (b.x as f64, b.y as f64, b.w as f64, b.h as f64);
    let frame_w = self.frame_width as f64;
    let frame_h = self.frame_height as f64;

    // 截断取整，与帧像素网格对齐
    let mut left = ((x - w / 2.0) * frame_w) as i32;
    let mut right = ((x + w / 2.0) * frame_w) as i32;
    let mut top = ((y - h / 2.0) * frame_h) as i32;
    let mut bottom = ((y + h / 2.0) * frame_h) as i32;

    if left > self.end_x || right < self.start_x || top > self.end_y || bottom < self.start_y {
      return None;
    }

    left = left.max(self.start_x);
    right = right.min(self.end_x);
    top = top.max(self.start_y);
    bottom = bottom.min(self.end_y);

    let result = ResultBox {
      left: ((left - self.start_x) as f64 * self.scale_w) as f32,
      right: ((right - self.start_x) as f64 * self.scale_w) as f32,
      top: ((top - self.start_y) as f64 * self.scale_h) as f32,
      bottom: ((bottom - self.start_y) as f64 * self.scale_h) as f32,
      class_id,
      confidence,
    };

    if result.left as i32 >= result.right as i32 || result.top as i32 >= result.bottom as i32 {
      return None;
    }

    Some(result)
  }
}
