// 该文件是 Darkbridge 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{model::DetectResult, transform::ResultBox};

const BOX_THICKNESS: i32 = 2;

// 按类别循环取色
const PALETTE: [[u8; 3]; 6] = [
  [255, 0, 0],
  [0, 255, 0],
  [0, 0, 255],
  [255, 255, 0],
  [255, 0, 255],
  [0, 255, 255],
];

pub struct Draw {
  thickness: i32,
  palette: &'static [[u8; 3]],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      palette: &PALETTE,
    }
  }
}

impl Draw {
  pub fn with_thickness(mut self, thickness: i32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  fn color_of(&self, class_id: i32) -> Rgb<u8> {
    let index = class_id.rem_euclid(self.palette.len() as i32) as usize;
    Rgb(self.palette[index])
  }

  // 检测框为原图像素坐标，超出部分裁到图像内
  fn draw_box(&self, image: &mut RgbImage, item: &ResultBox) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (item.left.floor() as i32).clamp(0, w - 1);
    let y_min = (item.top.floor() as i32).clamp(0, h - 1);
    let x_max = (item.right.ceil() as i32).clamp(0, w - 1);
    let y_max = (item.bottom.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color_of(item.class_id);
    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.iter() {
      self.draw_box(image, item);
    }
  }

  pub fn draw_detection(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut image = image.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}
