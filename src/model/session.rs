// 该文件是 Darkbridge 项目的一部分。
// src/model/session.rs - 检测器会话（持有当前检测器）
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{FrameError, LetterboxFrame},
  model::{DetectResult, Detector, GridParam, NetworkSpec},
  postprocess::collect_detections,
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("检测器尚未初始化")]
  NotInitialized,
  #[error("检测器错误: {0}")]
  Detector(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("输入帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("图像路径不存在: {0}")]
  PathNotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("滑动窗口参数无效: step={step}, overlap={overlap}")]
  InvalidWindow { step: u32, overlap: u32 },
}

/// 沿纵向切分图像的滑动窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
  /// 每个条带的高度
  pub step: u32,
  /// 相邻条带的重叠行数
  pub overlap: u32,
}

impl SlidingWindow {
  /// 条带的 (起始行, 高度)，保证覆盖到最后一行
  pub fn strips(&self, height: u32) -> Result<Vec<(u32, u32)>, SessionError> {
    self.validate()?;
    let stride = self.step - self.overlap;
    let mut strips = Vec::new();
    let mut start = 0u32;
    loop {
      let end = start.saturating_add(self.step).min(height);
      strips.push((start, end - start));
      if end >= height {
        break;
      }
      start += stride;
    }
    Ok(strips)
  }

  pub fn validate(&self) -> Result<(), SessionError> {
    if self.step == 0 || self.overlap >= self.step {
      return Err(SessionError::InvalidWindow {
        step: self.step,
        overlap: self.overlap,
      });
    }
    Ok(())
  }
}

/// 显式持有的检测器句柄
///
/// 同一时刻至多持有一个检测器；`predict_*` 需要 `&mut self`，调用天然串行。
pub struct Session<D: Detector> {
  detector: Option<D>,
}

impl<D: Detector> Default for Session<D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<D: Detector> Session<D> {
  pub fn new() -> Self {
    Self { detector: None }
  }

  /// 用已构建的检测器创建会话
  pub fn with_detector(detector: D) -> Self {
    Self {
      detector: Some(detector),
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.detector.is_some()
  }

  pub fn detector(&self) -> Option<&D> {
    self.detector.as_ref()
  }

  pub fn initialize(
    &mut self,
    config: impl AsRef<Path>,
    weights: Option<&Path>,
  ) -> Result<(), SessionError> {
    let mut spec = NetworkSpec::new(config.as_ref());
    spec.weights = weights.map(Path::to_path_buf);
    self.load(&spec)
  }

  pub fn initialize_with_grid(
    &mut self,
    config: impl AsRef<Path>,
    weights: Option<&Path>,
    grid: GridParam,
  ) -> Result<(), SessionError> {
    let mut spec = NetworkSpec::new(config.as_ref()).grid(Some(grid));
    spec.weights = weights.map(Path::to_path_buf);
    self.load(&spec)
  }

  /// 加载检测器；已有的检测器会先被释放
  pub fn load(&mut self, spec: &NetworkSpec) -> Result<(), SessionError> {
    if self.detector.take().is_some() {
      info!("释放当前检测器");
    }

    info!("加载网络配置: {}", spec.config.display());
    if let Some(weights) = &spec.weights {
      info!("加载权重文件: {}", weights.display());
    }
    if let Some(grid) = spec.grid {
      debug!("覆盖网络输入尺寸: {}x{}", grid.width, grid.height);
    }

    let detector = D::load(spec).map_err(|e| SessionError::Detector(Box::new(e)))?;
    let (w, h) = detector.network_size();
    info!("检测器加载完成，网络输入尺寸: {}x{}", w, h);

    self.detector = Some(detector);
    Ok(())
  }

  /// 释放当前检测器
  pub fn release(&mut self) {
    if self.detector.take().is_some() {
      info!("检测器已释放");
    }
  }

  pub fn predict_image(
    &mut self,
    image: &RgbImage,
    threshold: f32,
    hier_threshold: f32,
  ) -> Result<DetectResult, SessionError> {
    let detector = self.detector.as_mut().ok_or(SessionError::NotInitialized)?;

    let (width, height) = detector.network_size();
    let frame = LetterboxFrame::letterbox(image, width, height)?;

    let now = std::time::Instant::now();
    let raw = detector
      .predict(&frame, threshold, hier_threshold)
      .map_err(|e| SessionError::Detector(Box::new(e)))?;
    debug!("推理完成，耗时: {:.2?}, 原始框数量: {}", now.elapsed(), raw.len());

    Ok(collect_detections(&raw, threshold, &frame.transform_params()))
  }

  pub fn predict_path(
    &mut self,
    path: impl AsRef<Path>,
    threshold: f32,
    hier_threshold: f32,
  ) -> Result<DetectResult, SessionError> {
    if !self.is_initialized() {
      return Err(SessionError::NotInitialized);
    }

    let path = path.as_ref();
    if !path.exists() {
      warn!("图像路径不存在: {}", path.display());
      return Err(SessionError::PathNotFound(path.to_path_buf()));
    }

    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    self.predict_image(&image, threshold, hier_threshold)
  }

  /// 按条带推理，结果换算回整图坐标
  pub fn predict_sliding(
    &mut self,
    image: &RgbImage,
    window: SlidingWindow,
    threshold: f32,
    hier_threshold: f32,
  ) -> Result<DetectResult, SessionError> {
    let (width, height) = image.dimensions();
    let strips = window.strips(height)?;
    if !self.is_initialized() {
      return Err(SessionError::NotInitialized);
    }

    let max_y = height as f32;
    let mut items = Vec::new();

    // TODO: 合并相邻条带重叠区域内的重复检测框
    for (start, strip_height) in strips {
      debug!("条带: y={} 高度={}", start, strip_height);
      let strip = image::imageops::crop_imm(image, 0, start, width, strip_height).to_image();
      let result = self.predict_image(&strip, threshold, hier_threshold)?;
      items.extend(result.iter().map(|item| {
        let mut item = *item;
        item.top = (item.top + start as f32).clamp(0.0, max_y);
        item.bottom = (item.bottom + start as f32).clamp(0.0, max_y);
        item
      }));
    }

    Ok(items.into())
  }
}
