// 该文件是 Darkbridge 项目的一部分。
// tests/common/mod.rs - 测试用的脚本化检测器
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

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use darkbridge::{
  frame::LetterboxFrame,
  model::{Detector, NetworkSpec, RawDetection},
  transform::NetBox,
};
use thiserror::Error;

thread_local! {
  static DROPS: Cell<usize> = const { Cell::new(0) };
  static NEXT_SCRIPT: RefCell<Vec<RawDetection>> = const { RefCell::new(Vec::new()) };
}

/// 当前线程内被释放的检测器数量
pub fn drops() -> usize {
  DROPS.with(Cell::get)
}

/// 下一次 `load` 得到的检测器会返回这些检测
pub fn script_next_load(script: Vec<RawDetection>) {
  NEXT_SCRIPT.with(|s| *s.borrow_mut() = script);
}

pub fn raw(x: f32, y: f32, w: f32, h: f32, probs: &[f32]) -> RawDetection {
  RawDetection {
    bbox: NetBox::new(x, y, w, h),
    probs: probs.into(),
  }
}

#[derive(Error, Debug)]
#[error("无法加载网络: {0}")]
pub struct ScriptedError(pub String);

/// 每次推理都返回同一组预设检测，并记录看到的帧
pub struct ScriptedDetector {
  pub size: (u32, u32),
  pub script: Vec<RawDetection>,
  pub frames: Vec<(u32, u32, (u32, u32))>,
  pub thresholds: Vec<(f32, f32)>,
}

impl ScriptedDetector {
  pub fn new(size: (u32, u32), script: Vec<RawDetection>) -> Self {
    Self {
      size,
      script,
      frames: Vec::new(),
      thresholds: Vec::new(),
    }
  }
}

impl Drop for ScriptedDetector {
  fn drop(&mut self) {
    DROPS.with(|d| d.set(d.get() + 1));
  }
}

impl Detector for ScriptedDetector {
  type Error = ScriptedError;

  fn load(spec: &NetworkSpec) -> Result<Self, Self::Error> {
    if spec.config.to_string_lossy().contains("missing") {
      return Err(ScriptedError(spec.config.display().to_string()));
    }
    let size = spec
      .grid
      .map(|g| (g.width as u32, g.height as u32))
      .unwrap_or((416, 416));
    let script = NEXT_SCRIPT.with(|s| std::mem::take(&mut *s.borrow_mut()));
    Ok(Self::new(size, script))
  }

  fn network_size(&self) -> (u32, u32) {
    self.size
  }

  fn predict(
    &mut self,
    frame: &LetterboxFrame,
    threshold: f32,
    hier_threshold: f32,
  ) -> Result<Vec<RawDetection>, Self::Error> {
    self
      .frames
      .push((frame.width(), frame.height(), frame.original_size()));
    self.thresholds.push((threshold, hier_threshold));
    Ok(self.script.clone())
  }
}
