// 该文件是 Darkbridge 项目的一部分。
// src/model/darknet.rs - libdarknet 检测器绑定
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
  ffi::{CString, NulError},
  path::{Path, PathBuf},
  ptr::NonNull,
};

use libc::{c_char, c_int};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  frame::LetterboxFrame,
  model::{Detector, NetworkSpec, RawDetection},
  transform::NetBox,
};

const DARKNET_NMS_THRESH: f32 = 0.4;

#[repr(C)]
struct Network {
  _private: [u8; 0],
}

/// 与 darknet.h 中 `detection` 结构体布局一致
#[repr(C)]
#[allow(dead_code)]
struct DnDetection {
  bbox: NetBox,
  classes: c_int,
  best_class_idx: c_int,
  prob: *mut f32,
  mask: *mut f32,
  objectness: f32,
  sort_class: c_int,
  uc: *mut f32,
  points: c_int,
  embeddings: *mut f32,
  embedding_size: c_int,
  sim: f32,
  track_id: c_int,
}

#[link(name = "darknet")]
unsafe extern "C" {
  fn load_network_custom(
    cfg: *mut c_char,
    weights: *mut c_char,
    clear: c_int,
    batch: c_int,
  ) -> *mut Network;
  fn free_network_ptr(net: *mut Network);
  fn network_width(net: *mut Network) -> c_int;
  fn network_height(net: *mut Network) -> c_int;
  fn resize_network(net: *mut Network, w: c_int, h: c_int) -> c_int;
  fn network_predict_ptr(net: *mut Network, input: *mut f32) -> *mut f32;
  fn get_network_boxes(
    net: *mut Network,
    w: c_int,
    h: c_int,
    thresh: f32,
    hier: f32,
    map: *mut c_int,
    relative: c_int,
    num: *mut c_int,
    letter: c_int,
  ) -> *mut DnDetection;
  fn do_nms_sort(dets: *mut DnDetection, total: c_int, classes: c_int, thresh: f32);
  fn free_detections(dets: *mut DnDetection, n: c_int);
}

#[derive(Error, Debug)]
pub enum DarknetError {
  #[error("文件不存在: {0}")]
  MissingFile(PathBuf),
  #[error("路径包含空字符: {0}")]
  InvalidPath(#[from] NulError),
  #[error("网络加载失败: {0}")]
  LoadFailed(String),
  #[error("调整网络尺寸失败: {0}x{1}")]
  ResizeFailed(i32, i32),
  #[error("输入帧尺寸 {frame:?} 与网络尺寸 {network:?} 不一致")]
  FrameMismatch {
    frame: (u32, u32),
    network: (u32, u32),
  },
}

fn path_to_cstring(path: &Path) -> Result<CString, DarknetError> {
  if !path.exists() {
    return Err(DarknetError::MissingFile(path.to_path_buf()));
  }
  Ok(CString::new(path.to_string_lossy().as_bytes())?)
}

/// `get_network_boxes` 返回的检测数组，离开作用域时交还给 darknet
struct Detections {
  ptr: *mut DnDetection,
  len: usize,
}

impl Detections {
  fn as_slice(&self) -> &[DnDetection] {
    if self.ptr.is_null() || self.len == 0 {
      return &[];
    }
    unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
  }
}

impl Drop for Detections {
  fn drop(&mut self) {
    if !self.ptr.is_null() {
      unsafe { free_detections(self.ptr, self.len as c_int) };
    }
  }
}

pub struct DarknetDetector {
  net: NonNull<Network>,
  width: u32,
  height: u32,
}

impl Drop for DarknetDetector {
  fn drop(&mut self) {
    debug!("释放 darknet 网络");
    unsafe { free_network_ptr(self.net.as_ptr()) };
  }
}

impl Detector for DarknetDetector {
  type Error = DarknetError;

  fn load(spec: &NetworkSpec) -> Result<Self, Self::Error> {
    let cfg = path_to_cstring(&spec.config)?;
    let weights = spec.weights.as_deref().map(path_to_cstring).transpose()?;

    let weights_ptr = weights
      .as_ref()
      .map_or(std::ptr::null_mut(), |w| w.as_ptr() as *mut c_char);

    // darknet 不会修改路径字符串，只是签名未标注 const
    let net = unsafe { load_network_custom(cfg.as_ptr() as *mut c_char, weights_ptr, 0, 1) };
    let net = NonNull::new(net).ok_or_else(|| {
      error!("load_network_custom 返回空指针");
      DarknetError::LoadFailed(spec.config.display().to_string())
    })?;

    let mut detector = DarknetDetector {
      net,
      width: 0,
      height: 0,
    };

    if let Some(grid) = spec.grid {
      let ok = unsafe { resize_network(detector.net.as_ptr(), grid.width, grid.height) };
      if ok == 0 {
        return Err(DarknetError::ResizeFailed(grid.width, grid.height));
      }
    }

    detector.width = unsafe { network_width(detector.net.as_ptr()) } as u32;
    detector.height = unsafe { network_height(detector.net.as_ptr()) } as u32;
    info!("darknet 网络尺寸: {}x{}", detector.width, detector.height);

    Ok(detector)
  }

  fn network_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  fn predict(
    &mut self,
    frame: &LetterboxFrame,
    threshold: f32,
    hier_threshold: f32,
  ) -> Result<Vec<RawDetection>, Self::Error> {
    if (frame.width(), frame.height()) != (self.width, self.height) {
      return Err(DarknetError::FrameMismatch {
        frame: (frame.width(), frame.height()),
        network: (self.width, self.height),
      });
    }

    let net = self.net.as_ptr();
    let mut input = frame.as_chw().to_vec();
    unsafe { network_predict_ptr(net, input.as_mut_ptr()) };

    let mut num: c_int = 0;
    // relative=1, letter=0：框坐标保持为相对于网络帧的归一化值
    let ptr = unsafe {
      get_network_boxes(
        net,
        self.width as c_int,
        self.height as c_int,
        threshold,
        hier_threshold,
        std::ptr::null_mut(),
        1,
        &mut num,
        0,
      )
    };
    let detections = Detections {
      ptr,
      len: num.max(0) as usize,
    };

    let classes = detections.as_slice().first().map_or(0, |d| d.classes);
    if detections.len > 0 && classes > 0 {
      unsafe { do_nms_sort(detections.ptr, num, classes, DARKNET_NMS_THRESH) };
    }

    let raw = detections
      .as_slice()
      .iter()
      .map(|det| {
        let probs = if det.prob.is_null() || det.classes <= 0 {
          Box::default()
        } else {
          unsafe { std::slice::from_raw_parts(det.prob, det.classes as usize) }.into()
        };
        RawDetection {
          bbox: det.bbox,
          probs,
        }
      })
      .collect();

    Ok(raw)
  }
}
