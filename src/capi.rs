// 该文件是 Darkbridge 项目的一部分。
// src/capi.rs - 供宿主语言调用的 C 接口
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

//! C 接口
//!
//! 会话由调用方持有：`darkbridge_session_new` 创建，`darkbridge_session_free` 释放。
//! `darkbridge_predict*` 返回的 [`ResultBoxArray`] 归调用方所有，必须通过
//! `darkbridge_release` 释放。失败时返回空数组并设置 `errno`；
//! 在未初始化的会话上推理会直接终止进程。

use std::{ffi::CStr, path::PathBuf};

use libc::{c_char, c_int};
use tracing::{error, warn};

use crate::{
  frame::planar_to_rgb,
  model::{DetectResult, Detector, GridParam, NetworkSpec, Session, SessionError},
  transform::ResultBox,
};

/// 检测结果数组，内存由本库分配
#[repr(C)]
#[derive(Debug)]
pub struct ResultBoxArray {
  pub boxes: *mut ResultBox,
  pub size: c_int,
}

impl ResultBoxArray {
  pub fn empty() -> Self {
    Self {
      boxes: std::ptr::null_mut(),
      size: 0,
    }
  }

  /// 转移结果所有权给调用方
  pub fn from_result(result: DetectResult) -> Self {
    if result.is_empty() {
      return Self::empty();
    }
    let size = result.len() as c_int;
    let boxes = Box::into_raw(result.items) as *mut ResultBox;
    Self { boxes, size }
  }

  /// 以切片形式查看数组内容
  ///
  /// # Safety
  /// `self` 必须由 [`ResultBoxArray::from_result`] 创建且尚未释放。
  pub unsafe fn as_slice(&self) -> &[ResultBox] {
    if self.boxes.is_null() || self.size <= 0 {
      return &[];
    }
    unsafe { std::slice::from_raw_parts(self.boxes, self.size as usize) }
  }

  /// 收回所有权
  ///
  /// # Safety
  /// `self` 必须由 [`ResultBoxArray::from_result`] 创建且尚未释放。
  pub unsafe fn into_result(self) -> DetectResult {
    if self.boxes.is_null() || self.size <= 0 {
      return DetectResult::default();
    }
    let slice = std::ptr::slice_from_raw_parts_mut(self.boxes, self.size as usize);
    DetectResult {
      items: unsafe { Box::from_raw(slice) },
    }
  }
}

/// 宿主传入的 CHW 浮点图像（取值 [0, 1]）
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DarkbridgeImage {
  pub w: c_int,
  pub h: c_int,
  pub c: c_int,
  pub data: *const f32,
}

fn set_error(code: c_int) -> c_int {
  errno::set_errno(errno::Errno(code));
  -1
}

unsafe fn c_path(ptr: *const c_char) -> Result<Option<PathBuf>, c_int> {
  if ptr.is_null() {
    return Ok(None);
  }
  let s = unsafe { CStr::from_ptr(ptr) }
    .to_str()
    .map_err(|_| libc::EINVAL)?;
  if s.is_empty() {
    return Ok(None);
  }
  Ok(Some(PathBuf::from(s)))
}

fn errno_of(err: &SessionError) -> c_int {
  match err {
    SessionError::PathNotFound(_) => libc::ENOENT,
    SessionError::Frame(_) | SessionError::InvalidWindow { .. } => libc::EINVAL,
    _ => libc::EIO,
  }
}

fn fatal_not_initialized() -> ! {
  error!("检测器尚未初始化!");
  std::process::exit(1);
}

fn finish_predict(result: Result<DetectResult, SessionError>) -> ResultBoxArray {
  match result {
    Ok(result) => ResultBoxArray::from_result(result),
    Err(SessionError::NotInitialized) => fatal_not_initialized(),
    Err(e) => {
      warn!("推理失败: {}", e);
      set_error(errno_of(&e));
      ResultBoxArray::empty()
    }
  }
}

/// 初始化会话中的检测器，成功返回 0
///
/// # Safety
/// `session` 必须为本库创建的有效指针；`cfg`、`weights` 为空或有效的 C 字符串。
pub unsafe fn session_initialize<D: Detector>(
  session: *mut Session<D>,
  cfg: *const c_char,
  weights: *const c_char,
  grid: Option<GridParam>,
) -> c_int {
  let Some(session) = (unsafe { session.as_mut() }) else {
    return set_error(libc::EINVAL);
  };

  let config = match unsafe { c_path(cfg) } {
    Ok(Some(config)) => config,
    Ok(None) => return set_error(libc::EINVAL),
    Err(code) => return set_error(code),
  };
  let weights = match unsafe { c_path(weights) } {
    Ok(weights) => weights,
    Err(code) => return set_error(code),
  };

  let spec = NetworkSpec {
    config,
    weights,
    grid,
  };
  match session.load(&spec) {
    Ok(()) => 0,
    Err(e) => {
      error!("检测器初始化失败: {}", e);
      set_error(libc::EIO)
    }
  }
}

/// 对图像文件推理
///
/// # Safety
/// `session` 必须为本库创建的有效指针；`path` 为有效的 C 字符串。
pub unsafe fn session_predict<D: Detector>(
  session: *mut Session<D>,
  path: *const c_char,
  threshold: f32,
  hier_threshold: f32,
) -> ResultBoxArray {
  let Some(session) = (unsafe { session.as_mut() }) else {
    set_error(libc::EINVAL);
    return ResultBoxArray::empty();
  };
  if !session.is_initialized() {
    fatal_not_initialized();
  }

  let path = match unsafe { c_path(path) } {
    Ok(Some(path)) => path,
    Ok(None) => {
      set_error(libc::EINVAL);
      return ResultBoxArray::empty();
    }
    Err(code) => {
      set_error(code);
      return ResultBoxArray::empty();
    }
  };

  finish_predict(session.predict_path(&path, threshold, hier_threshold))
}

/// 对宿主内存中的图像推理
///
/// # Safety
/// `session` 必须为本库创建的有效指针；`image.data` 指向 `w * h * c` 个浮点数。
pub unsafe fn session_predict_image<D: Detector>(
  session: *mut Session<D>,
  image: DarkbridgeImage,
  threshold: f32,
  hier_threshold: f32,
) -> ResultBoxArray {
  let Some(session) = (unsafe { session.as_mut() }) else {
    set_error(libc::EINVAL);
    return ResultBoxArray::empty();
  };
  if !session.is_initialized() {
    fatal_not_initialized();
  }

  if image.data.is_null() || image.w <= 0 || image.h <= 0 || image.c <= 0 {
    set_error(libc::EINVAL);
    return ResultBoxArray::empty();
  }

  let len = image.w as usize * image.h as usize * image.c as usize;
  let data = unsafe { std::slice::from_raw_parts(image.data, len) };
  let rgb = match planar_to_rgb(data, image.w as u32, image.h as u32, image.c as usize) {
    Ok(rgb) => rgb,
    Err(e) => {
      warn!("输入图像无效: {}", e);
      set_error(libc::EINVAL);
      return ResultBoxArray::empty();
    }
  };

  finish_predict(session.predict_image(&rgb, threshold, hier_threshold))
}

/// 释放 `darkbridge_predict*` 返回的数组
///
/// # Safety
/// `array` 必须由本库返回且只能释放一次。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn darkbridge_release(array: ResultBoxArray) {
  drop(unsafe { array.into_result() });
}

#[cfg(feature = "darknet")]
mod exports {
  use libc::{c_char, c_int};

  use super::{DarkbridgeImage, ResultBoxArray};
  use crate::model::{DarknetDetector, GridParam, Session};

  pub type DarkbridgeSession = Session<DarknetDetector>;

  fn init_logging() {
    // 宿主可能已经安装了订阅者
    let _ = tracing_subscriber::fmt::try_init();
  }

  #[unsafe(no_mangle)]
  pub extern "C" fn darkbridge_session_new() -> *mut DarkbridgeSession {
    init_logging();
    Box::into_raw(Box::new(Session::new()))
  }

  /// # Safety
  /// `session` 为空或由 `darkbridge_session_new` 创建，且只能释放一次。
  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn darkbridge_session_free(session: *mut DarkbridgeSession) {
    if !session.is_null() {
      drop(unsafe { Box::from_raw(session) });
    }
  }

  /// # Safety
  /// 见 [`super::session_initialize`]。
  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn darkbridge_initialize(
    session: *mut DarkbridgeSession,
    cfg: *const c_char,
    weights: *const c_char,
  ) -> c_int {
    unsafe { super::session_initialize(session, cfg, weights, None) }
  }

  /// # Safety
  /// 见 [`super::session_initialize`]。
  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn darkbridge_initialize_with_grid(
    session: *mut DarkbridgeSession,
    cfg: *const c_char,
    weights: *const c_char,
    grid: GridParam,
  ) -> c_int {
    unsafe { super::session_initialize(session, cfg, weights, Some(grid)) }
  }

  /// # Safety
  /// `session` 为空或由 `darkbridge_session_new` 创建。
  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn darkbridge_is_initialized(session: *const DarkbridgeSession) -> c_int {
    match unsafe { session.as_ref() } {
      Some(session) => session.is_initialized() as c_int,
      None => 0,
    }
  }

  /// # Safety
  /// 见 [`super::session_predict`]。
  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn darkbridge_predict(
    session: *mut DarkbridgeSession,
    path: *const c_char,
    threshold: f32,
    hier_threshold: f32,
  ) -> ResultBoxArray {
    unsafe { super::session_predict(session, path, threshold, hier_threshold) }
  }

  /// # Safety
  /// 见 [`super::session_predict_image`]。
  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn darkbridge_predict_image(
    session: *mut DarkbridgeSession,
    image: DarkbridgeImage,
    threshold: f32,
    hier_threshold: f32,
  ) -> ResultBoxArray {
    unsafe { super::session_predict_image(session, image, threshold, hier_threshold) }
  }
}

#[cfg(feature = "darknet")]
pub use self::exports::*;
