// 该文件是 Darkbridge 项目的一部分。
// src/postprocess.rs - 置信度过滤与结果收集
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

use tracing::{debug, trace};

use crate::{
  model::{DetectResult, RawDetection},
  transform::TransformParams,
};

/// 返回最大概率及其类别索引，并列时取较小索引；NaN 概率不参与比较
pub fn max_class(probs: &[f32]) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (idx, &p) in probs.iter().enumerate() {
    if p.is_nan() {
      continue;
    }
    match best {
      Some((_, score)) if p <= score => {}
      _ => best = Some((idx, p)),
    }
  }
  best
}

/// 过滤检测器原始输出并映射回原图坐标
///
/// 只保留最大类别概率严格大于 `threshold` 的框；被阈值或几何检查拒绝的框直接丢弃。
pub fn collect_detections(
  detections: &[RawDetection],
  threshold: f32,
  params: &TransformParams,
) -> DetectResult {
  let mut items = Vec::new();

  for (idx, det) in detections.iter().enumerate() {
    let Some((class_id, score)) = max_class(&det.probs) else {
      continue;
    };

    if score <= threshold {
      continue;
    }

    match params.transform_box(&det.bbox, class_id as i32, score) {
      Some(item) => items.push(item),
      None => trace!("第 {} 个框落在有效区域外，已丢弃: {:?}", idx, det.bbox),
    }
  }

  debug!(
    "后处理完成: {} 个原始框, {} 个有效检测",
    detections.len(),
    items.len()
  );

  DetectResult {
    items: items.into_boxed_slice(),
  }
}
