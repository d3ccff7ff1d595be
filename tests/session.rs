// 该文件是 Darkbridge 项目的一部分。
// tests/session.rs - 会话集成测试
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

mod common;

use std::path::Path;

use approx::assert_relative_eq;
use darkbridge::{
  input::ImageFrame,
  model::{GridParam, NetworkSpec, Session, SessionError, SlidingWindow},
  task::{Model, Predictor},
};
use image::RgbImage;

use common::{ScriptedDetector, drops, raw, script_next_load};

fn centred_box() -> Vec<darkbridge::model::RawDetection> {
  vec![raw(0.5, 0.5, 0.25, 0.25, &[0.1, 0.8])]
}

#[test]
fn predict_image_maps_back_to_original() {
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), centred_box()));
  let image = RgbImage::new(800, 600);

  let result = session.predict_image(&image, 0.5, 0.5).expect("predict");
  assert_eq!(result.len(), 1);

  let item = result.items[0];
  assert_eq!(item.class_id, 1);
  assert_relative_eq!(item.confidence, 0.8);
  assert_relative_eq!(item.left, 300.0, epsilon = 1e-3);
  assert_relative_eq!(item.right, 500.0, epsilon = 1e-3);
  assert_relative_eq!(item.top, 200.0, epsilon = 1e-3);
  assert_relative_eq!(item.bottom, 400.0, epsilon = 1e-3);

  let detector = session.detector().expect("detector");
  assert_eq!(detector.frames, vec![(416, 416, (800, 600))]);
  assert_eq!(detector.thresholds, vec![(0.5, 0.5)]);
}

#[test]
fn threshold_is_strict_and_padding_boxes_dropped() {
  let script = vec![
    raw(0.5, 0.5, 0.25, 0.25, &[0.5, 0.2]),
    raw(0.5, 0.05, 0.2, 0.08, &[0.9]),
    raw(0.5, 0.5, 0.25, 0.25, &[0.2, 0.6, 0.6]),
  ];
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), script));

  let result = session
    .predict_image(&RgbImage::new(800, 600), 0.5, 0.5)
    .expect("predict");
  assert_eq!(result.len(), 1);
  assert_eq!(result.items[0].class_id, 1);
}

#[test]
fn predict_without_detector_is_an_error() {
  let mut session: Session<ScriptedDetector> = Session::new();
  assert!(!session.is_initialized());

  let err = session.predict_image(&RgbImage::new(8, 8), 0.5, 0.5);
  assert!(matches!(err, Err(SessionError::NotInitialized)));

  let err = session.predict_path("/definitely/not/here.jpg", 0.5, 0.5);
  assert!(matches!(err, Err(SessionError::NotInitialized)));
}

#[test]
fn predict_path_missing_file() {
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), centred_box()));
  let err = session.predict_path("/definitely/not/here.jpg", 0.5, 0.5);
  assert!(matches!(err, Err(SessionError::PathNotFound(p)) if p == Path::new("/definitely/not/here.jpg")));
}

#[test]
fn predict_path_reads_image() {
  let dir = tempfile::tempdir().expect("tempdir");
  let path = dir.path().join("in.png");
  RgbImage::new(600, 800).save(&path).expect("save");

  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), centred_box()));
  let result = session.predict_path(&path, 0.5, 0.5).expect("predict");
  assert_eq!(result.len(), 1);
  // 纵向图像左右填充
  assert_relative_eq!(result.items[0].top, 300.0, epsilon = 1e-3);
  assert_relative_eq!(result.items[0].left, 200.0, epsilon = 1e-3);
}

#[test]
fn reinitialize_releases_previous_detector() {
  let before = drops();
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), Vec::new()));

  session
    .initialize_with_grid("cfg/yolo.cfg", None, GridParam::square(608))
    .expect("initialize");
  assert_eq!(drops(), before + 1);
  assert_eq!(session.detector().expect("detector").size, (608, 608));

  session.initialize("cfg/yolo.cfg", Some(Path::new("yolo.weights"))).expect("initialize");
  assert_eq!(drops(), before + 2);
  assert_eq!(session.detector().expect("detector").size, (416, 416));

  session.release();
  assert_eq!(drops(), before + 3);
  assert!(!session.is_initialized());
}

#[test]
fn failed_load_leaves_session_uninitialized() {
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), Vec::new()));
  let err = session.load(&NetworkSpec::new("cfg/missing.cfg"));
  assert!(matches!(err, Err(SessionError::Detector(_))));
  assert!(!session.is_initialized());
}

#[test]
fn sliding_predict_adds_strip_offsets() {
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), centred_box()));
  let image = RgbImage::new(100, 300);
  let window = SlidingWindow {
    step: 200,
    overlap: 100,
  };

  let result = session
    .predict_sliding(&image, window, 0.5, 0.5)
    .expect("predict");
  assert_eq!(result.len(), 2);

  let tops: Vec<f32> = result.iter().map(|b| b.top).collect();
  let bottoms: Vec<f32> = result.iter().map(|b| b.bottom).collect();
  assert_relative_eq!(tops[0], 75.0, epsilon = 1e-3);
  assert_relative_eq!(bottoms[0], 125.0, epsilon = 1e-3);
  assert_relative_eq!(tops[1], 175.0, epsilon = 1e-3);
  assert_relative_eq!(bottoms[1], 225.0, epsilon = 1e-3);
  for item in result.iter() {
    assert_relative_eq!(item.left, 25.0, epsilon = 1e-3);
    assert_relative_eq!(item.right, 75.0, epsilon = 1e-3);
  }

  let frames = &session.detector().expect("detector").frames;
  assert_eq!(frames.len(), 2);
  assert!(frames.iter().all(|f| f.2 == (100, 200)));
}

#[test]
fn sliding_predict_stays_inside_image() {
  let script = vec![raw(0.5, 0.5, 2.0, 2.0, &[0.9])];
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), script));
  let image = RgbImage::new(120, 350);
  let window = SlidingWindow {
    step: 200,
    overlap: 50,
  };

  let result = session
    .predict_sliding(&image, window, 0.5, 0.5)
    .expect("predict");
  assert_eq!(result.len(), 2);
  for item in result.iter() {
    assert!(0.0 <= item.top && item.top < item.bottom, "{item:?}");
    assert!(item.bottom <= 350.0, "{item:?}");
    assert!(item.right <= 120.0, "{item:?}");
  }
  assert_relative_eq!(result.items[1].top, 150.0, epsilon = 1e-3);
}

#[test]
fn sliding_predict_rejects_bad_window() {
  let mut session = Session::with_detector(ScriptedDetector::new((416, 416), centred_box()));
  let window = SlidingWindow {
    step: 100,
    overlap: 100,
  };
  let err = session.predict_sliding(&RgbImage::new(10, 10), window, 0.5, 0.5);
  assert!(matches!(err, Err(SessionError::InvalidWindow { .. })));
}

#[test]
fn predictor_switches_on_window() {
  script_next_load(centred_box());
  let mut session = Session::<ScriptedDetector>::new();
  session.load(&NetworkSpec::new("cfg/yolo.cfg")).expect("load");

  let mut predictor = Predictor::new(session, 0.3, 0.5).with_window(Some(SlidingWindow {
    step: 200,
    overlap: 100,
  }));
  let frame = ImageFrame {
    name: "strip.png".to_string(),
    image: RgbImage::new(100, 300),
  };
  let result = predictor.infer(&frame).expect("infer");
  assert_eq!(result.len(), 2);

  let detector = predictor.session().detector().expect("detector");
  assert_eq!(detector.thresholds, vec![(0.3, 0.5), (0.3, 0.5)]);
}
