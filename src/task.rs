// 该文件是 Darkbridge 项目的一部分。
// src/task.rs - 推理任务
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

use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  config::RunConfig,
  input::ImageFrame,
  model::{DetectResult, Detector, Session, SessionError, SlidingWindow},
  output::Render,
};

pub trait Model {
  type Input;
  type Output;
  type Error;
  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 会话加上阈值与可选的滑动窗口
pub struct Predictor<D: Detector> {
  session: Session<D>,
  threshold: f32,
  hier_threshold: f32,
  window: Option<SlidingWindow>,
}

impl<D: Detector> Predictor<D> {
  pub fn new(session: Session<D>, threshold: f32, hier_threshold: f32) -> Self {
    Self {
      session,
      threshold,
      hier_threshold,
      window: None,
    }
  }

  pub fn with_window(mut self, window: Option<SlidingWindow>) -> Self {
    self.window = window;
    self
  }

  /// 按运行配置加载检测器
  pub fn from_config(config: &RunConfig) -> anyhow::Result<Self> {
    let spec = config.network_spec().context("无法确定网络配置")?;
    let mut session = Session::new();
    session.load(&spec).context("检测器初始化失败")?;

    Ok(
      Self::new(session, config.threshold(), config.hier_threshold())
        .with_window(config.sliding_window()),
    )
  }

  pub fn session(&self) -> &Session<D> {
    &self.session
  }
}

impl<D: Detector> Model for Predictor<D> {
  type Input = ImageFrame;
  type Output = DetectResult;
  type Error = SessionError;

  fn infer(&mut self, frame: &ImageFrame) -> Result<DetectResult, SessionError> {
    match self.window {
      Some(window) => self.session.predict_sliding(
        &frame.image,
        window,
        self.threshold,
        self.hier_threshold,
      ),
      None => self
        .session
        .predict_image(&frame.image, self.threshold, self.hier_threshold),
    }
  }
}

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理器，收到信号后处理完当前帧即退出
  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.handle_interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })
      .context("无法设置 Ctrl-C 处理器")?;
    }

    let mut frame_index = 0usize;
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", frame_index);
    Ok(())
  }
}
