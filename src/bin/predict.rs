// 该文件是 Darkbridge 项目的一部分。
// src/bin/predict.rs - 命令行推理程序
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use darkbridge::{
  FromUrl,
  config::RunConfig,
  input::InputWrapper,
  model::DarknetDetector,
  output::{OutputWrapper, RecordStyle},
  task::{ContinuousTask, Predictor, Task},
};

/// Darkbridge 推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 运行配置
  #[arg(long, value_name = "CONFIG")]
  pub config: PathBuf,
  /// 输入来源（image:///file 或 folder:///dir）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出（json:///file、image:///file 或 folder:///dir）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAMES")]
  pub frames: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("运行配置: {}", args.config.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = RunConfig::from_file(&args.config)
    .with_context(|| format!("无法读取运行配置 {}", args.config.display()))?;

  let labels = match config.load_labels() {
    Ok(labels) => labels,
    Err(e) => {
      warn!("无法读取类别名称，输出中将不包含名称: {}", e);
      None
    }
  };
  let style = RecordStyle {
    policy: config.class_id_policy(),
    labels,
  };

  let input = InputWrapper::from_url(&args.input)?;
  let model: Predictor<DarknetDetector> = Predictor::from_config(&config)?;
  let output = OutputWrapper::from_url(&args.output)?.with_style(style);

  ContinuousTask::default()
    .with_frame_number(args.frames)
    .with_interrupt(true)
    .run_task(input, model, output)?;

  Ok(())
}
