// 该文件是 Pilah 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测
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

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use url::Url;

use pilah::{
  FromUrl,
  codec::ImageCodec,
  input::InputWrapper,
  model::{InferenceClient, ServiceConfig},
  output::{Annotator, DetectionSummary, OutputWrapper, Render},
  task::{OneShotTask, Task, handoff},
};
use tracing::info;

/// Pilah 单张图像检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理服务地址
  #[arg(long, env = "PILAH_ENDPOINT", value_name = "URL")]
  pub endpoint: Url,
  /// 推理服务 API key
  #[arg(long, env = "PILAH_API_KEY", hide_env_values = true)]
  pub api_key: String,
  /// 输入来源，例如 image:///tmp/photo.jpg?rotate=90
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 folder:///tmp/results
  #[arg(long, value_name = "OUTPUT", default_value = "summary://log")]
  pub output: Url,
  /// 标注后的图像保存路径
  #[arg(long, value_name = "PATH")]
  pub save: Option<PathBuf>,
  /// 连接超时（秒）
  #[arg(long, default_value_t = 30)]
  pub connect_timeout: u64,
  /// 读写超时（秒）
  #[arg(long, default_value_t = 60)]
  pub io_timeout: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理服务: {}", args.endpoint);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = ServiceConfig::new(args.endpoint, args.api_key).with_timeouts(
    Duration::from_secs(args.connect_timeout),
    Duration::from_secs(args.io_timeout),
    Duration::from_secs(args.io_timeout),
  );
  let input = InputWrapper::from_url(&args.input)?;
  let model = InferenceClient::new(config);
  let output = OutputWrapper::from_url(&args.output)?;

  let (sender, receiver) = handoff(Annotator::new()?);
  OneShotTask.run_task(input, model, sender)?;

  let result = receiver
    .take()
    .ok_or_else(|| anyhow::anyhow!("没有得到检测结果"))?;

  let summary = DetectionSummary::new(&result.detections);
  info!("检测摘要:\n{}", summary);

  output.render_result(&result.original, &result.detections)?;
  if let Some(path) = args.save {
    ImageCodec::default().save(&result.annotated, &path)?;
    info!("标注图像已保存: {}", path.display());
  }

  Ok(())
}
