// 该文件是 Pilah 项目的一部分。
// src/model/client.rs - 远程推理服务客户端
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

//! # 远程推理客户端
//!
//! 每次提交都会在独立的工作线程上发送一次 POST 请求，结果只投递一次：
//! 要么通过 [`PendingInference`] 取回，要么交给 `FnOnce` 回调。
//! 回调在工作线程上执行，调用方需要自行切回自己的执行上下文。
//!
//! 客户端不重试、不取消；同时发出的多个请求之间没有顺序保证。

use std::{
  fmt,
  io::Read,
  sync::{Arc, mpsc},
  thread,
  time::{Duration, Instant},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  codec::{CodecError, ImageCodec},
  frame::PixelBuffer,
  model::{DetectResult, Model, response_parser},
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// 推理服务配置
#[derive(Clone)]
pub struct ServiceConfig {
  pub endpoint: Url,
  pub api_key: String,
  pub connect_timeout: Duration,
  pub read_timeout: Duration,
  pub write_timeout: Duration,
}

impl ServiceConfig {
  pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
    Self {
      endpoint,
      api_key: api_key.into(),
      connect_timeout: DEFAULT_CONNECT_TIMEOUT,
      read_timeout: DEFAULT_READ_TIMEOUT,
      write_timeout: DEFAULT_WRITE_TIMEOUT,
    }
  }

  pub fn with_timeouts(mut self, connect: Duration, read: Duration, write: Duration) -> Self {
    self.connect_timeout = connect;
    self.read_timeout = read;
    self.write_timeout = write;
    self
  }
}

impl fmt::Debug for ServiceConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ServiceConfig")
      .field("endpoint", &self.endpoint.as_str())
      .field("api_key", &"***")
      .field("connect_timeout", &self.connect_timeout)
      .field("read_timeout", &self.read_timeout)
      .field("write_timeout", &self.write_timeout)
      .finish()
  }
}

#[derive(Serialize)]
struct RequestBody<'a> {
  api_key: &'a str,
  inputs: RequestInputs<'a>,
}

#[derive(Serialize)]
struct RequestInputs<'a> {
  image: RequestImage<'a>,
}

#[derive(Serialize)]
struct RequestImage<'a> {
  #[serde(rename = "type")]
  kind: &'static str,
  value: &'a str,
}

/// 构造请求体 `{api_key, inputs: {image: {type: "base64", value}}}`
pub fn request_body(api_key: &str, image_text: &str) -> Result<String, serde_json::Error> {
  serde_json::to_string(&RequestBody {
    api_key,
    inputs: RequestInputs {
      image: RequestImage {
        kind: "base64",
        value: image_text,
      },
    },
  })
}

/// HTTP 状态分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
  Success,
  ClientError,
  ServerError,
  TransportFailure,
}

impl StatusClass {
  pub fn from_status(status: u16) -> Self {
    match status {
      200..=299 => StatusClass::Success,
      500..=599 => StatusClass::ServerError,
      _ => StatusClass::ClientError,
    }
  }
}

/// 成功的推理响应
#[derive(Debug, Clone)]
pub struct InferenceResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl InferenceResponse {
  pub fn class(&self) -> StatusClass {
    StatusClass::from_status(self.status)
  }

  pub fn detections(&self) -> DetectResult {
    response_parser::parse_result(&self.body)
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("连接失败: {0}")]
  Transport(String),
  #[error("HTTP 错误: {status} | {body}")]
  Service { status: u16, body: String },
  #[error("构造请求失败: {0}")]
  Request(#[from] serde_json::Error),
  #[error("图像编码失败: {0}")]
  Encode(#[from] CodecError),
}

impl InferenceError {
  /// 本地错误（请求构造、图像编码）没有对应的状态分类
  pub fn status_class(&self) -> Option<StatusClass> {
    match self {
      InferenceError::Transport(_) => Some(StatusClass::TransportFailure),
      InferenceError::Service { status, .. } => Some(StatusClass::from_status(*status)),
      InferenceError::Request(_) | InferenceError::Encode(_) => None,
    }
  }
}

pub type InferenceOutcome = Result<InferenceResponse, InferenceError>;

/// 尚未完成的推理请求，结果只能取一次
#[derive(Debug)]
pub struct PendingInference {
  rx: mpsc::Receiver<InferenceOutcome>,
}

impl PendingInference {
  pub fn wait(self) -> InferenceOutcome {
    self
      .rx
      .recv()
      .unwrap_or_else(|_| Err(InferenceError::Transport("推理线程意外退出".to_string())))
  }

  /// 超时后把自身交还给调用方，可以继续等待
  pub fn wait_timeout(self, timeout: Duration) -> Result<InferenceOutcome, PendingInference> {
    match self.rx.recv_timeout(timeout) {
      Ok(outcome) => Ok(outcome),
      Err(mpsc::RecvTimeoutError::Timeout) => Err(self),
      Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Err(InferenceError::Transport(
        "推理线程意外退出".to_string(),
      ))),
    }
  }
}

#[derive(Clone)]
pub struct InferenceClient {
  config: Arc<ServiceConfig>,
  agent: ureq::Agent,
  codec: ImageCodec,
}

impl InferenceClient {
  pub fn new(config: ServiceConfig) -> Self {
    let agent = ureq::AgentBuilder::new()
      .timeout_connect(config.connect_timeout)
      .timeout_read(config.read_timeout)
      .timeout_write(config.write_timeout)
      .build();

    info!("推理服务: {}", config.endpoint);
    debug!("推理服务配置: {:?}", config);

    Self {
      config: Arc::new(config),
      agent,
      codec: ImageCodec::default(),
    }
  }

  pub fn with_codec(mut self, codec: ImageCodec) -> Self {
    self.codec = codec;
    self
  }

  pub fn config(&self) -> &ServiceConfig {
    &self.config
  }

  /// 提交 base64 编码的图像，立即返回
  pub fn submit(&self, image_text: impl Into<String>) -> PendingInference {
    let (tx, rx) = mpsc::sync_channel(1);
    self.submit_with(image_text, move |outcome| {
      // 接收端已丢弃时结果无人关心
      let _ = tx.send(outcome);
    });
    PendingInference { rx }
  }

  /// 提交图像，完成后在工作线程上调用一次 `on_complete`
  pub fn submit_with<F>(&self, image_text: impl Into<String>, on_complete: F)
  where
    F: FnOnce(InferenceOutcome) + Send + 'static,
  {
    let image_text = image_text.into();
    let agent = self.agent.clone();
    let config = Arc::clone(&self.config);
    thread::spawn(move || {
      let outcome = send_request(&agent, &config, &image_text);
      on_complete(outcome);
    });
  }

  /// 阻塞提交并解析检测结果
  pub fn detect(&self, image_text: impl Into<String>) -> Result<DetectResult, InferenceError> {
    let response = self.submit(image_text).wait()?;
    let result = response.detections();
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}

impl Model for InferenceClient {
  type Input = PixelBuffer;
  type Output = DetectResult;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let image_text = self.codec.encode_to_text(input)?;
    debug!("图像编码完成: {} 字符", image_text.len());
    self.detect(image_text)
  }
}

fn send_request(agent: &ureq::Agent, config: &ServiceConfig, image_text: &str) -> InferenceOutcome {
  let body = request_body(&config.api_key, image_text)?;
  debug!("发送推理请求: {} 字节", body.len());

  let now = Instant::now();
  let result = agent
    .post(config.endpoint.as_str())
    .set("Content-Type", "application/json")
    .send_string(&body);
  let elapsed = now.elapsed();

  match result {
    Ok(response) => {
      let status = response.status();
      let mut bytes = Vec::new();
      response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|e| InferenceError::Transport(format!("读取响应失败: {}", e)))?;
      info!("推理完成: HTTP {}, 耗时: {:.2?}", status, elapsed);

      if StatusClass::from_status(status) != StatusClass::Success {
        return Err(InferenceError::Service {
          status,
          body: String::from_utf8_lossy(&bytes).into_owned(),
        });
      }
      debug!("响应内容: {}", String::from_utf8_lossy(&bytes));
      Ok(InferenceResponse {
        status,
        body: bytes,
      })
    }
    Err(ureq::Error::Status(status, response)) => {
      let body = response
        .into_string()
        .unwrap_or_else(|_| "No response body".to_string());
      warn!("推理服务返回 HTTP {}: {}", status, body);
      Err(InferenceError::Service { status, body })
    }
    Err(ureq::Error::Transport(transport)) => {
      error!("推理请求失败 (耗时 {:.2?}): {}", elapsed, transport);
      Err(InferenceError::Transport(transport.to_string()))
    }
  }
}
