// 该文件是 Pilah 项目的一部分。
// tests/inference_client.rs - 推理客户端测试
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
  io::{BufRead, BufReader, Read, Write},
  net::TcpListener,
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};

use pilah::{
  frame::PixelBuffer,
  model::{InferenceClient, InferenceError, Model, ServiceConfig, StatusClass},
};
use url::Url;

const DETECTION_BODY: &str = r#"{"outputs":[{"predictions":{"image":{"width":200,"height":100},"predictions":[{"class":"b3","confidence":0.92,"x":100,"y":50,"width":40,"height":60}]}}]}"#;

/// 只应答一次的本地 HTTP 服务，返回收到的请求体
fn serve_once(status: u16, body: &'static str) -> (Url, mpsc::Receiver<(String, String)>) {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();
  let (tx, rx) = mpsc::channel();

  thread::spawn(move || {
    let (stream, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut headers = String::new();
    let mut content_length = 0usize;
    loop {
      let mut line = String::new();
      reader.read_line(&mut line).unwrap();
      if line == "\r\n" || line.is_empty() {
        break;
      }
      if let Some((name, value)) = line.split_once(':')
        && name.eq_ignore_ascii_case("content-length")
      {
        content_length = value.trim().parse().unwrap();
      }
      headers.push_str(&line);
    }
    let mut request_body = vec![0u8; content_length];
    reader.read_exact(&mut request_body).unwrap();
    tx.send((headers, String::from_utf8(request_body).unwrap()))
      .unwrap();

    let mut stream = stream;
    let response = format!(
      "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      status,
      body.len(),
      body
    );
    stream.write_all(response.as_bytes()).unwrap();
  });

  (Url::parse(&format!("http://{}/infer", addr)).unwrap(), rx)
}

fn client(endpoint: Url) -> InferenceClient {
  InferenceClient::new(ServiceConfig::new(endpoint, "test-key").with_timeouts(
    Duration::from_secs(5),
    Duration::from_secs(5),
    Duration::from_secs(5),
  ))
}

#[test]
fn successful_request_is_parsed() {
  let (endpoint, requests) = serve_once(200, DETECTION_BODY);
  let client = client(endpoint);

  let response = client.submit("AAAA").wait().unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.class(), StatusClass::Success);

  let result = response.detections();
  assert_eq!(result.len(), 1);
  assert_eq!(result.items[0].class_name, "Hazardous Waste");

  let (headers, body) = requests.recv().unwrap();
  assert!(headers.to_lowercase().contains("content-type: application/json"));
  let body: serde_json::Value = serde_json::from_str(&body).unwrap();
  assert_eq!(body["api_key"], "test-key");
  assert_eq!(body["inputs"]["image"]["type"], "base64");
  assert_eq!(body["inputs"]["image"]["value"], "AAAA");
}

#[test]
fn server_error_carries_status_and_body() {
  let (endpoint, _requests) = serve_once(500, r#"{"error":"boom"}"#);
  let client = client(endpoint);

  let err = client.submit("AAAA").wait().unwrap_err();
  assert_eq!(err.status_class(), Some(StatusClass::ServerError));
  match err {
    InferenceError::Service { status, body } => {
      assert_eq!(status, 500);
      assert!(body.contains("boom"));
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[test]
fn refused_connection_fails_exactly_once() {
  let addr = {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
  };
  let client = client(Url::parse(&format!("http://{}/infer", addr)).unwrap());

  let (tx, rx) = mpsc::channel();
  let start = Instant::now();
  client.submit_with("AAAA", move |outcome| {
    tx.send(outcome).unwrap();
  });

  let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
  assert!(start.elapsed() < Duration::from_secs(10));
  assert!(matches!(outcome, Err(InferenceError::Transport(_))));
  // 回调只会执行一次，之后发送端被丢弃
  assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn model_encodes_and_detects() {
  let (endpoint, requests) = serve_once(200, DETECTION_BODY);
  let client = client(endpoint);
  let frame = PixelBuffer::filled(200, 100, [90, 90, 90, 255]).unwrap();

  let result = client.infer(&frame).unwrap();
  let normalized = result.normalized();
  assert_eq!(normalized.items[0].bbox.left, 0.4);
  assert_eq!(normalized.items[0].bbox.right, 0.6);

  let (_, body) = requests.recv().unwrap();
  let body: serde_json::Value = serde_json::from_str(&body).unwrap();
  let text = body["inputs"]["image"]["value"].as_str().unwrap();
  assert!(!text.is_empty());
  assert!(!text.contains('\n'));
}
