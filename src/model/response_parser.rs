// 该文件是 Pilah 项目的一部分。
// src/model/response_parser.rs - 推理响应解析
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

//! 推理服务的响应结构并不固定，常见两种形式：
//!
//! ```text
//! { "outputs": [ { "predictions": <数组或 {"predictions": 数组}> }, ... ] }
//! { "predictions": <数组或 {"predictions": 数组}> }
//! ```
//!
//! 每个检测项为 `{class, confidence, x, y, width, height}`，坐标为中心点形式。
//! 解析永不失败，无法识别的内容记录日志后得到空结果。

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{BoundingBox, DetectResult, Detection, ImageExtent, normalize_class_name};

const UNKNOWN_CLASS: &str = "Unknown";

/// 解析检测列表，保持服务端数组顺序
pub fn parse(bytes: &[u8]) -> Vec<Detection> {
  parse_result(bytes).items.into_vec()
}

/// 解析检测列表，并记录服务端报告的图像尺寸
pub fn parse_result(bytes: &[u8]) -> DetectResult {
  let root: Value = match serde_json::from_slice(bytes) {
    Ok(value) => value,
    Err(e) => {
      warn!("响应不是合法的 JSON: {}", e);
      return DetectResult::default();
    }
  };
  let Some(root) = root.as_object() else {
    warn!("响应顶层不是 JSON 对象，忽略");
    return DetectResult::default();
  };

  let mut items = Vec::new();
  let mut extent = read_extent(root);

  match root.get("outputs").and_then(Value::as_array) {
    Some(outputs) => {
      for output in outputs {
        if let Some(predictions) = output.get("predictions") {
          collect(predictions, &mut items, &mut extent);
        }
      }
    }
    None => {
      if let Some(predictions) = root.get("predictions") {
        collect(predictions, &mut items, &mut extent);
      }
    }
  }

  debug!("解析得到 {} 个检测", items.len());
  DetectResult {
    items: items.into_boxed_slice(),
    extent,
  }
}

/// `predictions` 可能是数组，也可能是包着 `predictions` 数组的对象
fn collect(predictions: &Value, items: &mut Vec<Detection>, extent: &mut Option<ImageExtent>) {
  let entries = match predictions {
    Value::Array(entries) => entries,
    Value::Object(wrapper) => {
      if extent.is_none() {
        *extent = read_extent(wrapper);
      }
      match wrapper.get("predictions").and_then(Value::as_array) {
        Some(entries) => entries,
        None => {
          warn!("predictions 对象中没有 predictions 数组");
          return;
        }
      }
    }
    other => {
      warn!("无法识别的 predictions 类型: {}", other);
      return;
    }
  };

  for entry in entries {
    match entry.as_object() {
      Some(entry) => {
        if let Some(detection) = read_detection(entry) {
          items.push(detection);
        }
      }
      None => warn!("跳过非对象的检测项: {}", entry),
    }
  }
}

fn read_detection(entry: &Map<String, Value>) -> Option<Detection> {
  let class_name = match entry.get("class") {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Number(n)) => n.to_string(),
    _ => UNKNOWN_CLASS.to_string(),
  };
  let confidence = number(entry, "confidence");
  let x = number(entry, "x");
  let y = number(entry, "y");
  let width = number(entry, "width");
  let height = number(entry, "height");

  if !(width > 0.0 && height > 0.0) {
    debug!("丢弃尺寸无效的检测: {} ({}x{})", class_name, width, height);
    return None;
  }

  let detection = Detection {
    class_name: normalize_class_name(&class_name),
    confidence,
    bbox: BoundingBox::from_center(x, y, width, height),
  };
  debug!("检测: {} {:?}", detection.label(), detection.bbox);
  Some(detection)
}

fn read_extent(object: &Map<String, Value>) -> Option<ImageExtent> {
  let image = object.get("image")?.as_object()?;
  let width = number(image, "width");
  let height = number(image, "height");
  (width > 0.0 && height > 0.0).then_some(ImageExtent { width, height })
}

/// 数值字段，兼容数字字符串；缺失、无法解析或非有限值时为 0
fn number(object: &Map<String, Value>, key: &str) -> f32 {
  let value = match object.get(key) {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
    Some(Value::String(s)) => s.trim().parse::<f32>().unwrap_or(0.0),
    _ => 0.0,
  };
  if value.is_finite() { value } else { 0.0 }
}
