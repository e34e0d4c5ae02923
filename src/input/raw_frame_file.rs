// 该文件是 Pilah 项目的一部分。
// src/input/raw_frame_file.rs - 原始帧文件输入
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

//! 从文件读取首尾相接的原始相机帧，例如相机转储的 `.yuv` 文件。
//!
//! URL 形式：`raw:///path/frames.yuv?format=i420&width=640&height=480`
//!
//! 支持的 `format`：
//! - `i420` - Y、U、V 三个紧凑平面
//! - `nv12` - Y 平面后接 U/V 交错的色度平面（色度像素跨度为 2）
//! - `rgba` - RGBA，可用 `stride` 指定行跨度
//! - `jpeg` - 整个文件为一张 JPEG

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{PixelBuffer, RGBA_CHANNELS, Rotation},
  input::{
    frame_decoder::{FrameDecoder, Plane, RawFrame},
    rotation_from_query,
  },
};

#[derive(Error, Debug)]
pub enum RawFrameFileError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("未知的原始帧格式: {0}")]
  UnknownFormat(String),
  #[error("缺少或无效的参数: {0}")]
  InvalidParameter(&'static str),
  #[error("无效的旋转角度: {0}")]
  InvalidRotation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLayout {
  I420,
  Nv12,
  Rgba { stride: usize },
  Jpeg,
}

impl RawLayout {
  fn frame_len(&self, width: u32, height: u32) -> Option<usize> {
    let luma = width as usize * height as usize;
    let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
    match self {
      RawLayout::I420 | RawLayout::Nv12 => Some(luma + 2 * chroma),
      RawLayout::Rgba { stride } => Some(stride.saturating_mul(height as usize)),
      RawLayout::Jpeg => None,
    }
  }

  fn to_raw_frame(self, width: u32, height: u32, bytes: &[u8]) -> RawFrame {
    let w = width as usize;
    let luma = w * height as usize;
    let chroma_w = width.div_ceil(2) as usize;
    let chroma = chroma_w * height.div_ceil(2) as usize;

    match self {
      RawLayout::I420 => {
        let y = Plane::new(bytes[..luma].to_vec(), w, 1);
        let u = Plane::new(bytes[luma..luma + chroma].to_vec(), chroma_w, 1);
        let v = Plane::new(bytes[luma + chroma..].to_vec(), chroma_w, 1);
        RawFrame::yuv420(width, height, y, u, v)
      }
      RawLayout::Nv12 => {
        let y = Plane::new(bytes[..luma].to_vec(), w, 1);
        let uv = &bytes[luma..];
        let u = Plane::new(uv.to_vec(), 2 * chroma_w, 2);
        let v = Plane::new(uv[1..].to_vec(), 2 * chroma_w, 2);
        RawFrame::yuv420(width, height, y, u, v)
      }
      RawLayout::Rgba { stride } => RawFrame::rgba(width, height, stride, bytes.to_vec()),
      RawLayout::Jpeg => RawFrame::jpeg(width, height, bytes.to_vec()),
    }
  }
}

pub struct RawFrameFileInput {
  data: Vec<u8>,
  offset: usize,
  width: u32,
  height: u32,
  layout: RawLayout,
  rotation: Rotation,
  decoder: FrameDecoder,
}

impl FromUrlWithScheme for RawFrameFileInput {
  const SCHEME: &'static str = "raw";
}

impl FromUrl for RawFrameFileInput {
  type Error = RawFrameFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RawFrameFileError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let width = query
      .get("width")
      .and_then(|v| v.parse::<u32>().ok())
      .filter(|v| *v > 0)
      .ok_or(RawFrameFileError::InvalidParameter("width"))?;
    let height = query
      .get("height")
      .and_then(|v| v.parse::<u32>().ok())
      .filter(|v| *v > 0)
      .ok_or(RawFrameFileError::InvalidParameter("height"))?;

    let format = query.get("format").map(String::as_str).unwrap_or("i420");
    let layout = match format.to_lowercase().as_str() {
      "i420" | "yuv420" => RawLayout::I420,
      "nv12" => RawLayout::Nv12,
      "rgba" => {
        let stride = match query.get("stride") {
          Some(v) => v
            .parse::<usize>()
            .map_err(|_| RawFrameFileError::InvalidParameter("stride"))?,
          None => width as usize * RGBA_CHANNELS,
        };
        if stride.checked_mul(height as usize).is_none() {
          return Err(RawFrameFileError::InvalidParameter("stride"));
        }
        RawLayout::Rgba { stride }
      }
      "jpeg" | "jpg" => RawLayout::Jpeg,
      _ => return Err(RawFrameFileError::UnknownFormat(format.to_string())),
    };

    let rotation = rotation_from_query(url).map_err(RawFrameFileError::InvalidRotation)?;
    let data = std::fs::read(url.path())?;
    info!(
      "读取原始帧文件: {} ({} 字节, {:?} {}x{})",
      url.path(),
      data.len(),
      layout,
      width,
      height
    );

    Ok(RawFrameFileInput::new(data, width, height, layout).with_rotation(rotation))
  }
}

impl RawFrameFileInput {
  pub fn new(data: Vec<u8>, width: u32, height: u32, layout: RawLayout) -> Self {
    Self {
      data,
      offset: 0,
      width,
      height,
      layout,
      rotation: Rotation::None,
      decoder: FrameDecoder,
    }
  }

  pub fn with_rotation(mut self, rotation: Rotation) -> Self {
    self.rotation = rotation;
    self
  }

  fn next_raw_frame(&mut self) -> Option<RawFrame> {
    let remaining = self.data.len().saturating_sub(self.offset);
    if remaining == 0 {
      return None;
    }

    let frame_len = self
      .layout
      .frame_len(self.width, self.height)
      .unwrap_or(remaining);
    if frame_len == 0 {
      return None;
    }
    if remaining < frame_len {
      warn!(
        "文件末尾剩余 {} 字节，不足一帧 ({} 字节)，忽略",
        remaining, frame_len
      );
      self.offset = self.data.len();
      return None;
    }

    let bytes = &self.data[self.offset..self.offset + frame_len];
    self.offset += frame_len;
    Some(self.layout.to_raw_frame(self.width, self.height, bytes))
  }
}

impl Iterator for RawFrameFileInput {
  type Item = PixelBuffer;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let raw = self.next_raw_frame()?;
      if let Some(buf) = self.decoder.decode_or_skip(&raw) {
        return Some(match self.rotation {
          Rotation::None => buf,
          rotation => buf.rotated(rotation),
        });
      }
    }
  }
}
