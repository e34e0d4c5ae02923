// 该文件是 Pilah 项目的一部分。
// src/input/frame_decoder.rs - 原始相机帧解码
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

//! # 原始帧解码
//!
//! 将相机给出的多平面原始帧统一转换为 [`PixelBuffer`]（RGBA）。
//! 按帧格式标签依次分派：
//!
//! 1. `Jpeg` - 平面 0 为压缩数据，交给 [`ImageCodec`] 解码
//! 2. `Yuv420` - Y/U/V 三个平面，先重排为 NV21（色度按 V、U 交错），再转换为 RGBA
//! 3. `Rgba8888` - 平面 0 已是 RGBA，按行跨度复制并裁掉行尾填充
//!
//! NV21 直接按 BT.601 转换为 RGBA，等价于先压缩为 JPEG 再解码的结果，但没有压缩损失。
//!
//! 其他格式返回 [`FrameDecodeError::UnsupportedFormat`]。
//! 实时检测中单帧失败不应中断流程，调用方可使用
//! [`FrameDecoder::decode_or_skip`] 直接跳过坏帧。

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  codec::{CodecError, ImageCodec},
  frame::{FrameError, PixelBuffer, RGBA_CHANNELS},
};

#[derive(Error, Debug)]
pub enum FrameDecodeError {
  #[error("不支持的帧格式: {0:?}")]
  UnsupportedFormat(FrameFormat),
  #[error("平面数量不匹配: 期望 {expected}, 实际 {actual}")]
  PlaneCount { expected: usize, actual: usize },
  #[error("平面 {plane} 越界: 需要读取偏移 {offset}, 平面长度 {len}")]
  PlaneOutOfBounds {
    plane: usize,
    offset: usize,
    len: usize,
  },
  #[error("图像解码错误: {0}")]
  Codec(#[from] CodecError),
  #[error("像素缓冲区错误: {0}")]
  Frame(#[from] FrameError),
}

/// 帧格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
  Jpeg,
  Yuv420,
  Rgba8888,
  /// 相机给出的其他格式代码
  Other(u32),
}

/// 单个图像平面
#[derive(Debug, Clone)]
pub struct Plane {
  pub data: Vec<u8>,
  pub row_stride: usize,
  pub pixel_stride: usize,
}

impl Plane {
  pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
    Self {
      data,
      row_stride,
      pixel_stride,
    }
  }

  /// 紧凑的压缩数据平面（JPEG）
  pub fn compressed(data: Vec<u8>) -> Self {
    let len = data.len();
    Self::new(data, len, 1)
  }

  fn sample(&self, index: usize, row: usize, col: usize) -> Result<u8, FrameDecodeError> {
    let offset = row * self.row_stride + col * self.pixel_stride;
    self
      .data
      .get(offset)
      .copied()
      .ok_or(FrameDecodeError::PlaneOutOfBounds {
        plane: index,
        offset,
        len: self.data.len(),
      })
  }
}

/// 相机给出的原始帧
#[derive(Debug, Clone)]
pub struct RawFrame {
  pub format: FrameFormat,
  pub width: u32,
  pub height: u32,
  pub planes: Vec<Plane>,
}

impl RawFrame {
  pub fn jpeg(width: u32, height: u32, bytes: Vec<u8>) -> Self {
    Self {
      format: FrameFormat::Jpeg,
      width,
      height,
      planes: vec![Plane::compressed(bytes)],
    }
  }

  pub fn yuv420(width: u32, height: u32, y: Plane, u: Plane, v: Plane) -> Self {
    Self {
      format: FrameFormat::Yuv420,
      width,
      height,
      planes: vec![y, u, v],
    }
  }

  pub fn rgba(width: u32, height: u32, row_stride: usize, data: Vec<u8>) -> Self {
    Self {
      format: FrameFormat::Rgba8888,
      width,
      height,
      planes: vec![Plane::new(data, row_stride, RGBA_CHANNELS)],
    }
  }

  fn expect_planes(&self, expected: usize) -> Result<(), FrameDecodeError> {
    if self.planes.len() != expected {
      return Err(FrameDecodeError::PlaneCount {
        expected,
        actual: self.planes.len(),
      });
    }
    Ok(())
  }
}

/// 4:2:0 采样下色度平面的宽高
fn chroma_extent(width: u32, height: u32) -> (usize, usize) {
  (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameDecoder;

impl FrameDecoder {
  pub fn decode(&self, frame: &RawFrame) -> Result<PixelBuffer, FrameDecodeError> {
    debug!(
      "解码原始帧: {:?} {}x{}, {} 个平面",
      frame.format,
      frame.width,
      frame.height,
      frame.planes.len()
    );
    match frame.format {
      FrameFormat::Jpeg => {
        frame.expect_planes(1)?;
        Ok(ImageCodec::decode(&frame.planes[0].data)?)
      }
      FrameFormat::Yuv420 => {
        frame.expect_planes(3)?;
        let nv21 = repack_nv21(frame)?;
        Ok(nv21_to_rgba(&nv21, frame.width, frame.height)?)
      }
      FrameFormat::Rgba8888 => {
        frame.expect_planes(1)?;
        copy_rgba(frame)
      }
      other => Err(FrameDecodeError::UnsupportedFormat(other)),
    }
  }

  /// 解码失败时记录日志并返回 `None`，调用方应跳过该帧
  pub fn decode_or_skip(&self, frame: &RawFrame) -> Option<PixelBuffer> {
    self
      .decode(frame)
      .map_err(|e| {
        warn!("跳过无法解码的帧: {}", e);
        e
      })
      .ok()
  }
}

/// 将 Y、U、V 三个平面重排为 NV21：先是全部亮度，再是 V/U 交错的色度
pub fn repack_nv21(frame: &RawFrame) -> Result<Vec<u8>, FrameDecodeError> {
  let width = frame.width as usize;
  let height = frame.height as usize;
  let (chroma_w, chroma_h) = chroma_extent(frame.width, frame.height);

  let (y, u, v) = (&frame.planes[0], &frame.planes[1], &frame.planes[2]);
  let mut nv21 = Vec::with_capacity(width * height + 2 * chroma_w * chroma_h);

  for row in 0..height {
    for col in 0..width {
      nv21.push(y.sample(0, row, col)?);
    }
  }

  for row in 0..chroma_h {
    for col in 0..chroma_w {
      nv21.push(v.sample(2, row, col)?);
      nv21.push(u.sample(1, row, col)?);
    }
  }

  Ok(nv21)
}

/// NV21 转 RGBA（BT.601）
pub fn nv21_to_rgba(nv21: &[u8], width: u32, height: u32) -> Result<PixelBuffer, FrameDecodeError> {
  let w = width as usize;
  let h = height as usize;
  let (chroma_w, chroma_h) = chroma_extent(width, height);
  let expected = w * h + 2 * chroma_w * chroma_h;
  if nv21.len() < expected {
    return Err(FrameDecodeError::PlaneOutOfBounds {
      plane: 0,
      offset: expected,
      len: nv21.len(),
    });
  }

  let (luma, chroma) = nv21.split_at(w * h);
  let mut rgba = Vec::with_capacity(w * h * RGBA_CHANNELS);

  for row in 0..h {
    for col in 0..w {
      let y = luma[row * w + col] as f32;
      let idx = ((row / 2) * chroma_w + col / 2) * 2;
      let v = chroma[idx] as f32 - 128.0;
      let u = chroma[idx + 1] as f32 - 128.0;

      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgba.extend_from_slice(&[r, g, b, 255]);
    }
  }

  Ok(PixelBuffer::from_rgba(width, height, rgba)?)
}

/// 按行跨度复制 RGBA 数据，去掉行尾填充列
fn copy_rgba(frame: &RawFrame) -> Result<PixelBuffer, FrameDecodeError> {
  let plane = &frame.planes[0];
  if plane.pixel_stride != RGBA_CHANNELS {
    return Err(FrameDecodeError::UnsupportedFormat(frame.format));
  }

  let row_len = frame.width as usize * RGBA_CHANNELS;
  let height = frame.height as usize;
  let mut rgba = Vec::with_capacity(row_len * height);

  for row in 0..height {
    let start = row * plane.row_stride;
    let end = start + row_len;
    let src = plane
      .data
      .get(start..end)
      .ok_or(FrameDecodeError::PlaneOutOfBounds {
        plane: 0,
        offset: end,
        len: plane.data.len(),
      })?;
    rgba.extend_from_slice(src);
  }

  Ok(PixelBuffer::from_rgba(frame.width, frame.height, rgba)?)
}
