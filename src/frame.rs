// 该文件是 Pilah 项目的一部分。
// src/frame.rs - RGBA 像素缓冲区定义
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

use image::{RgbaImage, imageops};
use thiserror::Error;

pub const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("图像尺寸为空: {width}x{height}")]
  EmptyExtent { width: u32, height: u32 },
  #[error("行跨度过小: 宽度 {width} 至少需要 {required} 字节, 实际 {stride} 字节")]
  StrideTooSmall {
    width: u32,
    stride: usize,
    required: usize,
  },
  #[error("数据长度不足: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  StorageTooSmall { expected: usize, actual: usize },
}

/// 32 位 RGBA 像素缓冲区
///
/// 行与行之间可以带有填充字节，`stride` 为一行所占的字节数。
/// 构造时保证 `stride >= width * 4` 且 `data.len() >= stride * height`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
  width: u32,
  height: u32,
  stride: usize,
  data: Box<[u8]>,
}

impl PixelBuffer {
  pub fn new(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyExtent { width, height });
    }

    let required = width as usize * RGBA_CHANNELS;
    if stride < required {
      return Err(FrameError::StrideTooSmall {
        width,
        stride,
        required,
      });
    }

    let expected = stride * height as usize;
    if data.len() < expected {
      return Err(FrameError::StorageTooSmall {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      stride,
      data: data.into_boxed_slice(),
    })
  }

  /// 紧凑排列（无行填充）的 RGBA 数据
  pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    Self::new(width, height, width as usize * RGBA_CHANNELS, data)
  }

  pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Result<Self, FrameError> {
    let data = color.repeat(width as usize * height as usize);
    Self::from_rgba(width, height, data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn channels(&self) -> usize {
    RGBA_CHANNELS
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  fn row_len(&self) -> usize {
    self.width as usize * RGBA_CHANNELS
  }

  /// 逐行迭代像素数据，不包含行尾填充
  pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
    let row_len = self.row_len();
    self
      .data
      .chunks(self.stride)
      .take(self.height as usize)
      .map(move |row| &row[..row_len])
  }

  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let idx = y as usize * self.stride + x as usize * RGBA_CHANNELS;
    let mut pixel = [0u8; 4];
    pixel.copy_from_slice(&self.data[idx..idx + RGBA_CHANNELS]);
    Some(pixel)
  }

  pub fn rotated(&self, rotation: Rotation) -> PixelBuffer {
    let image = self.to_rgba_image();
    let rotated = match rotation {
      Rotation::None => image,
      Rotation::Cw90 => imageops::rotate90(&image),
      Rotation::Cw180 => imageops::rotate180(&image),
      Rotation::Cw270 => imageops::rotate270(&image),
    };
    PixelBuffer::from(rotated)
  }
}

/// 顺时针旋转角度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
  #[default]
  None,
  Cw90,
  Cw180,
  Cw270,
}

impl Rotation {
  pub fn from_degrees(degrees: u32) -> Option<Self> {
    match degrees % 360 {
      0 => Some(Rotation::None),
      90 => Some(Rotation::Cw90),
      180 => Some(Rotation::Cw180),
      270 => Some(Rotation::Cw270),
      _ => None,
    }
  }
}

pub trait ToRgbaImage {
  fn to_rgba_image(&self) -> RgbaImage;
}

pub trait FromRgbaImage {
  fn from_rgba_image(image: &RgbaImage) -> Self;
}

impl ToRgbaImage for PixelBuffer {
  fn to_rgba_image(&self) -> RgbaImage {
    let mut image = RgbaImage::new(self.width, self.height);
    let row_len = self.row_len();
    for (dst, src) in image.chunks_exact_mut(row_len).zip(self.rows()) {
      dst.copy_from_slice(src);
    }
    image
  }
}

impl FromRgbaImage for PixelBuffer {
  fn from_rgba_image(image: &RgbaImage) -> Self {
    PixelBuffer::from(image.clone())
  }
}

impl From<RgbaImage> for PixelBuffer {
  fn from(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      stride: width as usize * RGBA_CHANNELS,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl FromRgbaImage for RgbaImage {
  fn from_rgba_image(image: &RgbaImage) -> Self {
    image.clone()
  }
}
