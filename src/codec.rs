// 该文件是 Pilah 项目的一部分。
// src/codec.rs - 图像压缩编解码
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

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use tracing::debug;

use crate::frame::{PixelBuffer, ToRgbaImage};

/// 网络传输使用的 JPEG 质量
pub const TRANSPORT_JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum CodecError {
  #[error("图像编码错误: {0}")]
  Encode(image::ImageError),
  #[error("图像解码错误: {0}")]
  Decode(image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// JPEG 编解码器
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
  quality: u8,
}

impl Default for ImageCodec {
  fn default() -> Self {
    Self {
      quality: TRANSPORT_JPEG_QUALITY,
    }
  }
}

impl ImageCodec {
  pub fn with_quality(mut self, quality: u8) -> Self {
    self.quality = quality.clamp(1, 100);
    self
  }

  pub fn quality(&self) -> u8 {
    self.quality
  }

  pub fn encode(&self, buf: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
    Self::encode_with_quality(buf, self.quality)
  }

  /// 压缩为 JPEG，alpha 通道被丢弃
  pub fn encode_with_quality(buf: &PixelBuffer, quality: u8) -> Result<Vec<u8>, CodecError> {
    let rgb = DynamicImage::ImageRgba8(buf.to_rgba_image()).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
      .encode_image(&rgb)
      .map_err(CodecError::Encode)?;
    debug!(
      "JPEG 编码完成: {}x{}, 质量 {}, {} 字节",
      buf.width(),
      buf.height(),
      quality,
      bytes.len()
    );
    Ok(bytes)
  }

  /// 编码为 JPEG 后再转为标准 base64 文本，便于嵌入 JSON 请求体
  pub fn encode_to_text(&self, buf: &PixelBuffer) -> Result<String, CodecError> {
    let bytes = self.encode(buf)?;
    Ok(STANDARD.encode(bytes))
  }

  pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, CodecError> {
    let image = image::load_from_memory(bytes).map_err(CodecError::Decode)?;
    Ok(PixelBuffer::from(image.into_rgba8()))
  }

  /// 保存到文件，格式由扩展名决定，JPEG 使用编解码器的质量
  pub fn save(&self, buf: &PixelBuffer, path: &Path) -> Result<(), CodecError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    match ImageFormat::from_path(path) {
      Ok(ImageFormat::Jpeg) => {
        let bytes = self.encode(buf)?;
        std::fs::write(path, bytes)?;
      }
      _ => {
        buf.to_rgba_image().save(path).map_err(CodecError::Encode)?;
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient(width: u32, height: u32) -> PixelBuffer {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
      for x in 0..width {
        data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128, 255]);
      }
    }
    PixelBuffer::from_rgba(width, height, data).unwrap()
  }

  #[test]
  fn decode_of_encode_keeps_extent() {
    let buf = gradient(24, 16);
    let bytes = ImageCodec::default().encode(&buf).unwrap();
    // JPEG SOI 标记
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let decoded = ImageCodec::decode(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (24, 16));
    assert_eq!(decoded.stride(), 24 * 4);

    let original = buf.pixel(10, 10).unwrap();
    let restored = decoded.pixel(10, 10).unwrap();
    for c in 0..3 {
      assert!((original[c] as i32 - restored[c] as i32).abs() < 24);
    }
    assert_eq!(restored[3], 255);
  }

  #[test]
  fn encode_to_text_is_standard_base64_of_jpeg() {
    let buf = gradient(8, 8);
    let codec = ImageCodec::default();
    let text = codec.encode_to_text(&buf).unwrap();
    assert!(!text.contains('\n'));

    let bytes = STANDARD.decode(text.as_bytes()).unwrap();
    assert_eq!(bytes, codec.encode(&buf).unwrap());
  }

  #[test]
  fn decode_rejects_garbage() {
    let err = ImageCodec::decode(b"definitely not an image").unwrap_err();
    assert!(matches!(err, CodecError::Decode(_)));
  }

  #[test]
  fn encode_handles_padded_rows() {
    let mut data = vec![0u8; 6 * 4 * 3];
    for row in data.chunks_mut(6 * 4) {
      row[..16].copy_from_slice(&[200, 10, 10, 255].repeat(4));
    }
    let buf = PixelBuffer::new(4, 3, 6 * 4, data).unwrap();
    let decoded = ImageCodec::decode(&ImageCodec::encode_with_quality(&buf, 95).unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (4, 3));
    assert!(decoded.pixel(3, 2).unwrap()[0] > 150);
  }
}
