// 该文件是 Pilah 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  codec::{CodecError, ImageCodec},
  frame::{PixelBuffer, Rotation},
  input::rotation_from_query,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] CodecError),
  #[error("Invalid rotation: {0}")]
  InvalidRotation(String),
}

/// 单张图像文件输入，例如 `image:///data/photo.jpg?rotate=90`
pub struct ImageFileInput {
  image: Option<PixelBuffer>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let rotation = rotation_from_query(url).map_err(ImageFileInputError::InvalidRotation)?;
    let path = url.path();
    let bytes = std::fs::read(path)?;
    let image = ImageCodec::decode(&bytes)?;
    info!(
      "读取图像文件: {} ({}x{})",
      path,
      image.width(),
      image.height()
    );

    Ok(ImageFileInput::new(image, rotation))
  }
}

impl ImageFileInput {
  pub fn new(image: PixelBuffer, rotation: Rotation) -> Self {
    let image = match rotation {
      Rotation::None => image,
      rotation => image.rotated(rotation),
    };
    Self { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = PixelBuffer;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
