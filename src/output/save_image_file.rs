// 该文件是 Pilah 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  codec::{CodecError, ImageCodec},
  frame::PixelBuffer,
  model::DetectResult,
  output::{
    Render,
    draw::{AnnotateError, Annotator},
  },
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("标注失败: {0}")]
  Annotate(#[from] AnnotateError),
  #[error("保存失败: {0}")]
  Codec(#[from] CodecError),
}

/// 标注后保存为单个图像文件，例如 `image:///tmp/result.jpg`
pub struct SaveImageFileOutput<'a> {
  path: PathBuf,
  annotator: Annotator<'a>,
  codec: ImageCodec,
}

impl FromUrlWithScheme for SaveImageFileOutput<'static> {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput<'static> {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(uri.path(), Annotator::new()?))
  }
}

impl<'a> SaveImageFileOutput<'a> {
  pub fn new(path: impl AsRef<Path>, annotator: Annotator<'a>) -> Self {
    SaveImageFileOutput {
      path: path.as_ref().to_path_buf(),
      annotator,
      codec: ImageCodec::default(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<PixelBuffer, DetectResult> for SaveImageFileOutput<'_> {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &PixelBuffer, result: &DetectResult) -> Result<(), Self::Error> {
    let result = result.normalized();
    let image = self.annotator.annotate(frame, &result.items)?;
    self.codec.save(&image, &self.path)?;
    info!("保存图像到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, Detection};

  #[test]
  fn annotated_image_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("result.jpg");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();

    let output = SaveImageFileOutput::from_url(&url).unwrap();
    let frame = PixelBuffer::filled(64, 48, [0, 128, 0, 255]).unwrap();
    let result = DetectResult::from(vec![Detection {
      class_name: "Organic Waste".to_string(),
      confidence: 0.8,
      bbox: BoundingBox::new(0.25, 0.25, 0.75, 0.75),
    }]);

    output.render_result(&frame, &result).unwrap();

    let saved = ImageCodec::decode(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!((saved.width(), saved.height()), (64, 48));
  }

  #[test]
  fn other_schemes_are_rejected() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
