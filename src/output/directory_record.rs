// 该文件是 Pilah 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::{debug, info};

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
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("标注失败: {0}")]
  Annotate(#[from] AnnotateError),
  #[error("图像保存失败: {0}")]
  Codec(#[from] CodecError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// `Draw` 保存标注后的图像；`Record` 保存原图并在同名 `.txt` 中记录检测结果
pub enum RecordMode<'a> {
  Draw(Box<Annotator<'a>>),
  Record,
}

impl RecordMode<'_> {
  fn save_result(
    &self,
    codec: &ImageCodec,
    path: &Path,
    frame: &PixelBuffer,
    result: &DetectResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      RecordMode::Draw(annotator) => {
        let image = annotator.annotate(frame, &result.items)?;
        codec.save(&image, path)?;
      }
      RecordMode::Record => {
        codec.save(frame, path)?;
        std::fs::write(path.with_extension("txt"), record_lines(result))?;
      }
    }
    Ok(())
  }
}

/// 每行一项：`类别, 置信度, left, top, right, bottom`
pub fn record_lines(result: &DetectResult) -> String {
  result
    .items
    .iter()
    .map(|item| {
      format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        item.class_name,
        item.confidence,
        item.bbox.left,
        item.bbox.top,
        item.bbox.right,
        item.bbox.bottom
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// 按日期分目录保存结果，例如 `folder:///data/results?record&always`
pub struct DirectoryRecordOutput<'a> {
  directory: PathBuf,
  mode: RecordMode<'a>,
  codec: ImageCodec,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput<'static> {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput<'static> {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mode = if uri.query_pairs().any(|(k, _)| k == "record") {
      RecordMode::Record
    } else {
      RecordMode::Draw(Box::new(Annotator::new()?))
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(uri.path(), mode).with_always(always))
  }
}

impl<'a> DirectoryRecordOutput<'a> {
  pub fn new(directory: impl AsRef<Path>, mode: RecordMode<'a>) -> Self {
    DirectoryRecordOutput {
      directory: directory.as_ref().to_path_buf(),
      mode,
      codec: ImageCodec::default(),
      frame_counter: AtomicU16::new(0),
      always: false,
    }
  }

  /// 没有检测结果时也保存
  pub fn with_always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.jpg",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<PixelBuffer, DetectResult> for DirectoryRecordOutput<'_> {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &PixelBuffer, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("没有检测结果，跳过保存");
      return Ok(());
    }

    let path = self.frame_path(Utc::now())?;
    self
      .mode
      .save_result(&self.codec, &path, frame, &result.normalized())?;
    info!("保存检测结果: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, Detection};

  fn saved_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files.sort();
    files
  }

  fn one_detection() -> DetectResult {
    DetectResult::from(vec![Detection {
      class_name: "Hazardous Waste".to_string(),
      confidence: 0.92,
      bbox: BoundingBox::new(0.1, 0.2, 0.5, 0.6),
    }])
  }

  #[test]
  fn record_mode_writes_image_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::Record);
    let frame = PixelBuffer::filled(32, 16, [10, 20, 30, 255]).unwrap();

    output.render_result(&frame, &one_detection()).unwrap();
    output.render_result(&frame, &one_detection()).unwrap();

    let files = saved_files(dir.path());
    assert_eq!(files.len(), 4);
    let record = files
      .iter()
      .find(|p| p.extension().is_some_and(|e| e == "txt"))
      .unwrap();
    assert_eq!(
      std::fs::read_to_string(record).unwrap(),
      "Hazardous Waste, 0.9200, 0.1000, 0.2000, 0.5000, 0.6000"
    );
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = PixelBuffer::filled(8, 8, [0, 0, 0, 255]).unwrap();

    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::Record);
    output.render_result(&frame, &DetectResult::default()).unwrap();
    assert!(saved_files(dir.path()).is_empty());

    let output = output.with_always(true);
    output.render_result(&frame, &DetectResult::default()).unwrap();
    assert_eq!(saved_files(dir.path()).len(), 2);
  }

  #[test]
  fn frame_ids_increase() {
    let output = DirectoryRecordOutput::new("/tmp", RecordMode::Record);
    assert_eq!(output.frame_id(), 1);
    assert_eq!(output.frame_id(), 2);
  }
}
