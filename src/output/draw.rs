// 该文件是 Pilah 项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{FrameError, PixelBuffer, ToRgbaImage},
  model::Detection,
};

const STROKE_WIDTH: u32 = 8;
const LABEL_FONT_SIZE: f32 = 40.0;
const LABEL_PADDING: i32 = 5;
// 像素坐标上限，保证后续加减不会溢出
const COORD_LIMIT: f32 = 1_048_576.0;
const BOX_COLOR: [u8; 4] = [255, 0, 0, 255]; // 红色
const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];

#[derive(Error, Debug)]
pub enum AnnotateError {
  #[error("无法加载字体: {0}")]
  InvalidFont(#[from] InvalidFont),
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
}

pub struct Annotator<'a> {
  font: FontRef<'a>,
  font_size: f32,
  stroke_width: u32,
  box_color: [u8; 4],
  text_color: [u8; 4],
}

impl Annotator<'static> {
  /// 使用内嵌字体
  pub fn new() -> Result<Self, AnnotateError> {
    let font_data: &'static [u8] = include_bytes!("../../assets/font.ttf");
    Annotator::with_font_data(font_data)
  }
}

impl<'a> Annotator<'a> {
  pub fn with_font_data(font_data: &'a [u8]) -> Result<Self, AnnotateError> {
    let font = FontRef::try_from_slice(font_data)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      stroke_width: STROKE_WIDTH,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    })
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  /// 按顺序绘制所有检测，返回新的缓冲区，输入保持不变。
  /// 边界框按缓冲区尺寸缩放，即视为归一化坐标。
  pub fn annotate(
    &self,
    buf: &PixelBuffer,
    detections: &[Detection],
  ) -> Result<PixelBuffer, AnnotateError> {
    let mut image = buf.to_rgba_image();
    for detection in detections {
      self.draw_detection(&mut image, detection);
    }

    let (width, height) = image.dimensions();
    Ok(PixelBuffer::from_rgba(width, height, image.into_raw())?)
  }

  fn draw_detection(&self, image: &mut RgbaImage, detection: &Detection) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let left = to_pixel(detection.bbox.left, w);
    let top = to_pixel(detection.bbox.top, h);
    let right = to_pixel(detection.bbox.right, w);
    let bottom = to_pixel(detection.bbox.bottom, h);
    debug!(
      "绘制 {}: ({}, {}) - ({}, {})",
      detection.class_name, left, top, right, bottom
    );

    self.draw_stroke(image, left, top, right, bottom);
    self.draw_label(image, left, top, &detection.label());
  }

  // 线宽以边为中心
  fn draw_stroke(&self, image: &mut RgbaImage, left: i32, top: i32, right: i32, bottom: i32) {
    let half = (self.stroke_width / 2) as i32;
    let span_x = ((right - left).max(0) as u32) + self.stroke_width;
    let span_y = ((bottom - top).max(0) as u32) + self.stroke_width;
    let color = Rgba(self.box_color);

    let bands = [
      Rect::at(left - half, top - half).of_size(span_x, self.stroke_width),
      Rect::at(left - half, bottom - half).of_size(span_x, self.stroke_width),
      Rect::at(left - half, top - half).of_size(self.stroke_width, span_y),
      Rect::at(right - half, top - half).of_size(self.stroke_width, span_y),
    ];
    for band in bands {
      draw_filled_rect_mut(image, band, color);
    }
  }

  // 标签背景紧贴边框左上角上方，顶部不做裁剪
  fn draw_label(&self, image: &mut RgbaImage, left: i32, top: i32, label: &str) {
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, &self.font, label);

    let bg_top = top - text_h as i32 - 2 * LABEL_PADDING;
    let bg_bottom = top - LABEL_PADDING;
    let bg_width = text_w + 2 * LABEL_PADDING as u32;
    let bg_height = (bg_bottom - bg_top).max(1) as u32;

    draw_filled_rect_mut(
      image,
      Rect::at(left, bg_top).of_size(bg_width, bg_height),
      Rgba(self.box_color),
    );
    draw_text_mut(
      image,
      Rgba(self.text_color),
      left + LABEL_PADDING,
      bg_top + LABEL_PADDING,
      scale,
      &self.font,
      label,
    );
  }
}

fn to_pixel(value: f32, extent: f32) -> i32 {
  (value * extent).round().clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}
