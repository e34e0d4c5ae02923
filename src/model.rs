// 该文件是 Pilah 项目的一部分。
// src/model.rs - 检测模型与检测结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 边界框 `[left, top, right, bottom]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  /// 由中心点形式 `(cx, cy, w, h)` 构造
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self {
      left: cx - width / 2.0,
      top: cy - height / 2.0,
      right: cx + width / 2.0,
      bottom: cy + height / 2.0,
    }
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }

  /// 按给定比例缩放，`scaled(w, h)` 把归一化坐标映射到像素坐标
  pub fn scaled(&self, sx: f32, sy: f32) -> Self {
    Self {
      left: self.left * sx,
      top: self.top * sy,
      right: self.right * sx,
      bottom: self.bottom * sy,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

impl Detection {
  /// 标签文本，例如 `Organic Waste 92.0%`
  pub fn label(&self) -> String {
    format!("{} {:.1}%", self.class_name, self.confidence * 100.0)
  }
}

/// 服务端报告的输入图像尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageExtent {
  pub width: f32,
  pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
  pub extent: Option<ImageExtent>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 置信度最高的检测，置信度相同时取靠前的一项
  pub fn best(&self) -> Option<&Detection> {
    self.items.iter().fold(None, |best: Option<&Detection>, item| match best {
      Some(b) if b.confidence >= item.confidence => Some(b),
      _ => Some(item),
    })
  }

  /// 使用服务端报告的图像尺寸把边界框换算为归一化坐标；
  /// 尺寸未知时原样返回
  pub fn normalized(&self) -> DetectResult {
    let Some(extent) = self.extent else {
      return self.clone();
    };
    if extent.width <= 0.0 || extent.height <= 0.0 {
      return self.clone();
    }

    let items = self
      .items
      .iter()
      .map(|item| Detection {
        bbox: BoundingBox::new(
          item.bbox.left / extent.width,
          item.bbox.top / extent.height,
          item.bbox.right / extent.width,
          item.bbox.bottom / extent.height,
        ),
        ..item.clone()
      })
      .collect();

    DetectResult {
      items,
      extent: Some(ImageExtent {
        width: 1.0,
        height: 1.0,
      }),
    }
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
      extent: None,
    }
  }
}

/// 垃圾类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasteCategory {
  Hazardous,
  Inorganic,
  Organic,
}

impl WasteCategory {
  /// 服务端原始类别名（大小写不敏感）
  pub fn from_raw(raw: &str) -> Option<Self> {
    match raw.to_lowercase().as_str() {
      "b3" => Some(WasteCategory::Hazardous),
      "anorganik" => Some(WasteCategory::Inorganic),
      "organik" => Some(WasteCategory::Organic),
      _ => None,
    }
  }

  /// 原始类别名或规范化后的显示名均可识别
  pub fn from_label(label: &str) -> Option<Self> {
    Self::from_raw(label).or_else(|| {
      let lower = label.to_lowercase();
      [
        WasteCategory::Hazardous,
        WasteCategory::Inorganic,
        WasteCategory::Organic,
      ]
      .into_iter()
      .find(|c| c.display_name().to_lowercase() == lower)
    })
  }

  pub fn display_name(&self) -> &'static str {
    match self {
      WasteCategory::Hazardous => "Hazardous Waste",
      WasteCategory::Inorganic => "Inorganic Waste",
      WasteCategory::Organic => "Organic Waste",
    }
  }

  pub fn recommendation(&self) -> &'static str {
    match self {
      WasteCategory::Organic => {
        "Organic waste can be composted. Keep it apart from other waste and put it in the organic (green) bin."
      }
      WasteCategory::Inorganic => {
        "Inorganic waste such as plastic, cans and paper can be recycled. Clean it first, then put it in the recycling (yellow) bin."
      }
      WasteCategory::Hazardous => {
        "Hazardous and toxic waste needs special handling. Do not throw it away carelessly; take it to the nearest hazardous waste collection point."
      }
    }
  }
}

pub const GENERIC_RECOMMENDATION: &str =
  "Make sure to dispose of waste in the right place according to its type and characteristics.";

/// 类别名规范化：已知类别映射为显示名，其余原样保留
pub fn normalize_class_name(raw: &str) -> String {
  match WasteCategory::from_raw(raw) {
    Some(category) => category.display_name().to_string(),
    None => raw.to_string(),
  }
}

pub mod client;
pub mod response_parser;
pub use self::client::{
  InferenceClient, InferenceError, InferenceOutcome, InferenceResponse, PendingInference,
  ServiceConfig, StatusClass,
};

#[cfg(test)]
mod tests {
  use super::*;

  fn det(name: &str, confidence: f32) -> Detection {
    Detection {
      class_name: name.to_string(),
      confidence,
      bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
    }
  }

  #[test]
  fn center_form_converts_to_corners() {
    let bbox = BoundingBox::from_center(100.0, 50.0, 40.0, 60.0);
    assert_eq!(bbox, BoundingBox::new(80.0, 20.0, 120.0, 80.0));
    assert_eq!(bbox.width(), 40.0);
    assert_eq!(bbox.height(), 60.0);
  }

  #[test]
  fn class_names_normalize_case_insensitively() {
    assert_eq!(normalize_class_name("B3"), "Hazardous Waste");
    assert_eq!(normalize_class_name("anorganik"), "Inorganic Waste");
    assert_eq!(normalize_class_name("Organik"), "Organic Waste");
    assert_eq!(normalize_class_name("bottle"), "bottle");
  }

  #[test]
  fn category_recognizes_display_names() {
    assert_eq!(
      WasteCategory::from_label("organic waste"),
      Some(WasteCategory::Organic)
    );
    assert_eq!(WasteCategory::from_label("b3"), Some(WasteCategory::Hazardous));
    assert_eq!(WasteCategory::from_label("glass"), None);
  }

  #[test]
  fn best_prefers_first_on_tie() {
    let result = DetectResult::from(vec![det("a", 0.4), det("b", 0.9), det("c", 0.9)]);
    assert_eq!(result.best().map(|d| d.class_name.as_str()), Some("b"));
    assert!(DetectResult::default().best().is_none());
  }

  #[test]
  fn label_uses_one_decimal_percent() {
    assert_eq!(det("Organic Waste", 0.923).label(), "Organic Waste 92.3%");
  }

  #[test]
  fn normalized_divides_by_service_extent() {
    let result = DetectResult {
      items: vec![Detection {
        bbox: BoundingBox::new(80.0, 20.0, 120.0, 80.0),
        ..det("x", 0.5)
      }]
      .into_boxed_slice(),
      extent: Some(ImageExtent {
        width: 200.0,
        height: 100.0,
      }),
    };

    let normalized = result.normalized();
    assert_eq!(normalized.items[0].bbox, BoundingBox::new(0.4, 0.2, 0.6, 0.8));
    assert_eq!(DetectResult::from(vec![det("y", 0.1)]).normalized().items[0].bbox.right, 1.0);
  }
}
