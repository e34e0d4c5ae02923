// 该文件是 Pilah 项目的一部分。
// src/output/summary.rs - 检测结果文字摘要
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

use std::fmt;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PixelBuffer,
  model::{DetectResult, Detection, GENERIC_RECOMMENDATION, WasteCategory},
  output::Render,
};

pub const NO_WASTE_DETECTED: &str = "No waste detected";
pub const EMPTY_RECOMMENDATION: &str =
  "Make sure the image is clear and the waste object is clearly visible.";

/// 单次检测的文字摘要
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSummary {
  pub count: usize,
  pub best: Option<Detection>,
  pub headline: String,
  pub confidence: String,
  pub all_detections: String,
  pub live_text: String,
  pub recommendation: &'static str,
}

impl DetectionSummary {
  pub fn new(result: &DetectResult) -> Self {
    let count = result.len();
    let Some(best) = result.best().cloned() else {
      return Self {
        count,
        best: None,
        headline: NO_WASTE_DETECTED.to_string(),
        confidence: "Confidence: 0%".to_string(),
        all_detections: "-".to_string(),
        live_text: NO_WASTE_DETECTED.to_string(),
        recommendation: EMPTY_RECOMMENDATION,
      };
    };

    let all_detections = result
      .items
      .iter()
      .map(|d| format!("{} ({:.1}%)", d.class_name, d.confidence * 100.0))
      .collect::<Vec<_>>()
      .join(", ");
    let recommendation = WasteCategory::from_label(&best.class_name)
      .map(|c| c.recommendation())
      .unwrap_or(GENERIC_RECOMMENDATION);

    Self {
      count,
      headline: best.class_name.clone(),
      confidence: format!("Confidence: {:.1}%", best.confidence * 100.0),
      live_text: format!("Detected: {}", all_detections),
      all_detections,
      recommendation,
      best: Some(best),
    }
  }

  pub fn count_text(&self) -> String {
    format!("{} objects", self.count)
  }
}

impl fmt::Display for DetectionSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", self.count_text())?;
    writeln!(f, "{}", self.headline)?;
    writeln!(f, "{}", self.confidence)?;
    writeln!(f, "{}", self.all_detections)?;
    write!(f, "{}", self.recommendation)
  }
}

#[derive(Error, Debug)]
pub enum SummaryOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 把摘要写入日志，`summary://` 或 `summary://live`
pub struct SummaryOutput {
  live: bool,
}

impl SummaryOutput {
  pub fn new(live: bool) -> Self {
    Self { live }
  }
}

impl FromUrlWithScheme for SummaryOutput {
  const SCHEME: &'static str = "summary";
}

impl FromUrl for SummaryOutput {
  type Error = SummaryOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SummaryOutputError::SchemeMismatch);
    }
    let live = url.host_str() == Some("live") || url.query_pairs().any(|(k, _)| k == "live");
    Ok(SummaryOutput::new(live))
  }
}

impl Render<PixelBuffer, DetectResult> for SummaryOutput {
  type Error = SummaryOutputError;

  fn render_result(&self, _frame: &PixelBuffer, result: &DetectResult) -> Result<(), Self::Error> {
    let summary = DetectionSummary::new(result);
    if self.live {
      info!("{}", summary.live_text);
    } else {
      for line in summary.to_string().lines() {
        info!("{}", line);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  fn det(name: &str, confidence: f32) -> Detection {
    Detection {
      class_name: name.to_string(),
      confidence,
      bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
    }
  }

  #[test]
  fn summary_reports_best_detection() {
    let result = DetectResult::from(vec![det("Inorganic Waste", 0.51), det("Hazardous Waste", 0.92)]);
    let summary = DetectionSummary::new(&result);

    assert_eq!(summary.count_text(), "2 objects");
    assert_eq!(summary.headline, "Hazardous Waste");
    assert_eq!(summary.confidence, "Confidence: 92.0%");
    assert_eq!(
      summary.all_detections,
      "Inorganic Waste (51.0%), Hazardous Waste (92.0%)"
    );
    assert_eq!(
      summary.live_text,
      "Detected: Inorganic Waste (51.0%), Hazardous Waste (92.0%)"
    );
    assert_eq!(summary.recommendation, WasteCategory::Hazardous.recommendation());
  }

  #[test]
  fn empty_result_has_placeholders() {
    let summary = DetectionSummary::new(&DetectResult::default());
    assert_eq!(summary.count, 0);
    assert_eq!(summary.headline, NO_WASTE_DETECTED);
    assert_eq!(summary.all_detections, "-");
    assert_eq!(summary.live_text, NO_WASTE_DETECTED);
    assert!(summary.best.is_none());
  }

  #[test]
  fn unknown_class_gets_generic_recommendation() {
    let summary = DetectionSummary::new(&DetectResult::from(vec![det("bottle", 0.7)]));
    assert_eq!(summary.recommendation, GENERIC_RECOMMENDATION);
    let summary = DetectionSummary::new(&DetectResult::from(vec![det("organik", 0.7)]));
    assert_eq!(summary.recommendation, WasteCategory::Organic.recommendation());
  }

  #[test]
  fn live_flag_is_read_from_url() {
    let output = SummaryOutput::from_url(&Url::parse("summary://live").unwrap()).unwrap();
    assert!(output.live);
    let output = SummaryOutput::from_url(&Url::parse("summary://log").unwrap()).unwrap();
    assert!(!output.live);
  }
}
