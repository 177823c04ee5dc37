// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/model.rs - 检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

/// 归一化坐标的边框，各分量位于 `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub ymin: f32,
  pub xmin: f32,
  pub ymax: f32,
  pub xmax: f32,
}

impl BoundingBox {
  /// 按 `[x_min, y_min, x_max, y_max]` 顺序输出，供绘制使用
  pub fn to_xyxy(&self) -> [f32; 4] {
    [self.xmin, self.ymin, self.xmax, self.ymax]
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
  pub detected: bool,
  pub confidence: f32,
  pub bounding_box: Option<BoundingBox>,
}

impl DetectionResult {
  /// 所有失败路径共用的安全默认值
  pub fn none() -> Self {
    Self {
      detected: false,
      confidence: 0.0,
      bounding_box: None,
    }
  }

  pub fn is_hit(&self, threshold: f32) -> bool {
    self.detected && self.confidence >= threshold
  }
}

impl Default for DetectionResult {
  fn default() -> Self {
    Self::none()
  }
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("网络错误: {0}")]
  Network(#[from] reqwest::Error),
  #[error("服务返回 {status}: {message}")]
  Status {
    status: reqwest::StatusCode,
    message: String,
  },
  #[error("响应格式错误: {0}")]
  Schema(String),
  #[error("模型返回空响应")]
  EmptyBody,
}

impl From<serde_json::Error> for DetectError {
  fn from(err: serde_json::Error) -> Self {
    DetectError::Schema(err.to_string())
  }
}

/// 远程检测接口。实现方必须吞掉所有错误，失败时返回 [`DetectionResult::none`]。
pub trait Detect: Send + Sync + 'static {
  fn detect(
    &self,
    credentials: &str,
    targets: &[String],
    screen: &str,
  ) -> impl Future<Output = DetectionResult> + Send;
}

/// 解析模型输出的 JSON 文本
pub fn parse_detection(text: &str) -> Result<DetectionResult, DetectError> {
  if text.trim().is_empty() {
    return Err(DetectError::EmptyBody);
  }

  let value: Value = serde_json::from_str(text)?;
  let object = value
    .as_object()
    .ok_or_else(|| DetectError::Schema("响应不是 JSON 对象".to_string()))?;

  let detected = object.get("detected").is_some_and(truthy);
  let confidence = object.get("confidence").map(to_number).unwrap_or(0.0);
  let bounding_box = object.get("box_2d").and_then(parse_box);

  Ok(DetectionResult {
    detected,
    confidence,
    bounding_box,
  })
}

/// `box_2d` 必须恰好是 4 个数，且都在 `[0, 1]` 内，否则丢弃
fn parse_box(value: &Value) -> Option<BoundingBox> {
  let items = value.as_array()?;
  if items.len() != 4 {
    return None;
  }

  let mut coords = [0f32; 4];
  for (slot, item) in coords.iter_mut().zip(items) {
    let v = item.as_f64()?;
    if !(0.0..=1.0).contains(&v) {
      return None;
    }
    *slot = v as f32;
  }

  let [ymin, xmin, ymax, xmax] = coords;
  Some(BoundingBox {
    ymin,
    xmin,
    ymax,
    xmax,
  })
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

fn to_number(value: &Value) -> f32 {
  let number = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) if s.trim().is_empty() => Some(0.0),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    _ => None,
  };
  number
    .filter(|v| v.is_finite())
    .map(|v| v as f32)
    .unwrap_or(0.0)
}

mod gemini;
pub use self::gemini::{
  DEFAULT_ENDPOINT, DEFAULT_MODEL, GeminiBuildError, GeminiBuilder, GeminiDetector,
};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_in_range_box() {
    let result =
      parse_detection(r#"{"detected": true, "confidence": 0.9, "box_2d": [0.1, 0.2, 0.5, 0.6]}"#)
        .unwrap();
    assert!(result.detected);
    assert!((result.confidence - 0.9).abs() < 1e-6);
    let bbox = result.bounding_box.unwrap();
    assert!((bbox.ymin - 0.1).abs() < 1e-6);
    assert!((bbox.xmin - 0.2).abs() < 1e-6);
    assert!((bbox.ymax - 0.5).abs() < 1e-6);
    assert!((bbox.xmax - 0.6).abs() < 1e-6);
  }

  #[test]
  fn out_of_range_box_is_dropped() {
    let result =
      parse_detection(r#"{"detected": true, "confidence": 0.9, "box_2d": [-0.1, 0.2, 0.5, 0.6]}"#)
        .unwrap();
    assert!(result.detected);
    assert!((result.confidence - 0.9).abs() < 1e-6);
    assert!(result.bounding_box.is_none());

    let result =
      parse_detection(r#"{"detected": true, "confidence": 0.9, "box_2d": [0.1, 0.2, 1.5, 0.6]}"#)
        .unwrap();
    assert!(result.bounding_box.is_none());
  }

  #[test]
  fn malformed_box_is_dropped() {
    for raw in [
      r#"{"detected": true, "confidence": 1, "box_2d": [0.1, 0.2, 0.5]}"#,
      r#"{"detected": true, "confidence": 1, "box_2d": [0.1, "0.2", 0.5, 0.6]}"#,
      r#"{"detected": true, "confidence": 1, "box_2d": "0.1,0.2,0.5,0.6"}"#,
    ] {
      assert!(parse_detection(raw).unwrap().bounding_box.is_none(), "{}", raw);
    }
  }

  #[test]
  fn fields_are_coerced() {
    let result = parse_detection(r#"{"detected": "yes", "confidence": "0.75"}"#).unwrap();
    assert!(result.detected);
    assert!((result.confidence - 0.75).abs() < 1e-6);

    let result = parse_detection(r#"{"detected": 0, "confidence": "high"}"#).unwrap();
    assert!(!result.detected);
    assert_eq!(result.confidence, 0.0);

    let result = parse_detection(r#"{}"#).unwrap();
    assert_eq!(result, DetectionResult::none());
  }

  #[test]
  fn empty_and_invalid_bodies_are_errors() {
    assert!(matches!(parse_detection("  "), Err(DetectError::EmptyBody)));
    assert!(matches!(parse_detection("not json"), Err(DetectError::Schema(_))));
    assert!(matches!(parse_detection("[1, 2]"), Err(DetectError::Schema(_))));
  }

  #[test]
  fn hit_requires_threshold() {
    let result = DetectionResult {
      detected: true,
      confidence: 0.8,
      bounding_box: None,
    };
    assert!(result.is_hit(0.8));
    assert!(!result.is_hit(0.85));
    assert!(!DetectionResult::none().is_hit(0.0));
  }
}
