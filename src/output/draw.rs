// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};

use crate::model::{BoundingBox, DetectionResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BOX_THICKNESS: i32 = 3;

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  /// 载入字体后会在边框上方标注置信度
  pub fn with_font_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn draw_detection(&self, frame: &DynamicImage, result: &DetectionResult) -> RgbImage {
    let mut image = frame.to_rgb8();
    if let Some(bbox) = &result.bounding_box {
      self.draw_bbox_with_label(&mut image, bbox, result.confidence);
    }
    image
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &BoundingBox, confidence: f32) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let [x_min, y_min, x_max, y_max] = bbox.to_xyxy();
    let x_min = ((x_min * w as f32).floor() as i32).clamp(0, w - 1);
    let y_min = ((y_min * h as f32).floor() as i32).clamp(0, h - 1);
    let x_max = ((x_max * w as f32).ceil() as i32).clamp(0, w - 1);
    let y_max = ((y_max * h as f32).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.color);
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{:.0}%", confidence * 100.0);
    let text_width = ((label.len() as f32 * LABEL_CHAR_WIDTH) as i32).min(w - x_min);
    let label_y = (y_min - LABEL_TEXT_HEIGHT).max(0);
    if text_width <= 0 {
      return;
    }

    let rect = Rect::at(x_min, label_y).of_size(text_width as u32, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      x_min,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      PxScale::from(self.font_size),
      font,
      &label,
    );
  }
}

/// 命中记录：每行 `confidence, ymin, xmin, ymax, xmax`
pub fn record(result: &DetectionResult, path: &Path) -> std::io::Result<()> {
  let line = match &result.bounding_box {
    Some(b) => format!(
      "{:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
      result.confidence, b.ymin, b.xmin, b.ymax, b.xmax
    ),
    None => format!("{:.4}", result.confidence),
  };
  std::fs::write(path.with_extension("txt"), line)
}
