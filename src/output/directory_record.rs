// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output/directory_record.rs - 命中帧目录记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, Local};
use image::DynamicImage;
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{BoundingBox, DetectionResult},
  output::{
    OverlayOutput, Render,
    draw::{Draw, record},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把每次命中的标注帧保存到 `目录/年/月/日/时-分-秒-序号.png`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  overlay: OverlayOutput,
  frame_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  /// `folder:///dir?font=/path/to/font.ttf`
  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let draw = match uri.query_pairs().find(|(k, _)| k == "font") {
      Some((_, font)) => Draw::with_font_file(&*font)?,
      None => Draw::default(),
    };

    Ok(Self::new(uri.path(), draw))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, draw: Draw) -> Self {
    Self {
      directory: directory.into(),
      draw,
      overlay: OverlayOutput::default(),
      frame_counter: Mutex::new(0),
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &DynamicImage,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    self.overlay.set(result.bounding_box);

    let path = self.frame_path()?;
    self.draw.draw_detection(frame, result).save(&path)?;
    record(result, &path)?;
    info!("命中帧已保存: {}", path.display());
    Ok(())
  }

  fn clear(&self) {
    self.overlay.clear();
  }

  fn current(&self) -> Option<BoundingBox> {
    self.overlay.current()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn saves_frame_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), Draw::default());
    let result = DetectionResult {
      detected: true,
      confidence: 0.95,
      bounding_box: Some(BoundingBox {
        ymin: 0.1,
        xmin: 0.1,
        ymax: 0.9,
        xmax: 0.9,
      }),
    };

    output
      .render_result(&DynamicImage::new_rgb8(32, 32), &result)
      .unwrap();
    assert_eq!(output.current(), result.bounding_box);

    let mut pngs = Vec::new();
    let mut stack = vec![dir.path().to_path_buf()];
    while let Some(path) = stack.pop() {
      for entry in std::fs::read_dir(path).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == "png") {
          pngs.push(path);
        }
      }
    }
    assert_eq!(pngs.len(), 1);
    let text = std::fs::read_to_string(pngs[0].with_extension("txt")).unwrap();
    assert!(text.starts_with("0.9500, 0.1000"));

    output.clear();
    assert!(output.current().is_none());
  }
}
