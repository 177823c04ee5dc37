// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output/overlay.rs - 内存中的边框叠加层
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};

use image::DynamicImage;
use tracing::debug;

use crate::{
  model::{BoundingBox, DetectionResult},
  output::Render,
};

#[derive(Debug, Default)]
pub struct OverlayOutput {
  current: Mutex<Option<BoundingBox>>,
}

impl OverlayOutput {
  pub const SCHEME: &'static str = "overlay";

  pub(crate) fn set(&self, bbox: Option<BoundingBox>) {
    *self.current.lock().unwrap_or_else(PoisonError::into_inner) = bbox;
  }
}

impl Render for OverlayOutput {
  type Error = Infallible;

  fn render_result(
    &self,
    _frame: &DynamicImage,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    if let Some(bbox) = result.bounding_box {
      debug!("叠加边框: {:?}", bbox);
    }
    self.set(result.bounding_box);
    Ok(())
  }

  fn clear(&self) {
    self.set(None);
  }

  fn current(&self) -> Option<BoundingBox> {
    *self.current.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
