// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::DynamicImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(feature = "directory_record")]
use crate::FromUrlWithScheme;
use crate::model::{BoundingBox, DetectionResult};

/// 命中时的可视化叠加层
pub trait Render: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn render_result(&self, frame: &DynamicImage, result: &DetectionResult)
  -> Result<(), Self::Error>;
  fn clear(&self);
  /// 当前显示中的边框
  fn current(&self) -> Option<BoundingBox>;
}

/// 命中时的声音提醒
pub trait Alarm: Send + Sync + 'static {
  fn ring(&self);
}

mod overlay;
pub use self::overlay::OverlayOutput;

mod sound;
pub use self::sound::SoundAlarm;

#[cfg(feature = "directory_record")]
pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Overlay(OverlayOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      OverlayOutput::SCHEME => Ok(OutputWrapper::Overlay(OverlayOutput::default())),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &DynamicImage,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Overlay(output) => match output.render_result(frame, result) {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn clear(&self) {
    match self {
      OutputWrapper::Overlay(output) => output.clear(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.clear(),
    }
  }

  fn current(&self) -> Option<BoundingBox> {
    match self {
      OutputWrapper::Overlay(output) => output.current(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.current(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn picks_output_by_scheme() {
    let url = Url::parse("overlay:").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Overlay(_))
    ));

    let url = Url::parse("rtsp://0.0.0.0:8554/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
