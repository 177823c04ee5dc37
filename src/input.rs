// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input.rs - 屏幕/图像输入
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

use image::DynamicImage;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{FromUrl, FromUrlWithScheme};

/// 实时画面来源。
///
/// `grab` 返回 `Ok(None)` 表示暂时没有可用帧（尚未就绪、已暂停或已结束），
/// 调用方应跳过本次检查。
pub trait FrameSource: Send + Sync + 'static {
  fn grab(&self) -> Result<Option<DynamicImage>, InputError>;
  /// 来源在外部被结束时触发（例如屏幕被拔出）
  fn ended(&self) -> CancellationToken;
  /// 释放底层资源，之后 `grab` 只会返回 `Ok(None)`
  fn release(&self);
  fn describe(&self) -> String;
  /// 在未截图时检查来源是否仍然可用，不可用时触发 `ended`
  fn poll(&self) {}
}

mod read_image_file;
pub use self::read_image_file::ImageFileInput;

#[cfg(feature = "screen_input")]
mod screen_input;
#[cfg(feature = "screen_input")]
pub use self::screen_input::ScreenInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("屏幕捕获错误: {0}")]
  CaptureError(String),
  #[error("找不到显示器: {0}")]
  MonitorNotFound(String),
}

pub enum InputWrapper {
  #[cfg(feature = "screen_input")]
  Screen(ScreenInput),
  ImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "screen_input")]
      ScreenInput::SCHEME => Ok(InputWrapper::Screen(ScreenInput::from_url(url)?)),
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl FrameSource for InputWrapper {
  fn grab(&self) -> Result<Option<DynamicImage>, InputError> {
    match self {
      #[cfg(feature = "screen_input")]
      InputWrapper::Screen(input) => input.grab(),
      InputWrapper::ImageFile(input) => input.grab(),
    }
  }

  fn ended(&self) -> CancellationToken {
    match self {
      #[cfg(feature = "screen_input")]
      InputWrapper::Screen(input) => input.ended(),
      InputWrapper::ImageFile(input) => input.ended(),
    }
  }

  fn release(&self) {
    match self {
      #[cfg(feature = "screen_input")]
      InputWrapper::Screen(input) => input.release(),
      InputWrapper::ImageFile(input) => input.release(),
    }
  }

  fn describe(&self) -> String {
    match self {
      #[cfg(feature = "screen_input")]
      InputWrapper::Screen(input) => input.describe(),
      InputWrapper::ImageFile(input) => input.describe(),
    }
  }

  fn poll(&self) {
    match self {
      #[cfg(feature = "screen_input")]
      InputWrapper::Screen(input) => input.poll(),
      InputWrapper::ImageFile(input) => input.poll(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }
}
