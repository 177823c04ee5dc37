// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input/read_image_file.rs - 静态图像输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::{Mutex, PoisonError};

use image::{DynamicImage, ImageReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
};

/// 反复回放同一张图片，用于离线验证目标图像
pub struct ImageFileInput {
  path: String,
  image: Mutex<Option<DynamicImage>>,
  ended: CancellationToken,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url.path().to_string();
    let image = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
    info!("已载入图像 {} ({}x{})", path, image.width(), image.height());

    Ok(Self::from_image(path, image))
  }
}

impl ImageFileInput {
  pub fn from_image(path: impl Into<String>, image: DynamicImage) -> Self {
    Self {
      path: path.into(),
      image: Mutex::new(Some(image)),
      ended: CancellationToken::new(),
    }
  }
}

impl FrameSource for ImageFileInput {
  fn grab(&self) -> Result<Option<DynamicImage>, InputError> {
    let image = self.image.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(image.clone())
  }

  fn ended(&self) -> CancellationToken {
    self.ended.clone()
  }

  fn release(&self) {
    self
      .image
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
  }

  fn describe(&self) -> String {
    format!("图像文件 {}", self.path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn replays_until_released() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("screen.png");
    RgbImage::new(8, 6).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();

    for _ in 0..2 {
      let frame = input.grab().unwrap().unwrap();
      assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    input.release();
    assert!(input.grab().unwrap().is_none());
    assert!(!input.ended().is_cancelled());
  }
}
