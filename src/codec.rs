// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/codec.rs - data URL 编解码与帧压缩
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

use std::path::Path;

use base64::{Engine, prelude::BASE64_STANDARD};
use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";
/// 发送给模型前帧宽度的上限
pub const MAX_FRAME_WIDTH: u32 = 1024;
pub const FRAME_JPEG_QUALITY: u8 = 70;

#[derive(Error, Debug)]
pub enum CodecError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法识别的图像格式: {0}")]
  UnknownFormat(String),
  #[error("空帧")]
  EmptyFrame,
}

/// 内联图像：MIME 类型加 base64 负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
  pub mime_type: String,
  pub data: String,
}

/// 解析 `data:<mime>;base64,<payload>` 形式的字符串。
///
/// 缺少逗号或负载为空时返回 `None`，不会 panic。
pub fn decode_data_url(data_url: &str) -> Option<InlineImage> {
  let (header, payload) = data_url.split_once(',')?;

  let mime_type = header
    .find("data:")
    .map(|start| &header[start + "data:".len()..])
    .and_then(|rest| rest.split_once(';'))
    .map(|(mime, _)| mime.trim())
    .filter(|mime| !mime.is_empty())
    .unwrap_or(DEFAULT_MIME_TYPE);

  let data: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
  if data.is_empty() {
    return None;
  }

  Some(InlineImage {
    mime_type: mime_type.to_string(),
    data,
  })
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
  format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(bytes))
}

/// 读取整个图像文件并转为 data URL
pub fn image_file_to_data_url(path: impl AsRef<Path>) -> Result<String, CodecError> {
  let path = path.as_ref();
  let bytes = std::fs::read(path)?;

  let format = image::guess_format(&bytes)
    .ok()
    .or_else(|| ImageFormat::from_path(path).ok())
    .ok_or_else(|| CodecError::UnknownFormat(path.display().to_string()))?;

  Ok(encode_data_url(format.to_mime_type(), &bytes))
}

/// 按宽度缩放到不超过 `max_width`（保持宽高比），再压缩为 JPEG data URL。
pub fn encode_frame(
  frame: &DynamicImage,
  max_width: u32,
  quality: u8,
) -> Result<String, CodecError> {
  let (width, height) = (frame.width(), frame.height());
  if width == 0 || height == 0 {
    return Err(CodecError::EmptyFrame);
  }

  let rgb = if width > max_width {
    let scale = max_width as f32 / width as f32;
    let target_height = ((height as f32 * scale).round() as u32).max(1);
    debug!("缩放帧 {}x{} -> {}x{}", width, height, max_width, target_height);
    frame
      .resize_exact(max_width, target_height, FilterType::Triangle)
      .to_rgb8()
  } else {
    frame.to_rgb8()
  };

  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;

  Ok(encode_data_url(DEFAULT_MIME_TYPE, &buffer))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn decodes_png_data_url() {
    let image = decode_data_url("data:image/png;base64,iVBORw0==").unwrap();
    assert_eq!(image.mime_type, "image/png");
    assert_eq!(image.data, "iVBORw0==");
  }

  #[test]
  fn rejects_missing_comma() {
    assert!(decode_data_url("data:image/png;base64").is_none());
    assert!(decode_data_url("").is_none());
  }

  #[test]
  fn strips_whitespace_from_payload() {
    let image = decode_data_url("data:image/webp;base64,a b\nc").unwrap();
    assert_eq!(image.data, "abc");
  }

  #[test]
  fn empty_payload_is_rejected() {
    assert!(decode_data_url("data:image/png;base64, \n\t").is_none());
  }

  #[test]
  fn falls_back_to_jpeg_mime() {
    let image = decode_data_url("AAAA,QUJD").unwrap();
    assert_eq!(image.mime_type, DEFAULT_MIME_TYPE);
    let image = decode_data_url("data:image/png,QUJD").unwrap();
    assert_eq!(image.mime_type, DEFAULT_MIME_TYPE);
  }

  #[test]
  fn frame_is_downscaled_by_width() {
    let frame = DynamicImage::ImageRgb8(RgbImage::new(2048, 1024));
    let data_url = encode_frame(&frame, MAX_FRAME_WIDTH, FRAME_JPEG_QUALITY).unwrap();
    let inline = decode_data_url(&data_url).unwrap();
    assert_eq!(inline.mime_type, "image/jpeg");

    let bytes = BASE64_STANDARD.decode(inline.data).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1024, 512));
  }

  #[test]
  fn small_frame_keeps_its_size() {
    let frame = DynamicImage::ImageRgb8(RgbImage::new(320, 200));
    let data_url = encode_frame(&frame, MAX_FRAME_WIDTH, FRAME_JPEG_QUALITY).unwrap();
    let bytes = BASE64_STANDARD
      .decode(decode_data_url(&data_url).unwrap().data)
      .unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 200));
  }

  #[test]
  fn empty_frame_is_an_error() {
    let frame = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    assert!(matches!(
      encode_frame(&frame, MAX_FRAME_WIDTH, FRAME_JPEG_QUALITY),
      Err(CodecError::EmptyFrame)
    ));
  }

  #[test]
  fn image_file_becomes_data_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target.png");
    RgbImage::new(4, 4).save(&path).unwrap();

    let data_url = image_file_to_data_url(&path).unwrap();
    assert!(data_url.starts_with("data:image/png;base64,"));
    assert!(decode_data_url(&data_url).is_some());
  }
}
