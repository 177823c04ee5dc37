// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/target.rs - 目标图像列表
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

use chrono::Utc;
use tracing::info;

use crate::codec::{CodecError, image_file_to_data_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetImage {
  pub id: String,
  pub name: String,
  pub data_url: String,
}

/// 按上传顺序保存的目标图像
#[derive(Debug, Default, Clone)]
pub struct TargetList {
  items: Vec<TargetImage>,
  seq: u32,
}

impl TargetList {
  pub fn new() -> Self {
    Self::default()
  }

  fn next_id(&mut self) -> String {
    self.seq = self.seq.wrapping_add(1);
    format!("{}-{:04X}", Utc::now().timestamp_millis(), self.seq)
  }

  pub fn add(&mut self, name: impl Into<String>, data_url: impl Into<String>) -> String {
    let id = self.next_id();
    let name = name.into();
    info!("添加目标图像 {} ({})", name, id);
    self.items.push(TargetImage {
      id: id.clone(),
      name,
      data_url: data_url.into(),
    });
    id
  }

  pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<String, CodecError> {
    let path = path.as_ref();
    let data_url = image_file_to_data_url(path)?;
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());
    Ok(self.add(name, data_url))
  }

  pub fn remove(&mut self, id: &str) -> bool {
    let before = self.items.len();
    self.items.retain(|item| item.id != id);
    before != self.items.len()
  }

  pub fn data_urls(&self) -> Vec<String> {
    self.items.iter().map(|item| item.data_url.clone()).collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = &TargetImage> {
    self.items.iter()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keeps_upload_order_and_unique_ids() {
    let mut targets = TargetList::new();
    let a = targets.add("a.png", "data:image/png;base64,AAAA");
    let b = targets.add("b.png", "data:image/png;base64,BBBB");
    assert_ne!(a, b);
    assert_eq!(
      targets.data_urls(),
      vec!["data:image/png;base64,AAAA", "data:image/png;base64,BBBB"]
    );

    assert!(targets.remove(&a));
    assert!(!targets.remove(&a));
    assert_eq!(targets.len(), 1);
    assert_eq!(targets.iter().next().unwrap().name, "b.png");
  }

  #[test]
  fn missing_file_is_an_error() {
    let mut targets = TargetList::new();
    assert!(targets.add_file("/nonexistent/target.png").is_err());
    assert!(targets.is_empty());
  }
}
