// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/credential.rs - API 密钥轮换
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

use tracing::debug;

/// 以逗号分隔的密钥池，按顺序轮流发放。
///
/// 原始配置字符串变化时才重新切分，并把游标归零。
#[derive(Debug, Default, Clone)]
pub struct CredentialRotator {
  raw: String,
  pool: Vec<String>,
  index: usize,
}

impl CredentialRotator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(raw: &str) -> Self {
    let mut rotator = Self::new();
    rotator.refresh(raw);
    rotator
  }

  fn refresh(&mut self, raw: &str) {
    self.pool = raw
      .split(',')
      .map(str::trim)
      .filter(|token| !token.is_empty())
      .map(String::from)
      .collect();
    self.raw = raw.to_string();
    self.index = 0;
    debug!("密钥池已重建, 共 {} 个密钥", self.pool.len());
  }

  /// 取出当前密钥并前移游标。
  pub fn next_credential(&mut self, raw: &str) -> Option<String> {
    if raw.is_empty() {
      return None;
    }

    if raw != self.raw {
      self.refresh(raw);
    }

    if self.pool.is_empty() {
      return None;
    }

    let credential = self.pool[self.index].clone();
    self.index = (self.index + 1) % self.pool.len();
    Some(credential)
  }

  pub fn len(&self) -> usize {
    self.pool.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pool.is_empty()
  }
}
