// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/settings.rs - 持久化配置
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

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 3000;
pub const MIN_CHECK_INTERVAL_MS: u64 = 1000;
pub const MAX_CHECK_INTERVAL_MS: u64 = 10000;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

const SETTINGS_DIR: &str = "shaobing";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
  /// 逗号分隔的 API 密钥
  pub api_key: String,
  /// 检查间隔（毫秒）
  pub check_interval: u64,
  pub confidence_threshold: f32,
  pub sound_enabled: bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      check_interval: DEFAULT_CHECK_INTERVAL_MS,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      sound_enabled: true,
    }
  }
}

impl Settings {
  pub fn interval(&self) -> Duration {
    Duration::from_millis(clamp_interval(self.check_interval))
  }

  /// 把越界取值拉回合法范围
  pub fn normalized(mut self) -> Self {
    self.check_interval = clamp_interval(self.check_interval);
    self.confidence_threshold = clamp_threshold(self.confidence_threshold);
    self
  }
}

pub fn clamp_interval(ms: u64) -> u64 {
  ms.clamp(MIN_CHECK_INTERVAL_MS, MAX_CHECK_INTERVAL_MS)
}

pub fn clamp_threshold(threshold: f32) -> f32 {
  if threshold.is_nan() {
    DEFAULT_CONFIDENCE_THRESHOLD
  } else {
    threshold.clamp(0.0, 1.0)
  }
}

pub fn default_settings_path() -> PathBuf {
  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(SETTINGS_DIR)
    .join(SETTINGS_FILE)
}

/// 绑定到某个文件的配置存储，每次修改都会整体重写
#[derive(Debug, Clone)]
pub struct SettingsStore {
  path: PathBuf,
}

impl SettingsStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 读取配置；文件缺失或损坏时回落到默认值
  pub fn load(&self) -> Settings {
    match self.try_load() {
      Ok(settings) => settings.normalized(),
      Err(SettingsError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!("配置文件不存在, 使用默认配置: {}", self.path.display());
        Settings::default()
      }
      Err(e) => {
        warn!("读取配置失败, 使用默认配置: {}", e);
        Settings::default()
      }
    }
  }

  fn try_load(&self) -> Result<Settings, SettingsError> {
    let content = std::fs::read_to_string(&self.path)?;
    Ok(serde_json::from_str(&content)?)
  }

  pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&self.path, serde_json::to_string_pretty(settings)?)?;
    debug!("配置已写入: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(dir.path().join("none.json"));
    let settings = store.load();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.check_interval, 3000);
    assert_eq!(settings.confidence_threshold, 0.85);
    assert!(settings.sound_enabled);
  }

  #[test]
  fn round_trips_with_camel_case_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
    let settings = Settings {
      api_key: "a,b".to_string(),
      check_interval: 5000,
      confidence_threshold: 0.5,
      sound_enabled: false,
    };
    store.save(&settings).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"apiKey\""));
    assert!(raw.contains("\"checkInterval\""));
    assert_eq!(store.load(), settings);
  }

  #[test]
  fn corrupt_or_partial_files_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    std::fs::write(&path, "{ not json").unwrap();
    assert_eq!(SettingsStore::new(&path).load(), Settings::default());

    std::fs::write(&path, r#"{"checkInterval": 50}"#).unwrap();
    let settings = SettingsStore::new(&path).load();
    assert_eq!(settings.check_interval, MIN_CHECK_INTERVAL_MS);
    assert_eq!(settings.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
  }
}
