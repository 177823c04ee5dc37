// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/log.rs - 监视日志
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

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
  Info,
  Success,
  Error,
  Warning,
}

impl fmt::Display for LogKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      LogKind::Info => "信息",
      LogKind::Success => "命中",
      LogKind::Error => "错误",
      LogKind::Warning => "警告",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
  pub id: u64,
  pub timestamp: DateTime<Local>,
  pub message: String,
  pub kind: LogKind,
  pub confidence: Option<f32>,
}

impl fmt::Display for LogEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "[{}] {} {}",
      self.timestamp.format("%H:%M:%S"),
      self.kind,
      self.message
    )?;
    if let Some(confidence) = self.confidence {
      write!(f, " ({:.0}%)", confidence * 100.0)?;
    }
    Ok(())
  }
}

/// 只保留最近若干条记录的日志环
#[derive(Debug)]
pub struct LogBook {
  entries: VecDeque<LogEntry>,
  capacity: usize,
  next_id: u64,
}

impl Default for LogBook {
  fn default() -> Self {
    Self::with_capacity(MAX_LOG_ENTRIES)
  }
}

impl LogBook {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: VecDeque::with_capacity(capacity),
      capacity: capacity.max(1),
      next_id: 1,
    }
  }

  pub fn push(&mut self, kind: LogKind, message: impl Into<String>, confidence: Option<f32>) {
    let message = message.into();
    match kind {
      LogKind::Info | LogKind::Success => info!("{}", message),
      LogKind::Warning => warn!("{}", message),
      LogKind::Error => error!("{}", message),
    }

    if self.entries.len() == self.capacity {
      self.entries.pop_front();
    }
    self.entries.push_back(LogEntry {
      id: self.next_id,
      timestamp: Local::now(),
      message,
      kind,
      confidence,
    });
    self.next_id += 1;
  }

  pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
    self.entries.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keeps_only_the_newest_entries() {
    let mut book = LogBook::with_capacity(3);
    for i in 0..5 {
      book.push(LogKind::Info, format!("entry {}", i), None);
    }
    let messages: Vec<_> = book.entries().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    let ids: Vec<_> = book.entries().map(|e| e.id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
  }

  #[test]
  fn success_carries_confidence() {
    let mut book = LogBook::default();
    book.push(LogKind::Success, "hit", Some(0.9));
    let entry = book.entries().next().unwrap();
    assert_eq!(entry.kind, LogKind::Success);
    assert_eq!(entry.confidence, Some(0.9));
    assert!(entry.to_string().ends_with("(90%)"));
  }
}
