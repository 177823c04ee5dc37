// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output/sound.rs - 声音提醒
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, error};

use crate::output::Alarm;

/// 终端响铃，或执行用户指定的命令（例如 `aplay alert.wav`）
#[derive(Debug, Default, Clone)]
pub struct SoundAlarm {
  command: Option<Vec<String>>,
}

impl SoundAlarm {
  pub fn bell() -> Self {
    Self::default()
  }

  /// 按空白切分命令行；空命令退化为终端响铃
  pub fn with_command(command: &str) -> Self {
    let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
    Self {
      command: (!parts.is_empty()).then_some(parts),
    }
  }

  pub fn command(&self) -> Option<&[String]> {
    self.command.as_deref()
  }
}

impl Alarm for SoundAlarm {
  fn ring(&self) {
    match &self.command {
      Some(parts) => {
        let (program, args) = (&parts[0], &parts[1..]);
        debug!("执行提醒命令: {:?}", parts);
        match Command::new(program)
          .args(args)
          .stdin(Stdio::null())
          .stdout(Stdio::null())
          .spawn()
        {
          Ok(mut child) => {
            std::thread::spawn(move || {
              if let Err(e) = child.wait() {
                error!("等待提醒命令失败: {}", e);
              }
            });
          }
          Err(e) => error!("提醒命令启动失败: {}", e),
        }
      }
      None => {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_command_line() {
    let alarm = SoundAlarm::with_command("aplay -q /tmp/alert.wav");
    assert_eq!(
      alarm.command().unwrap(),
      &["aplay".to_string(), "-q".to_string(), "/tmp/alert.wav".to_string()]
    );
    assert!(SoundAlarm::with_command("   ").command().is_none());
    assert!(SoundAlarm::bell().command().is_none());
  }
}
