// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Shaobing 屏幕哨兵参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 画面来源
  /// 支持格式:
  /// - 屏幕: screen: 或 screen://<显示器序号>
  /// - 图片: image:///path/to/frame.png
  #[arg(long, default_value = "screen:", value_name = "SOURCE")]
  pub input: Url,

  /// 检测模型: gemini://<模型名>?endpoint=<地址>&timeout=<秒>
  #[arg(long, default_value = "gemini://gemini-2.5-flash", value_name = "MODEL")]
  pub model: Url,

  /// 命中输出: overlay: 或 folder:///dir?font=/path/to/font.ttf
  #[arg(long, default_value = "overlay:", value_name = "OUTPUT")]
  pub output: Url,

  /// 目标图像文件，可重复指定
  #[arg(long = "target", value_name = "FILE")]
  pub targets: Vec<PathBuf>,

  /// 配置文件路径
  #[arg(long, value_name = "FILE")]
  pub settings: Option<PathBuf>,

  /// API 密钥，多个密钥用逗号分隔轮换使用
  #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, value_name = "KEY")]
  pub api_key: Option<String>,

  /// 检查间隔（毫秒，1000 - 10000）
  #[arg(long, value_name = "MS")]
  pub interval: Option<u64>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// 关闭命中提示音
  #[arg(long)]
  pub mute: bool,

  /// 命中时执行的提醒命令，缺省为终端响铃
  #[arg(long, value_name = "COMMAND")]
  pub alert_command: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_and_repeated_targets() {
    let args = Args::try_parse_from(["shaobing", "--target", "a.png", "--target", "b.png"]).unwrap();
    assert_eq!(args.input.scheme(), "screen");
    assert_eq!(args.model.host_str(), Some("gemini-2.5-flash"));
    assert_eq!(args.output.scheme(), "overlay");
    assert_eq!(args.targets.len(), 2);
    assert!(!args.mute);
    assert!(args.interval.is_none());
  }
}
