// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use shaobing::{
  FromUrl,
  credential::CredentialRotator,
  input::{FrameSource, InputWrapper},
  model::{GeminiBuilder, GeminiDetector},
  monitor::Monitor,
  output::{OutputWrapper, SoundAlarm},
  settings::{SettingsStore, default_settings_path},
};

type Sentinel = Monitor<GeminiDetector, OutputWrapper, SoundAlarm>;

const HELP: &str = "可用命令:
  toggle            开始 / 暂停监视
  stop              停止监视并结束共享
  start             重新开始共享画面
  add <file>        添加目标图像
  remove <id>       移除目标图像
  interval <ms>     设置检查间隔
  threshold <v>     设置置信度阈值
  sound on|off      开关提示音
  status            查看当前状态
  logs              查看最近日志
  quit              退出";

fn open_input(url: &Url) -> Result<Arc<dyn FrameSource>> {
  Ok(Arc::new(InputWrapper::from_url(url)?))
}

fn print_status(monitor: &Sentinel) {
  let settings = monitor.settings();
  let keys = CredentialRotator::with_config(&settings.api_key).len();

  println!("状态: {}", monitor.status());
  println!("画面共享: {}", if monitor.has_capture() { "是" } else { "否" });
  println!("API 密钥: {} 个", keys);
  println!("检查间隔: {} ms", settings.check_interval);
  println!("置信度阈值: {:.2}", settings.confidence_threshold);
  println!("提示音: {}", if settings.sound_enabled { "开" } else { "关" });
  println!("目标图像:");
  for target in monitor.targets() {
    println!("  [{}] {}", target.id, target.name);
  }
}

fn handle_command(monitor: &Sentinel, input: &Url, line: &str) -> ControlFlow<()> {
  let mut words = line.split_whitespace();
  let Some(command) = words.next() else {
    return ControlFlow::Continue(());
  };
  let rest = words.collect::<Vec<_>>().join(" ");

  match command {
    "toggle" => {
      if let Ok(status) = monitor.toggle() {
        println!("状态: {}", status);
      }
    }
    "stop" => monitor.stop(),
    "start" => match open_input(input) {
      Ok(source) => monitor.start_capture(source),
      Err(e) => error!("打开画面来源失败: {}", e),
    },
    "add" if !rest.is_empty() => {
      if let Ok(id) = monitor.add_target_file(&rest) {
        println!("已添加目标图像 [{}]", id);
      }
    }
    "remove" if !rest.is_empty() => {
      if !monitor.remove_target(&rest) {
        println!("没有编号为 {} 的目标图像", rest);
      }
    }
    "interval" => match rest.parse::<u64>() {
      Ok(ms) => monitor.set_interval(Duration::from_millis(ms)),
      Err(_) => println!("无效的间隔: {}", rest),
    },
    "threshold" => match rest.parse::<f32>() {
      Ok(threshold) if threshold.is_finite() => monitor.set_threshold(threshold),
      _ => println!("无效的阈值: {}", rest),
    },
    "sound" => match rest.as_str() {
      "on" => monitor.set_sound_enabled(true),
      "off" => monitor.set_sound_enabled(false),
      _ => println!("用法: sound on|off"),
    },
    "status" => print_status(monitor),
    "logs" => {
      for entry in monitor.logs() {
        println!("{}", entry);
      }
    }
    "quit" | "exit" => return ControlFlow::Break(()),
    _ => println!("{}", HELP),
  }

  ControlFlow::Continue(())
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  let store = SettingsStore::new(args.settings.clone().unwrap_or_else(default_settings_path));
  info!("配置文件: {}", store.path().display());
  info!("画面来源: {}", args.input);
  info!("检测模型: {}", args.model);
  info!("命中输出: {}", args.output);

  let detector = GeminiBuilder::from_url(&args.model)?.build()?;
  let output = OutputWrapper::from_url(&args.output)?;
  let alarm = match &args.alert_command {
    Some(command) => SoundAlarm::with_command(command),
    None => SoundAlarm::bell(),
  };

  let monitor = Monitor::builder(detector, output, alarm)
    .settings(store.load())
    .store(store)
    .build();

  // 命令行参数覆盖并写回配置
  if let Some(api_key) = args.api_key {
    monitor.set_api_key(api_key);
  }
  if let Some(ms) = args.interval {
    monitor.set_interval(Duration::from_millis(ms));
  }
  if let Some(threshold) = args.threshold {
    monitor.set_threshold(threshold);
  }
  if args.mute {
    monitor.set_sound_enabled(false);
  }

  for path in &args.targets {
    if let Ok(id) = monitor.add_target_file(path) {
      info!("已添加目标图像 [{}]: {}", id, path.display());
    }
  }

  match open_input(&args.input) {
    Ok(source) => monitor.start_capture(source),
    Err(e) => error!("打开画面来源失败: {}", e),
  }
  if let Err(e) = monitor.toggle() {
    warn!("暂未开始监视: {}", e);
  }

  let (interrupt_tx, mut interrupt) = mpsc::unbounded_channel();
  ctrlc::set_handler(move || {
    let _ = interrupt_tx.send(());
  })?;

  // 交互输入使用独立线程阻塞读取
  let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
  std::thread::spawn(move || {
    for line in std::io::stdin().lines() {
      let Ok(line) = line else {
        break;
      };
      if line_tx.send(line).is_err() {
        break;
      }
    }
  });

  println!("{}", HELP);
  let mut stdin_open = true;
  loop {
    tokio::select! {
      _ = interrupt.recv() => {
        info!("收到中断信号");
        break;
      }
      line = lines.recv(), if stdin_open => match line {
        Some(line) => {
          if handle_command(&monitor, &args.input, line.trim()).is_break() {
            break;
          }
        }
        // 标准输入关闭后只响应中断信号
        None => stdin_open = false,
      },
    }
  }

  monitor.stop();
  info!("已退出");
  Ok(())
}
