// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input/screen_input.rs - 屏幕捕获输入
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

use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use xcap::Monitor;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
};

/// 捕获某个显示器的画面。
///
/// `screen://` 使用主显示器，`screen://<n>` 使用第 n 个显示器。
pub struct ScreenInput {
  monitor_id: u32,
  name: String,
  released: AtomicBool,
  ended: CancellationToken,
}

impl FromUrlWithScheme for ScreenInput {
  const SCHEME: &'static str = "screen";
}

impl FromUrl for ScreenInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let monitors = Monitor::all().map_err(|e| InputError::CaptureError(e.to_string()))?;
    debug!("发现 {} 个显示器", monitors.len());

    let index = url.host_str().filter(|host| !host.is_empty());
    let monitor = match index {
      Some(index) => {
        let index: usize = index
          .parse()
          .map_err(|_| InputError::MonitorNotFound(index.to_string()))?;
        monitors.into_iter().nth(index)
      }
      None => {
        let mut monitors = monitors;
        let primary = monitors.iter().position(|m| m.is_primary()).unwrap_or(0);
        (primary < monitors.len()).then(|| monitors.swap_remove(primary))
      }
    }
    .ok_or_else(|| InputError::MonitorNotFound(url.to_string()))?;

    info!(
      "开始共享显示器 {} ({}x{})",
      monitor.name(),
      monitor.width(),
      monitor.height()
    );

    Ok(ScreenInput {
      monitor_id: monitor.id(),
      name: monitor.name().to_string(),
      released: AtomicBool::new(false),
      ended: CancellationToken::new(),
    })
  }
}

impl ScreenInput {
  /// 查找仍然连接的显示器；已断开时触发 `ended`
  fn locate(&self) -> Result<Option<Monitor>, InputError> {
    let monitors = Monitor::all().map_err(|e| InputError::CaptureError(e.to_string()))?;
    let monitor = monitors.into_iter().find(|m| m.id() == self.monitor_id);
    if monitor.is_none() && !self.ended.is_cancelled() {
      warn!("显示器 {} 已断开, 结束共享", self.name);
      self.ended.cancel();
    }
    Ok(monitor)
  }
}

impl FrameSource for ScreenInput {
  fn grab(&self) -> Result<Option<DynamicImage>, InputError> {
    if self.released.load(Ordering::Acquire) || self.ended.is_cancelled() {
      return Ok(None);
    }

    let Some(monitor) = self.locate()? else {
      return Ok(None);
    };

    if monitor.width() == 0 || monitor.height() == 0 {
      return Ok(None);
    }

    let image = monitor
      .capture_image()
      .map_err(|e| InputError::CaptureError(e.to_string()))?;
    Ok(Some(DynamicImage::ImageRgba8(image)))
  }

  fn ended(&self) -> CancellationToken {
    self.ended.clone()
  }

  fn release(&self) {
    if !self.released.swap(true, Ordering::AcqRel) {
      info!("停止共享显示器 {}", self.name);
    }
  }

  fn describe(&self) -> String {
    format!("显示器 {}", self.name)
  }

  fn poll(&self) {
    if self.released.load(Ordering::Acquire) || self.ended.is_cancelled() {
      return;
    }
    if let Err(e) = self.locate() {
      debug!("枚举显示器失败: {}", e);
    }
  }
}
