// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/monitor.rs - 监视循环与状态机
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

//! 监视器在 `Idle`、`Monitoring`、`Paused` 三个状态间切换。
//!
//! 处于 `Monitoring` 且有画面来源和目标图像时，定时器立即检查一次，
//! 之后按间隔周期检查。同一时刻最多只有一个检测请求在途，
//! 忙碌时到来的检查直接丢弃，不排队。每次检查都会领取一个递增的令牌，
//! 暂停或停止会作废在途令牌，过期的结果被静默丢弃。

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use image::DynamicImage;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
  codec::{CodecError, FRAME_JPEG_QUALITY, MAX_FRAME_WIDTH, encode_frame},
  credential::CredentialRotator,
  input::{FrameSource, InputError},
  log::{LogBook, LogEntry, LogKind},
  model::{BoundingBox, Detect, DetectionResult},
  output::{Alarm, Render},
  settings::{Settings, SettingsStore, clamp_interval, clamp_threshold},
  target::{TargetImage, TargetList},
};

/// 画面来源可用性的检查间隔
const SOURCE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
  Idle,
  Monitoring,
  Paused,
}

impl fmt::Display for MonitorStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MonitorStatus::Idle => "空闲",
      MonitorStatus::Monitoring => "监视中",
      MonitorStatus::Paused => "已暂停",
    };
    f.write_str(name)
  }
}

/// 进入监视状态的前置条件
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
  #[error("请先配置 API 密钥")]
  MissingApiKey,
  #[error("请先开始屏幕共享")]
  NoCapture,
  #[error("请至少添加一张目标图像")]
  NoTargets,
}

#[derive(Error, Debug)]
enum TickError {
  #[error("{0}")]
  Input(#[from] InputError),
  #[error("{0}")]
  Codec(#[from] CodecError),
  #[error("后台任务失败: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// 单次检查的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
  NotMonitoring,
  /// 上一次检查仍在进行
  Busy,
  /// 画面尚未就绪或已结束
  NotReady,
  Hit(DetectionResult),
  Miss(DetectionResult),
  /// 结果返回时监视已暂停或停止
  Stale,
  Failed,
}

struct Timer {
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

impl Timer {
  fn stop(self) {
    self.cancel.cancel();
    self.handle.abort();
  }
}

struct State {
  status: MonitorStatus,
  settings: Settings,
  targets: TargetList,
  source: Option<Arc<dyn FrameSource>>,
  timer: Option<Timer>,
  source_watch: Option<CancellationToken>,
}

impl State {
  fn check_ready(&self) -> Result<(), MonitorError> {
    if CredentialRotator::with_config(&self.settings.api_key).is_empty() {
      return Err(MonitorError::MissingApiKey);
    }
    if self.source.is_none() {
      return Err(MonitorError::NoCapture);
    }
    if self.targets.is_empty() {
      return Err(MonitorError::NoTargets);
    }
    Ok(())
  }

  fn stop_timer(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.stop();
      debug!("定时器已取消");
    }
  }
}

struct Inner<D, R, A> {
  detector: D,
  render: R,
  alarm: A,
  store: Option<SettingsStore>,
  state: Mutex<State>,
  logs: Mutex<LogBook>,
  busy: AtomicBool,
  latest: AtomicU64,
}

/// 检查结束时（包括提前返回）清除忙碌标记
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct MonitorBuilder<D, R, A> {
  detector: D,
  render: R,
  alarm: A,
  settings: Settings,
  store: Option<SettingsStore>,
  log_capacity: Option<usize>,
}

impl<D: Detect, R: Render, A: Alarm> MonitorBuilder<D, R, A> {
  pub fn settings(mut self, settings: Settings) -> Self {
    self.settings = settings.normalized();
    self
  }

  /// 设置变化时写回该存储
  pub fn store(mut self, store: SettingsStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn log_capacity(mut self, capacity: usize) -> Self {
    self.log_capacity = Some(capacity);
    self
  }

  pub fn build(self) -> Monitor<D, R, A> {
    let logs = match self.log_capacity {
      Some(capacity) => LogBook::with_capacity(capacity),
      None => LogBook::default(),
    };

    Monitor {
      inner: Arc::new(Inner {
        detector: self.detector,
        render: self.render,
        alarm: self.alarm,
        store: self.store,
        state: Mutex::new(State {
          status: MonitorStatus::Idle,
          settings: self.settings,
          targets: TargetList::new(),
          source: None,
          timer: None,
          source_watch: None,
        }),
        logs: Mutex::new(logs),
        busy: AtomicBool::new(false),
        latest: AtomicU64::new(0),
      }),
    }
  }
}

/// 监视器句柄，可廉价克隆。
///
/// 会启动定时器或监听画面来源的方法需要在 tokio 运行时内调用。
pub struct Monitor<D, R, A> {
  inner: Arc<Inner<D, R, A>>,
}

impl<D, R, A> Clone for Monitor<D, R, A> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<D: Detect, R: Render, A: Alarm> Monitor<D, R, A> {
  pub fn builder(detector: D, render: R, alarm: A) -> MonitorBuilder<D, R, A> {
    MonitorBuilder {
      detector,
      render,
      alarm,
      settings: Settings::default(),
      store: None,
      log_capacity: None,
    }
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn log(&self, kind: LogKind, message: impl Into<String>, confidence: Option<f32>) {
    self
      .inner
      .logs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(kind, message, confidence);
  }

  /// 作废所有在途检查的令牌
  fn invalidate(&self) {
    self.inner.latest.fetch_add(1, Ordering::AcqRel);
  }

  fn persist(&self, settings: &Settings) {
    if let Some(store) = &self.inner.store
      && let Err(e) = store.save(settings)
    {
      self.log(LogKind::Error, format!("保存配置失败: {}", e), None);
    }
  }

  /// 按当前状态重建定时器；只有监视中且条件齐备时才会真正启动
  fn restart_timer(&self, state: &mut State) {
    state.stop_timer();

    if state.status != MonitorStatus::Monitoring
      || state.source.is_none()
      || state.targets.is_empty()
    {
      return;
    }

    let interval = state.settings.interval();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_timer(
      Arc::downgrade(&self.inner),
      interval,
      cancel.clone(),
    ));
    debug!("定时器已启动, 间隔 {:?}", interval);
    state.timer = Some(Timer { cancel, handle });
  }

  /// 接入新的画面来源（替换并释放旧来源），状态保持不变
  pub fn start_capture(&self, source: Arc<dyn FrameSource>) {
    let mut state = self.state();

    if let Some(watch) = state.source_watch.take() {
      watch.cancel();
    }
    if let Some(old) = state.source.take() {
      old.release();
    }

    let description = source.describe();
    let watch = CancellationToken::new();
    tokio::spawn(watch_source(
      Arc::downgrade(&self.inner),
      source.clone(),
      watch.clone(),
    ));
    state.source_watch = Some(watch);
    state.source = Some(source);
    self.restart_timer(&mut state);
    drop(state);

    self.log(LogKind::Info, format!("已开始共享: {}", description), None);
  }

  /// 监视中 → 暂停；空闲或暂停 → 监视中（需满足前置条件）
  pub fn toggle(&self) -> Result<MonitorStatus, MonitorError> {
    let mut state = self.state();

    match state.status {
      MonitorStatus::Monitoring => {
        state.status = MonitorStatus::Paused;
        self.invalidate();
        state.stop_timer();
        drop(state);
        self.log(LogKind::Info, "监视已暂停", None);
        Ok(MonitorStatus::Paused)
      }
      MonitorStatus::Idle | MonitorStatus::Paused => {
        if let Err(e) = state.check_ready() {
          drop(state);
          self.log(LogKind::Warning, e.to_string(), None);
          return Err(e);
        }
        state.status = MonitorStatus::Monitoring;
        self.restart_timer(&mut state);
        let (interval, targets) = (state.settings.interval(), state.targets.len());
        drop(state);
        self.log(
          LogKind::Info,
          format!("开始监视 {} 张目标图像, 间隔 {:?}", targets, interval),
          None,
        );
        Ok(MonitorStatus::Monitoring)
      }
    }
  }

  /// 停止监视：取消定时器，释放画面来源，清除叠加层，回到空闲
  pub fn stop(&self) {
    let mut state = self.state();
    self.invalidate();
    state.stop_timer();
    if let Some(watch) = state.source_watch.take() {
      watch.cancel();
    }
    let released = state.source.take().inspect(|source| source.release()).is_some();
    self.inner.render.clear();
    let was = std::mem::replace(&mut state.status, MonitorStatus::Idle);
    drop(state);

    if released || was != MonitorStatus::Idle {
      self.log(LogKind::Info, "监视已停止", None);
    }
  }

  fn handle_source_ended(&self) {
    self.log(LogKind::Warning, "屏幕共享已结束", None);
    self.stop();
  }

  pub fn add_target(&self, name: impl Into<String>, data_url: impl Into<String>) -> String {
    let mut state = self.state();
    let id = state.targets.add(name, data_url);
    self.restart_timer(&mut state);
    id
  }

  pub fn add_target_file(&self, path: impl AsRef<Path>) -> Result<String, CodecError> {
    let path = path.as_ref();
    let mut state = self.state();
    match state.targets.add_file(path) {
      Ok(id) => {
        self.restart_timer(&mut state);
        Ok(id)
      }
      Err(e) => {
        drop(state);
        self.log(
          LogKind::Error,
          format!("读取目标图像 {} 失败: {}", path.display(), e),
          None,
        );
        Err(e)
      }
    }
  }

  pub fn remove_target(&self, id: &str) -> bool {
    let mut state = self.state();
    let removed = state.targets.remove(id);
    if removed {
      self.restart_timer(&mut state);
    }
    removed
  }

  /// 修改检查间隔（限制在 1–10 秒），监视中会立即按新间隔重建定时器
  pub fn set_interval(&self, interval: Duration) {
    let mut state = self.state();
    state.settings.check_interval =
      clamp_interval(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
    self.restart_timer(&mut state);
    let settings = state.settings.clone();
    drop(state);
    self.persist(&settings);
  }

  pub fn set_threshold(&self, threshold: f32) {
    self.update_settings(|settings| settings.confidence_threshold = clamp_threshold(threshold));
  }

  pub fn set_sound_enabled(&self, enabled: bool) {
    self.update_settings(|settings| settings.sound_enabled = enabled);
  }

  pub fn set_api_key(&self, api_key: impl Into<String>) {
    let api_key = api_key.into();
    self.update_settings(|settings| settings.api_key = api_key);
  }

  fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
    let settings = {
      let mut state = self.state();
      update(&mut state.settings);
      state.settings.clone()
    };
    self.persist(&settings);
  }

  pub fn status(&self) -> MonitorStatus {
    self.state().status
  }

  pub fn settings(&self) -> Settings {
    self.state().settings.clone()
  }

  pub fn targets(&self) -> Vec<TargetImage> {
    self.state().targets.iter().cloned().collect()
  }

  pub fn has_capture(&self) -> bool {
    self.state().source.is_some()
  }

  pub fn is_busy(&self) -> bool {
    self.inner.busy.load(Ordering::Acquire)
  }

  pub fn overlay(&self) -> Option<BoundingBox> {
    self.inner.render.current()
  }

  pub fn logs(&self) -> Vec<LogEntry> {
    self
      .inner
      .logs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entries()
      .cloned()
      .collect()
  }

  /// 一次定时检查：截取画面、调用检测、根据结果提醒或清除叠加层
  pub async fn check_frame(&self) -> TickOutcome {
    // 状态检查、忙碌标记与令牌在同一把锁内完成，与 stop/toggle 互斥
    let (source, targets, api_key, token) = {
      let state = self.state();
      if state.status != MonitorStatus::Monitoring {
        return TickOutcome::NotMonitoring;
      }
      let Some(source) = state.source.clone() else {
        return TickOutcome::NotReady;
      };
      if state.targets.is_empty() {
        return TickOutcome::NotReady;
      }
      if self
        .inner
        .busy
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
      {
        debug!("上一次检查尚未完成, 跳过");
        return TickOutcome::Busy;
      }
      let token = self.inner.latest.fetch_add(1, Ordering::AcqRel) + 1;
      (
        source,
        state.targets.data_urls(),
        state.settings.api_key.clone(),
        token,
      )
    };
    let _busy = BusyGuard(&self.inner.busy);

    let captured = match capture(source).await {
      Ok(Some(captured)) => captured,
      Ok(None) => return TickOutcome::NotReady,
      Err(e) => {
        self.log(LogKind::Error, format!("检查画面失败: {}", e), None);
        return TickOutcome::Failed;
      }
    };
    let (frame, screen) = captured;

    let now = Instant::now();
    let result = self
      .inner
      .detector
      .detect(&api_key, &targets, &screen)
      .await;
    debug!("检测耗时: {:.2?}", now.elapsed());

    self.apply(token, frame, result).await
  }

  fn is_current(&self, state: &State, token: u64) -> bool {
    state.status == MonitorStatus::Monitoring
      && self.inner.latest.load(Ordering::Acquire) == token
  }

  async fn apply(&self, token: u64, frame: DynamicImage, result: DetectionResult) -> TickOutcome {
    {
      let state = self.state();
      if !self.is_current(&state, token) {
        debug!("丢弃过期的检测结果 (令牌 {})", token);
        return TickOutcome::Stale;
      }
      if !result.is_hit(state.settings.confidence_threshold) {
        self.inner.render.clear();
        debug!(
          "未命中: detected={}, confidence={:.2}",
          result.detected, result.confidence
        );
        return TickOutcome::Miss(result);
      }
    }

    // 绘制可能涉及整帧编码与写盘，不持锁、不占用异步线程
    let inner = self.inner.clone();
    let rendered =
      tokio::task::spawn_blocking(move || inner.render.render_result(&frame, &result)).await;

    let state = self.state();
    if !self.is_current(&state, token) {
      self.inner.render.clear();
      debug!("绘制期间监视已暂停或停止, 撤销叠加层 (令牌 {})", token);
      return TickOutcome::Stale;
    }
    if state.settings.sound_enabled {
      self.inner.alarm.ring();
    }
    drop(state);

    self.log(LogKind::Success, "检测到目标图像", Some(result.confidence));
    match rendered {
      Ok(Ok(())) => {}
      Ok(Err(e)) => self.log(LogKind::Error, format!("绘制叠加层失败: {}", e), None),
      Err(e) => self.log(LogKind::Error, format!("绘制任务失败: {}", e), None),
    }
    TickOutcome::Hit(result)
  }
}

/// 在阻塞线程上截图并压缩
async fn capture(
  source: Arc<dyn FrameSource>,
) -> Result<Option<(DynamicImage, String)>, TickError> {
  let captured = tokio::task::spawn_blocking(move || -> Result<_, TickError> {
    let Some(frame) = source.grab()? else {
      return Ok(None);
    };
    if frame.width() == 0 || frame.height() == 0 {
      return Ok(None);
    }
    let screen = encode_frame(&frame, MAX_FRAME_WIDTH, FRAME_JPEG_QUALITY)?;
    Ok(Some((frame, screen)))
  })
  .await??;
  Ok(captured)
}

async fn run_timer<D: Detect, R: Render, A: Alarm>(
  inner: Weak<Inner<D, R, A>>,
  interval: Duration,
  cancel: CancellationToken,
) {
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {
        let Some(inner) = inner.upgrade() else {
          break;
        };
        let monitor = Monitor { inner };
        tokio::spawn(async move {
          monitor.check_frame().await;
        });
      }
    }
  }
}

async fn watch_source<D: Detect, R: Render, A: Alarm>(
  inner: Weak<Inner<D, R, A>>,
  source: Arc<dyn FrameSource>,
  watch: CancellationToken,
) {
  let ended = source.ended();
  let mut ticker = tokio::time::interval(SOURCE_POLL_INTERVAL);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      biased;
      _ = watch.cancelled() => break,
      _ = ended.cancelled() => {
        if let Some(inner) = inner.upgrade() {
          info!("画面来源已结束");
          Monitor { inner }.handle_source_ended();
        }
        break;
      }
      // 空闲或暂停时不会截图，定期确认来源仍然可用
      _ = ticker.tick() => {
        let source = source.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || source.poll()).await {
          debug!("来源检查任务失败: {}", e);
        }
      }
    }
  }
}
