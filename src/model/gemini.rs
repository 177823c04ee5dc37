// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/model/gemini.rs - Gemini 远程视觉检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  codec::{InlineImage, decode_data_url},
  credential::CredentialRotator,
  model::{DetectError, Detect, DetectionResult, parse_detection},
};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_KEY_HEADER: &str = "x-goog-api-key";

const SYSTEM_INSTRUCTION: &str = "You are a strict visual verification system. \
Only report a detection when a target pattern appears on the screen with an exact visual and \
iconographic match. When in doubt, answer that nothing was detected: a missed detection is \
always preferable to a false alarm.";

#[derive(Error, Debug)]
pub enum GeminiBuildError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch {
    expected: &'static str,
    found: String,
  },
  #[error("无效的服务地址: {0}")]
  InvalidEndpoint(String),
  #[error("无效的超时设置: {0}")]
  InvalidTimeout(String),
  #[error("HTTP 客户端初始化失败: {0}")]
  ClientError(#[from] reqwest::Error),
}

pub struct GeminiBuilder {
  model: String,
  endpoint: String,
  timeout: Duration,
}

impl Default for GeminiBuilder {
  fn default() -> Self {
    Self {
      model: DEFAULT_MODEL.to_string(),
      endpoint: DEFAULT_ENDPOINT.to_string(),
      timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
  }
}

impl FromUrlWithScheme for GeminiBuilder {
  const SCHEME: &'static str = "gemini";
}

impl FromUrl for GeminiBuilder {
  type Error = GeminiBuildError;

  /// `gemini://<model>?endpoint=<base-url>&timeout=<secs>`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GeminiBuildError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let mut builder = GeminiBuilder::default();
    if let Some(model) = url.host_str().filter(|host| !host.is_empty()) {
      builder.model = model.to_string();
    }

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "endpoint" => {
          Url::parse(&value).map_err(|_| GeminiBuildError::InvalidEndpoint(value.to_string()))?;
          builder.endpoint = value.to_string();
        }
        "timeout" => {
          let secs = value
            .parse::<u64>()
            .map_err(|_| GeminiBuildError::InvalidTimeout(value.to_string()))?;
          builder.timeout = Duration::from_secs(secs);
        }
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl GeminiBuilder {
  pub fn model(mut self, model: impl Into<String>) -> Self {
    self.model = model.into();
    self
  }

  pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into();
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn build(self) -> Result<GeminiDetector, GeminiBuildError> {
    let client = reqwest::Client::builder().timeout(self.timeout).build()?;
    info!("使用模型 {} @ {}", self.model, self.endpoint);

    Ok(GeminiDetector {
      client,
      url: format!(
        "{}/models/{}:generateContent",
        self.endpoint.trim_end_matches('/'),
        self.model
      ),
      rotator: Mutex::new(CredentialRotator::new()),
    })
  }
}

pub struct GeminiDetector {
  client: reqwest::Client,
  url: String,
  rotator: Mutex<CredentialRotator>,
}

impl GeminiDetector {
  fn next_credential(&self, credentials: &str) -> Option<String> {
    self
      .rotator
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .next_credential(credentials)
  }

  async fn try_detect(
    &self,
    credential: &str,
    targets: &[InlineImage],
    screen: &InlineImage,
  ) -> Result<DetectionResult, DetectError> {
    let body = build_request(targets, screen);

    let response = self
      .client
      .post(&self.url)
      .header(API_KEY_HEADER, credential)
      .json(&body)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(DetectError::Status { status, message });
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
      return Err(DetectError::EmptyBody);
    }
    let reply: GenerateContentResponse = serde_json::from_str(&body)?;
    parse_detection(&reply.text())
  }
}

impl Detect for GeminiDetector {
  async fn detect(&self, credentials: &str, targets: &[String], screen: &str) -> DetectionResult {
    let Some(credential) = self.next_credential(credentials) else {
      error!("未配置 API 密钥, 跳过检测");
      return DetectionResult::none();
    };

    let decoded: Vec<InlineImage> = targets
      .iter()
      .enumerate()
      .filter_map(|(index, target)| {
        let image = decode_data_url(target);
        if image.is_none() {
          warn!("目标图像 #{} 解码失败, 已忽略", index + 1);
        }
        image
      })
      .collect();

    if decoded.is_empty() {
      warn!("没有有效的目标图像");
      return DetectionResult::none();
    }

    let Some(screen) = decode_data_url(screen) else {
      warn!("屏幕帧解码失败");
      return DetectionResult::none();
    };

    let now = Instant::now();
    match self.try_detect(&credential, &decoded, &screen).await {
      Ok(result) => {
        debug!("检测完成，耗时: {:.2?}, 结果: {:?}", now.elapsed(), result);
        result
      }
      Err(DetectError::EmptyBody) => {
        warn!("模型返回空响应");
        DetectionResult::none()
      }
      Err(e) => {
        error!("检测失败: {}", e);
        DetectionResult::none()
      }
    }
  }
}

fn instruction(target_count: usize) -> String {
  format!(
    "The first {target_count} image(s) are target patterns; the last image is a game screen.\n\
     Decide whether any of the target patterns is visible on the game screen.\n\
     Rules:\n\
     1. Only an exact visual and iconographic match counts. Similar shapes, colours or icons are NOT a match.\n\
     2. Reject ambiguous or low-resolution matches. Be conservative: prefer a false negative over a false positive.\n\
     3. If the screen is blurred, degraded, loading or transitioning, report detected = false.\n\
     4. When detected, give the location as a normalized bounding box [ymin, xmin, ymax, xmax] with values between 0 and 1.\n\
     Respond only with JSON of the form {{\"detected\": boolean, \"confidence\": number between 0 and 1, \"box_2d\": [ymin, xmin, ymax, xmax]}}."
  )
}

fn response_schema() -> Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "detected": { "type": "BOOLEAN" },
      "confidence": { "type": "NUMBER" },
      "box_2d": { "type": "ARRAY", "items": { "type": "NUMBER" } }
    },
    "required": ["detected", "confidence"]
  })
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
  system_instruction: Content<'a>,
  contents: Vec<Content<'a>>,
  generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<&'static str>,
  parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum Part<'a> {
  Inline {
    #[serde(rename = "inlineData")]
    inline_data: InlineData<'a>,
  },
  Text {
    text: String,
  },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
  mime_type: &'a str,
  data: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  temperature: f32,
  response_mime_type: &'static str,
  response_schema: Value,
}

impl<'a> From<&'a InlineImage> for Part<'a> {
  fn from(image: &'a InlineImage) -> Self {
    Part::Inline {
      inline_data: InlineData {
        mime_type: &image.mime_type,
        data: &image.data,
      },
    }
  }
}

/// 目标图像按上传顺序在前，屏幕帧其后，最后是文字指令
fn build_request<'a>(
  targets: &'a [InlineImage],
  screen: &'a InlineImage,
) -> GenerateContentRequest<'a> {
  let mut parts: Vec<Part<'a>> = targets.iter().map(Part::from).collect();
  parts.push(Part::from(screen));
  parts.push(Part::Text {
    text: instruction(targets.len()),
  });

  GenerateContentRequest {
    system_instruction: Content {
      role: None,
      parts: vec![Part::Text {
        text: SYSTEM_INSTRUCTION.to_string(),
      }],
    },
    contents: vec![Content {
      role: Some("user"),
      parts,
    }],
    generation_config: GenerationConfig {
      temperature: 0.0,
      response_mime_type: "application/json",
      response_schema: response_schema(),
    },
  }
}

#[derive(Deserialize, Debug, Default)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
  content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
  text: Option<String>,
}

impl GenerateContentResponse {
  fn text(&self) -> String {
    self
      .candidates
      .first()
      .and_then(|candidate| candidate.content.as_ref())
      .map(|content| {
        content
          .parts
          .iter()
          .filter_map(|part| part.text.as_deref())
          .collect::<String>()
      })
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn inline(mime: &str, data: &str) -> InlineImage {
    InlineImage {
      mime_type: mime.to_string(),
      data: data.to_string(),
    }
  }

  #[test]
  fn builder_reads_model_and_query() {
    let url = Url::parse("gemini://gemini-2.0-flash?endpoint=http://127.0.0.1:9000/v1&timeout=5")
      .unwrap();
    let detector = GeminiBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(
      detector.url,
      "http://127.0.0.1:9000/v1/models/gemini-2.0-flash:generateContent"
    );
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("image:///tmp/target.png").unwrap();
    assert!(matches!(
      GeminiBuilder::from_url(&url),
      Err(GeminiBuildError::SchemeMismatch { .. })
    ));
    let url = Url::parse("gemini://m?timeout=soon").unwrap();
    assert!(matches!(
      GeminiBuilder::from_url(&url),
      Err(GeminiBuildError::InvalidTimeout(_))
    ));
  }

  #[test]
  fn request_orders_targets_then_screen_then_text() {
    let targets = vec![inline("image/png", "T1"), inline("image/webp", "T2")];
    let screen = inline("image/jpeg", "SCREEN");
    let body = serde_json::to_value(build_request(&targets, &screen)).unwrap();

    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0]["inlineData"]["data"], "T1");
    assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
    assert_eq!(parts[1]["inlineData"]["data"], "T2");
    assert_eq!(parts[2]["inlineData"]["data"], "SCREEN");
    let text = parts[3]["text"].as_str().unwrap();
    assert!(text.starts_with("The first 2 image(s)"));

    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["generationConfig"]["temperature"], 0.0);
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(
      body["generationConfig"]["responseSchema"]["required"],
      json!(["detected", "confidence"])
    );
    assert!(body["systemInstruction"]["parts"][0]["text"].is_string());
    assert!(body["systemInstruction"].get("role").is_none());
  }

  #[test]
  fn response_text_concatenates_parts() {
    let reply: GenerateContentResponse = serde_json::from_value(json!({
      "candidates": [{ "content": { "parts": [{ "text": "{\"detected\":" }, { "text": " false}" }] } }]
    }))
    .unwrap();
    assert_eq!(reply.text(), "{\"detected\": false}");

    let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
    assert_eq!(empty.text(), "");
  }
}
