use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use crate::{config::ProviderConfig, error::RelayError, models::Message};

pub const MAX_TOKENS: u32 = 1000;
pub const TEMPERATURE: f64 = 0.7;

/**
 * \brief OpenAI 兼容的 chat/completions 请求体。
 */
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub max_tokens: u32,
    pub temperature: f64,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(model: &'a str, messages: &'a [Message]) -> Self {
        Self {
            model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

/**
 * \brief 按配置构建共享的 HTTP 客户端。未配置超时则沿用 reqwest 默认值。
 */
pub fn build_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.upstream_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/**
 * \brief 单次非流式调用，返回助手回复。不重试。
 *
 * 非 2xx：返回 `RelayError::Upstream`，携带上游状态码与原始响应体供服务端日志使用。
 * 2xx 但缺少 `choices[0].message.content`：返回 `RelayError::NoReply`。
 */
pub async fn chat_once(
    client: &reqwest::Client,
    config: &ProviderConfig,
    api_key: &str,
    request: &CompletionRequest<'_>,
) -> std::result::Result<String, RelayError> {
    let resp = client
        .post(config.chat_completions_url())
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", api_key))
        .json(request)
        .send()
        .await
        .context("upstream request failed")?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(RelayError::Upstream { status, body });
    }

    let v: Value = resp.json().await.context("decode upstream response failed")?;
    extract_openai_content(&v).ok_or(RelayError::NoReply)
}

/**
 * \brief 取出 `choices[0].message.content`；缺失、非字符串或空串均视为无回复。
 */
pub fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
