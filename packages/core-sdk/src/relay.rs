use anyhow::Result;
use axum::http::Method;
use serde_json::Value;

use crate::{
    config::ProviderConfig,
    error::RelayError,
    llm::{self, CompletionRequest},
    models::{ChatReply, Message, Role},
    telemetry,
};

/**
 * \brief 校验后的中继请求。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /** \brief 新的用户输入，非空，不做 trim */
    pub text: String,
    /** \brief 既往会话（不含 system 消息） */
    pub history: Vec<Message>,
    /** \brief 请求指定的模型，可选 */
    pub model: Option<String>,
}

/**
 * \brief 中继端点：持有启动时注入的不可变配置与共享 HTTP 客户端，请求之间无可变状态。
 */
#[derive(Debug)]
pub struct Relay {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl Relay {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = llm::build_client(&config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /**
     * \brief 处理一次请求：方法检查 → 参数校验 → 配置检查 → 组装消息 → 上游调用 → 解析回复。
     *
     * 任一步失败立即终止，不重试。
     */
    pub async fn handle(&self, method: &Method, body: &[u8]) -> Result<ChatReply, RelayError> {
        if *method != Method::POST {
            return Err(RelayError::MethodNotAllowed(method.to_string()));
        }

        let request = parse_request(body)?;

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RelayError::MissingCredential {
                var: self.config.preset.credential_var(),
            })?;

        let messages = assemble_messages(&self.config.system_prompt, &request.history, &request.text);
        let model = self.config.resolve_model(request.model.as_deref());

        telemetry::log_event(
            "relay",
            &format!(
                "provider={} model={} history={} text_len={}",
                self.config.preset,
                model,
                request.history.len(),
                request.text.len()
            ),
        );

        let reply = llm::chat_once(
            &self.client,
            &self.config,
            api_key,
            &CompletionRequest::new(model, &messages),
        )
        .await?;
        Ok(ChatReply { reply })
    }
}

/**
 * \brief 解析请求体。无法解析的 JSON 视为空对象，从而落入 text 校验失败。
 */
pub fn parse_request(body: &[u8]) -> Result<RelayRequest, RelayError> {
    let v: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let text = v
        .get("text")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RelayError::InvalidInput("text is missing, empty or not a string".to_string()))?
        .to_string();

    let history = parse_history(v.get("history"))?;

    let model = v
        .get("model")
        .and_then(|m| m.as_str())
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.to_string());

    Ok(RelayRequest {
        text,
        history,
        model,
    })
}

/**
 * \brief 校验 history：缺省或 null 视为空；否则必须是 user/assistant 消息数组。
 */
fn parse_history(v: Option<&Value>) -> Result<Vec<Message>, RelayError> {
    let items = match v {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(RelayError::InvalidHistory(format!(
                "expected an array, got {}",
                json_kind(other)
            )))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let msg: Message = serde_json::from_value(item.clone())
                .map_err(|e| RelayError::InvalidHistory(format!("entry {}: {}", i, e)))?;
            if msg.role == Role::System {
                return Err(RelayError::InvalidHistory(format!(
                    "entry {}: system messages are not accepted in history",
                    i
                )));
            }
            Ok(msg)
        })
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/**
 * \brief 组装上游消息：`[system] ++ history ++ [user]`，history 保持原顺序。
 */
pub fn assemble_messages(system_prompt: &str, history: &[Message], text: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(Message::user(text));
    messages
}
