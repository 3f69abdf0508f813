use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use crate::{
    conversation::Conversation,
    models::{ChatReply, ChatRequest, Message},
};

/**
 * \brief 中继端点的文本前端客户端，持有本次会话的 Conversation。
 */
#[derive(Debug)]
pub struct RelayClient {
    base_url: String,
    model: Option<String>,
    http: reqwest::Client,
    conversation: Conversation,
}

impl RelayClient {
    /**
     * \brief 创建客户端。
     * \param base_url 中继服务地址，如 "http://127.0.0.1:3000"
     */
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            model: None,
            http: reqwest::Client::builder().build()?,
            conversation: Conversation::new(),
        })
    }

    /** \brief 为后续请求指定模型。 */
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
    }

    /**
     * \brief 发送一条消息。成功后追加 user 与 assistant 消息并返回回复；
     * 失败时会话保持不变，错误信息取自服务端 `{error}`。
     */
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            bail!("message is empty");
        }

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            text,
            history: self.conversation.messages(),
            model: self.model.as_deref(),
        };
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .context("relay request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let v: Value = resp.json().await.unwrap_or(Value::Null);
            let message = v
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            return Err(anyhow!("relay returned {}: {}", status.as_u16(), message));
        }

        let reply: ChatReply = resp.json().await.context("decode relay reply failed")?;
        let reply = reply.reply;
        self.conversation
            .push_exchange(Message::user(text), Message::assistant(reply.clone()));
        Ok(reply)
    }
}
