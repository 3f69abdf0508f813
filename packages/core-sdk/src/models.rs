use serde::{Deserialize, Serialize};

/**
 * \brief 消息角色，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/**
 * \brief 单条对话消息。创建后不可变，顺序即时间顺序。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user/assistant */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/**
 * \brief 客户端发往 /api/chat 的请求体。
 */
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub text: &'a str,
    pub history: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
}

/**
 * \brief 成功响应：`{ reply }`。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/**
 * \brief 失败响应：`{ error }`，与 HTTP 状态码一同返回。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
