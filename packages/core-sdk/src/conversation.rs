use crate::models::{Message, Role};

/**
 * \brief 会话存储：仅追加的有序消息列表，不含 system 消息。
 *
 * 每次成功的往返追加一条 user 与一条 assistant 消息；仅在用户显式清空时重置。
 */
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * \brief 追加一轮完整往返。system 消息不会进入会话。
     */
    pub fn push_exchange(&mut self, user: Message, assistant: Message) {
        debug_assert_eq!(user.role, Role::User);
        debug_assert_eq!(assistant.role, Role::Assistant);
        self.messages.push(user);
        self.messages.push(assistant);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /**
     * \brief 清空会话（对应“清除对话”操作）。
     */
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
