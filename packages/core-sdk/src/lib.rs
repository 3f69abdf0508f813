pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod models;
pub mod persona;
pub mod relay;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::client::RelayClient;
    pub use crate::config::{ProviderConfig, ProviderPreset};
    pub use crate::conversation::Conversation;
    pub use crate::error::RelayError;
    pub use crate::models::{ChatReply, ErrorBody, Message, Role};
    pub use crate::relay::Relay;
    pub use crate::{server, telemetry};
}
