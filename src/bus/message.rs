//! 总线消息信封

use serde::{Deserialize, Serialize};

/// 渠道适配器投递给编排器的一条用户消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// 来源渠道，如 telegram / discord / cli
    pub channel: String,
    pub sender_id: String,
    /// 回复目标（群聊 ID 或私聊 ID）
    pub chat_id: String,
    pub content: String,
    /// 形如 "<channel>:<id>"
    pub session_key: String,
    /// 图片 / 文件等附件的引用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
}

impl InboundMessage {
    /// 以 "<channel>:<chat_id>" 作为会话 key
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        let chat_id = chat_id.into();
        Self {
            session_key: format!("{}:{}", channel, chat_id),
            channel,
            sender_id: sender_id.into(),
            chat_id,
            content: content.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: Vec<String>) -> Self {
        self.media = media;
        self
    }
}

/// 编排器发回渠道的回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

impl OutboundMessage {
    /// 回复给 inbound 的来源
    pub fn reply_to(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        Self {
            channel: inbound.channel.clone(),
            chat_id: inbound.chat_id.clone(),
            content: content.into(),
        }
    }
}
