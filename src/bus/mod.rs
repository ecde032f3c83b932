//! 进程内消息总线
//!
//! 入站：所有渠道共用一个有界 mpsc，编排器是唯一消费者。
//! 出站：每个渠道注册自己的无界接收端，按 channel 分发；没有订阅者的渠道只记日志。

pub mod message;

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub use message::{InboundMessage, OutboundMessage};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BusError {
    #[error("message bus closed")]
    Closed,
}

/// 消息总线
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound: RwLock<HashMap<String, mpsc::UnboundedSender<OutboundMessage>>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound: RwLock::new(HashMap::new()),
        }
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<(), BusError> {
        self.inbound_tx.send(msg).await.map_err(|_| BusError::Closed)
    }

    /// 取下一条入站消息；取消时返回 None
    pub async fn consume_inbound(&self, cancel: &CancellationToken) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }

    /// 注册渠道的出站接收端；重复注册时替换旧的
    pub fn subscribe_outbound(&self, channel: &str) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut outbound = match self.outbound.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outbound.insert(channel.to_string(), tx);
        rx
    }

    /// 投递回复；返回是否有渠道接收
    pub fn publish_outbound(&self, msg: OutboundMessage) -> bool {
        let outbound = match self.outbound.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match outbound.get(&msg.channel) {
            Some(tx) => {
                let channel = msg.channel.clone();
                if tx.send(msg).is_err() {
                    tracing::warn!(channel = %channel, "outbound receiver dropped");
                    return false;
                }
                true
            }
            None => {
                tracing::warn!(channel = %msg.channel, chat_id = %msg.chat_id, "no subscriber for outbound message");
                false
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inbound_round_trip() {
        let bus = MessageBus::new(4);
        let cancel = CancellationToken::new();
        bus.publish_inbound(InboundMessage::new("cli", "u", "1", "hi"))
            .await
            .unwrap();
        let msg = bus.consume_inbound(&cancel).await.unwrap();
        assert_eq!(msg.content, "hi");
    }

    #[tokio::test]
    async fn test_consume_cancelled() {
        let bus = MessageBus::new(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(bus.consume_inbound(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_outbound_routed_by_channel() {
        let bus = MessageBus::default();
        let mut telegram = bus.subscribe_outbound("telegram");
        let mut discord = bus.subscribe_outbound("discord");

        assert!(bus.publish_outbound(OutboundMessage {
            channel: "telegram".into(),
            chat_id: "1".into(),
            content: "to telegram".into(),
        }));
        assert!(!bus.publish_outbound(OutboundMessage {
            channel: "slack".into(),
            chat_id: "1".into(),
            content: "nobody".into(),
        }));

        assert_eq!(telegram.recv().await.unwrap().content, "to telegram");
        assert!(discord.try_recv().is_err());
    }
}
