//! LLM 调用错误与网络错误分类
//!
//! 传输层的临时故障（DNS 超时、拨号超时、连接被拒、主机不存在、连接重置、管道断开、超时）
//! 归为可重试；鉴权失败、请求非法、服务端业务错误等一律视为致命，交给候选模型回退处理。

use std::fmt;

use thiserror::Error;

use crate::core::retry::Retryable;

/// 传输层故障的细分类型（全部可重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    DnsTimeout,
    DialTimeout,
    ConnectionRefused,
    HostNotFound,
    ConnectionReset,
    BrokenPipe,
    TimedOut,
    /// 传输层明确标记为临时性的其他错误
    Temporary,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::DnsTimeout => "dns timeout",
            TransportErrorKind::DialTimeout => "dial timeout",
            TransportErrorKind::ConnectionRefused => "connection refused",
            TransportErrorKind::HostNotFound => "host not found",
            TransportErrorKind::ConnectionReset => "connection reset",
            TransportErrorKind::BrokenPipe => "broken pipe",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::Temporary => "temporary",
        };
        f.write_str(s)
    }
}

/// 模型提供方返回的错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    InvalidResponse(String),

    #[error("no provider for model '{0}'")]
    UnknownModel(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        LlmError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// 该错误对应的传输层类型；非传输错误时从错误文本推断
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            LlmError::Transport { kind, .. } => Some(*kind),
            LlmError::Timeout(_) => Some(TransportErrorKind::TimedOut),
            LlmError::Other(msg) => classify_message(msg),
            _ => None,
        }
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        self.transport_kind().is_some()
    }
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        io_kind(self.kind()).is_some() || classify_message(&self.to_string()).is_some()
    }
}

fn io_kind(kind: std::io::ErrorKind) -> Option<TransportErrorKind> {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::ConnectionRefused => Some(TransportErrorKind::ConnectionRefused),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            Some(TransportErrorKind::ConnectionReset)
        }
        ErrorKind::BrokenPipe => Some(TransportErrorKind::BrokenPipe),
        ErrorKind::TimedOut => Some(TransportErrorKind::TimedOut),
        _ => None,
    }
}

/// 按错误文本识别网络故障（用于只拿得到字符串的场景）
pub fn classify_message(message: &str) -> Option<TransportErrorKind> {
    let msg = message.to_lowercase();

    if msg.contains("i/o timeout") {
        if msg.contains("lookup") {
            return Some(TransportErrorKind::DnsTimeout);
        }
        if msg.contains("dial tcp") {
            return Some(TransportErrorKind::DialTimeout);
        }
    }
    if msg.contains("connection timed out") {
        return Some(TransportErrorKind::TimedOut);
    }
    if msg.contains("connection refused") {
        return Some(TransportErrorKind::ConnectionRefused);
    }
    if msg.contains("no such host")
        || msg.contains("failed to lookup address")
        || msg.contains("dns error")
    {
        return Some(TransportErrorKind::HostNotFound);
    }
    if msg.contains("connection reset") {
        return Some(TransportErrorKind::ConnectionReset);
    }
    if msg.contains("broken pipe") {
        return Some(TransportErrorKind::BrokenPipe);
    }
    None
}

/// 拼接整条 source 链，便于日志与文本分类
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

fn io_kind_in_chain(err: &(dyn std::error::Error + 'static)) -> Option<TransportErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(kind) = io_kind(io.kind()) {
                return Some(kind);
            }
        }
        current = e.source();
    }
    None
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let detail = error_chain(&err);

        if err.is_timeout() {
            if err.is_connect() {
                let kind = match classify_message(&detail) {
                    Some(TransportErrorKind::HostNotFound) => TransportErrorKind::DnsTimeout,
                    _ => TransportErrorKind::DialTimeout,
                };
                return LlmError::transport(kind, detail);
            }
            return LlmError::Timeout(detail);
        }

        if let Some(kind) = io_kind_in_chain(&err).or_else(|| classify_message(&detail)) {
            return LlmError::transport(kind, detail);
        }

        if err.is_connect() {
            return LlmError::transport(TransportErrorKind::Temporary, detail);
        }
        if err.is_decode() {
            return LlmError::InvalidResponse(detail);
        }
        LlmError::Other(detail)
    }
}

/// 给用户看的网络错误说明（DNS / 拨号超时给出排查提示，其余原样返回）
pub fn describe_network_error(err: &LlmError) -> String {
    let text = err.to_string();
    match err.transport_kind() {
        Some(TransportErrorKind::DnsTimeout) => match lookup_host(&text) {
            Some(host) => format!(
                "DNS resolution timeout for {host}. Check your network/DNS settings."
            ),
            None => "DNS resolution timeout. Check your network/DNS settings.".to_string(),
        },
        Some(TransportErrorKind::DialTimeout) => {
            "Connection timeout. The server may be unreachable or your network is down."
                .to_string()
        }
        _ => text,
    }
}

fn lookup_host(text: &str) -> Option<&str> {
    let (_, rest) = text.split_once("lookup ")?;
    let host = rest
        .split(|c: char| c == ':' || c.is_whitespace())
        .next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_go_style_messages() {
        assert_eq!(
            classify_message("dial tcp: lookup api.example.com: i/o timeout"),
            Some(TransportErrorKind::DnsTimeout)
        );
        assert_eq!(
            classify_message("dial tcp 10.0.0.1:443: i/o timeout"),
            Some(TransportErrorKind::DialTimeout)
        );
        assert_eq!(
            classify_message("dial tcp: Connection refused"),
            Some(TransportErrorKind::ConnectionRefused)
        );
        assert_eq!(
            classify_message("lookup nowhere.invalid: no such host"),
            Some(TransportErrorKind::HostNotFound)
        );
        assert_eq!(classify_message("401 unauthorized"), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::transport(TransportErrorKind::ConnectionReset, "reset").is_retryable());
        assert!(LlmError::Timeout("slow".into()).is_retryable());
        assert!(LlmError::Other("write: broken pipe".into()).is_retryable());
        assert!(!LlmError::Auth("bad key".into()).is_retryable());
        assert!(!LlmError::InvalidRequest("bad schema".into()).is_retryable());
        assert!(!LlmError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_io_error_classification() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        assert!(err.is_retryable());
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_describe_dns_timeout() {
        let err = LlmError::transport(
            TransportErrorKind::DnsTimeout,
            "dial tcp: lookup api.example.com: i/o timeout",
        );
        assert_eq!(
            describe_network_error(&err),
            "DNS resolution timeout for api.example.com. Check your network/DNS settings."
        );

        let err = LlmError::transport(TransportErrorKind::DialTimeout, "dial tcp: i/o timeout");
        assert!(describe_network_error(&err).starts_with("Connection timeout"));

        let err = LlmError::Auth("bad key".into());
        assert_eq!(describe_network_error(&err), "authentication failed: bad key");
    }
}
