use std::fmt;

#[derive(Debug)]
pub enum FlipStreakError {
    InvalidArgument(String),
    NotFound(String),
    Other(String),
    KvStore(String),
    Serialization(String),
    IO(String),
    NotConnected,
    Transport(String),  // 传输层错误（含 HTTP 非预期状态码）
    Timeout(String),
    InvalidData(String), // 远端响应无法解码
    InvalidOperation(String),
    Config(String),
    NotInitialized(String),
}

impl fmt::Display for FlipStreakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlipStreakError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            FlipStreakError::NotFound(e) => write!(f, "Not found: {}", e),
            FlipStreakError::Other(e) => write!(f, "Other error: {}", e),
            FlipStreakError::KvStore(e) => write!(f, "KV store error: {}", e),
            FlipStreakError::Serialization(e) => write!(f, "Serialization error: {}", e),
            FlipStreakError::IO(e) => write!(f, "IO error: {}", e),
            FlipStreakError::NotConnected => write!(f, "Not connected"),
            FlipStreakError::Transport(e) => write!(f, "Transport error: {}", e),
            FlipStreakError::Timeout(e) => write!(f, "Timeout: {}", e),
            FlipStreakError::InvalidData(e) => write!(f, "Invalid data: {}", e),
            FlipStreakError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            FlipStreakError::Config(e) => write!(f, "Config error: {}", e),
            FlipStreakError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
        }
    }
}

impl std::error::Error for FlipStreakError {}

impl From<serde_json::Error> for FlipStreakError {
    fn from(error: serde_json::Error) -> Self {
        FlipStreakError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for FlipStreakError {
    fn from(error: std::io::Error) -> Self {
        FlipStreakError::IO(error.to_string())
    }
}

impl From<sled::Error> for FlipStreakError {
    fn from(error: sled::Error) -> Self {
        FlipStreakError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for FlipStreakError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FlipStreakError::Timeout(error.to_string())
        } else if error.is_decode() {
            FlipStreakError::InvalidData(error.to_string())
        } else if error.is_connect() {
            FlipStreakError::NotConnected
        } else {
            FlipStreakError::Transport(error.to_string())
        }
    }
}

impl From<crate::config::ConfigError> for FlipStreakError {
    fn from(error: crate::config::ConfigError) -> Self {
        FlipStreakError::Config(error.to_string())
    }
}

impl FlipStreakError {
    /// 是否属于「连接类」失败（无网络、超时、协议/解码错误）
    ///
    /// 同步层对这类失败一律降级为 pending，等待下次触发重放。
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            FlipStreakError::NotConnected
                | FlipStreakError::Transport(_)
                | FlipStreakError::Timeout(_)
                | FlipStreakError::InvalidData(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlipStreakError>;
