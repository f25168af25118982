use crate::error::Result;
use crate::framer::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// LWCP control port on Axia consoles
pub const DEFAULT_PORT: u16 = 4010;

/// Engine settings
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use lwcp_client::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "call_timeout_ms": 2000 }"#).unwrap();
/// assert_eq!(config.call_timeout().as_millis(), 2000);
/// assert_eq!(config.read_chunk_size, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout used by the console helpers when waiting for a reply
    pub call_timeout_ms: u64,

    /// Bound on establishing the TCP connection
    pub connect_timeout_ms: u64,

    /// Bytes requested per socket read
    pub read_chunk_size: usize,

    /// Buffered bytes allowed before an incomplete message is discarded
    pub max_frame_len: usize,

    /// Sent as `LOGIN <password>` ahead of any other command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            read_chunk_size: 1024,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            password: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
