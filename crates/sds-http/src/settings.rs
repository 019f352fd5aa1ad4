use serde::{Deserialize, Serialize};

/// Socket and framing settings of the HTTP client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Write buffer size; also the block size of streamed bodies.
    pub send_buffer_size: usize,
    /// Read buffer size for response heads and bodies.
    pub receive_buffer_size: usize,
    pub connect_timeout_ms: u64,
    /// Default socket timeout when a request carries no deadline. 0 = none.
    pub read_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            send_buffer_size: 8192,
            receive_buffer_size: 8192,
            connect_timeout_ms: 30_000,
            read_timeout_ms: 30_000,
            user_agent: "oio-http".into(),
        }
    }
}
