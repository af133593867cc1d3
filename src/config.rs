use std::time::Duration;

use typed_builder::TypedBuilder;

/// Largest frame a socket accepts unless told otherwise.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Per-socket settings. Every field has a default, so
/// `SocketOptions::builder().raw(true).build()` is a complete configuration.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq)]
pub struct SocketOptions {
    /// Raw sockets leave headers alone and let the application do its own
    /// request tracking.
    #[builder(default)]
    pub raw: bool,
    /// How long a synchronous receive waits before failing with `TimedOut`.
    /// `None` waits forever.
    #[builder(default, setter(strip_option))]
    pub recv_timeout: Option<Duration>,
    /// Upper bound on header plus body, enforced on send and on receive.
    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// A cooked request is sent again if no reply shows up within this
    /// interval.
    #[builder(default = Duration::from_secs(60))]
    pub resend_interval: Duration,
    /// First delay between dial attempts. Doubles on each failure.
    #[builder(default = Duration::from_millis(100))]
    pub reconnect_min: Duration,
    /// Ceiling for the dial backoff.
    #[builder(default = Duration::from_secs(2))]
    pub reconnect_max: Duration,
    #[builder(default, setter(strip_option, into))]
    pub name: Option<String>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
