//! Connector configuration.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use croupier_protocol::SessionContext;
use rand::Rng;
use tracing::warn;
use url::Url;

use crate::CroupierError;

/// Configuration for a connector instance.
///
/// Build one by hand, start from [`Default`], or read the platform's launch
/// query with [`ConnectorConfig::from_launch_params`]. Call
/// [`validated`](Self::validated) before use; the builder does.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    /// Server endpoint, `ws://` or `wss://`.
    pub url: String,

    /// Credentials stamped on every request.
    pub session: SessionContext,

    /// How long a request may stay unanswered before it counts as
    /// timed out. The request is not cancelled.
    pub request_timeout: Duration,

    /// Period of the "still waiting" notice while a request is out.
    pub nag_interval: Duration,

    /// Silence after the last inbound message before the session counts
    /// as expired. Sends are refused from then on.
    pub idle_timeout: Duration,

    /// Never open a socket. Requests are answered by their canned reply,
    /// or by an empty success.
    pub standalone: bool,

    /// Fixed pause between connect attempts.
    pub retry_delay: Duration,

    /// Upper bound of the random pause added to `retry_delay`.
    pub retry_jitter: Duration,

    /// Capacity of the command channel in front of the connector task.
    pub channel_size: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            session: SessionContext::default(),
            request_timeout: Duration::from_secs(15),
            nag_interval: Duration::from_secs(4),
            idle_timeout: Duration::from_secs(599),
            standalone: false,
            retry_delay: Duration::ZERO,
            retry_jitter: Duration::ZERO,
            channel_size: 32,
        }
    }
}

impl ConnectorConfig {
    /// Shortest accepted nag period.
    pub const MIN_NAG_INTERVAL: Duration = Duration::from_millis(100);

    /// Reads the launch query the platform opens the game with.
    ///
    /// Recognised keys:
    ///
    /// - `sessionId`, `sessionToken`: credentials, `"0"` when absent
    /// - `platformUrl`: base64 of the server address, with or without a
    ///   scheme
    /// - `secure=true`: use `wss://` for a scheme-less address
    ///
    /// `query` may be a bare query string (with or without `?`) or a full
    /// page URL. Every other field keeps its default.
    ///
    /// # Errors
    /// [`CroupierError::LaunchParams`] when `platformUrl` is missing, is
    /// not base64, or does not decode to a usable URL.
    pub fn from_launch_params(query: &str) -> Result<Self, CroupierError> {
        let query = match query.split_once('?') {
            Some((_, q)) => q,
            None => query,
        };
        let query = query.split('#').next().unwrap_or_default();

        let mut session = SessionContext::default();
        let mut platform = None;
        let mut secure = false;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "sessionId" => session.session_id = value.into_owned(),
                "sessionToken" => session.session_token = value.into_owned(),
                "platformUrl" => platform = Some(value.into_owned()),
                "secure" => secure = value == "true",
                _ => {}
            }
        }

        let encoded = platform
            .ok_or_else(|| CroupierError::LaunchParams("platformUrl is missing".into()))?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CroupierError::LaunchParams(format!("platformUrl: {e}")))?;
        let address = String::from_utf8(decoded)
            .map_err(|e| CroupierError::LaunchParams(format!("platformUrl: {e}")))?;

        let url = if address.starts_with("ws://") || address.starts_with("wss://") {
            address
        } else if secure {
            format!("wss://{address}")
        } else {
            format!("ws://{address}")
        };
        Url::parse(&url).map_err(|e| CroupierError::LaunchParams(format!("{url}: {e}")))?;

        Ok(Self {
            url,
            session,
            ..Self::default()
        })
    }

    /// Returns a copy with out-of-range values clamped.
    pub fn validated(mut self) -> Self {
        if self.nag_interval < Self::MIN_NAG_INTERVAL {
            warn!(
                nag_ms = self.nag_interval.as_millis() as u64,
                min_ms = Self::MIN_NAG_INTERVAL.as_millis() as u64,
                "nag_interval below minimum — clamping"
            );
            self.nag_interval = Self::MIN_NAG_INTERVAL;
        }
        if self.request_timeout.is_zero() {
            warn!("request_timeout is zero — using the default");
            self.request_timeout = Self::default().request_timeout;
        }
        if self.idle_timeout.is_zero() {
            warn!("idle_timeout is zero — using the default");
            self.idle_timeout = Self::default().idle_timeout;
        }
        self.channel_size = self.channel_size.max(1);
        self
    }

    /// Pause before the next connect attempt: the fixed delay plus a
    /// random share of the jitter.
    pub fn retry_pause(&self) -> Duration {
        let jitter_us = self.retry_jitter.as_micros() as u64;
        if jitter_us == 0 {
            return self.retry_delay;
        }
        let us = rand::rng().random_range(0..=jitter_us);
        self.retry_delay + Duration::from_micros(us)
    }
}
