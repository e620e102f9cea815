use std::time::Duration;

use serde::Deserialize;

use crate::message::SUBSCRIPTION_MARKER;

/// Default bound on channel negotiation.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration for a [`Correlator`](crate::Correlator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatorConfig {
    /// Per-request timeout. `None` disables request timeouts.
    pub request_timeout: Option<Duration>,
    /// Bound on waiting for a provider to accept the discovery request.
    pub handshake_timeout: Duration,
    /// Method-name substring identifying unsolicited notifications.
    pub notification_marker: String,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            notification_marker: SUBSCRIPTION_MARKER.to_string(),
        }
    }
}

impl CorrelatorConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Loosely typed construction options, in milliseconds.
///
/// `timeout` is a shared fallback: it applies to whichever of the two
/// specific timeouts is absent. Zero counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CorrelatorOptions {
    pub request_timeout: Option<u64>,
    pub handshake_timeout: Option<u64>,
    pub timeout: Option<u64>,
}

impl CorrelatorOptions {
    /// Parse options from a JSON object.
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }
}

impl From<CorrelatorOptions> for CorrelatorConfig {
    fn from(options: CorrelatorOptions) -> Self {
        let non_zero = |ms: Option<u64>| ms.filter(|ms| *ms > 0);
        let fallback = non_zero(options.timeout);

        let request_timeout = non_zero(options.request_timeout)
            .or(fallback)
            .map(Duration::from_millis);
        let handshake_timeout = non_zero(options.handshake_timeout)
            .or(fallback)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT);

        Self {
            request_timeout,
            handshake_timeout,
            ..Self::default()
        }
    }
}
