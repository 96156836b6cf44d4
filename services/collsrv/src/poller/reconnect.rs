//! Reconnection backoff
//!
//! The poller never sleeps on a device. After a failure the helper records
//! when the next connect attempt is allowed; rounds that fall before that
//! instant skip the device without any I/O.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

/// Connection state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Last round read successfully
    Connected,
    /// Not connected; the next round will try
    Disconnected,
    /// Not connected and waiting out a backoff delay
    Reconnecting,
}

/// Reconnection policy configuration
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Backoff multiplier for exponential delay
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Create from configuration values
    pub fn from_config(
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        jitter: bool,
    ) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            backoff_multiplier,
            jitter,
        }
    }
}

/// Reconnection statistics tracking
#[derive(Debug, Default, Clone)]
pub struct ReconnectStats {
    /// Total failed rounds (connect or read)
    pub total_failures: u64,
    /// Successful reconnections after at least one failure
    pub successful_reconnects: u64,
    /// Rounds skipped while waiting out a delay
    pub skipped_rounds: u64,
}

/// Per-device backoff state
#[derive(Debug)]
pub struct ReconnectHelper {
    policy: ReconnectPolicy,
    state: ConnectionState,
    consecutive_failures: u32,
    next_attempt: Option<Instant>,
    stats: ReconnectStats,
}

impl ReconnectHelper {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            next_attempt: None,
            stats: ReconnectStats::default(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn stats(&self) -> &ReconnectStats {
        &self.stats
    }

    /// Whether a connect attempt is allowed at `now`
    ///
    /// Counts a skipped round when it is not.
    pub fn should_attempt(&mut self, now: Instant) -> bool {
        match self.next_attempt {
            Some(at) if now < at => {
                self.stats.skipped_rounds += 1;
                false
            },
            _ => true,
        }
    }

    /// Mark the connection as successful
    pub fn mark_connected(&mut self) {
        if self.consecutive_failures > 0 {
            self.stats.successful_reconnects += 1;
        }
        self.state = ConnectionState::Connected;
        self.consecutive_failures = 0;
        self.next_attempt = None;
    }

    /// Record a failed round and schedule the next attempt
    ///
    /// Returns the delay until that attempt.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.stats.total_failures += 1;

        let delay = self.calculate_next_delay();
        self.next_attempt = Some(now + delay);
        self.state = ConnectionState::Reconnecting;
        debug!(
            "Failure #{}; next connect attempt in {:?}",
            self.consecutive_failures, delay
        );
        delay
    }

    /// Forget any pending delay (manual disconnect)
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.consecutive_failures = 0;
        self.next_attempt = None;
    }

    /// Calculate the next retry delay with exponential backoff
    pub fn calculate_next_delay(&self) -> Duration {
        let attempt = self.consecutive_failures.saturating_sub(1);

        // delay = initial_delay * (multiplier ^ attempt), capped
        let factor = self.policy.backoff_multiplier.powi(attempt.min(64) as i32);
        let mut delay = if factor.is_finite() {
            self.policy
                .initial_delay
                .mul_f64(factor.min(u32::MAX as f64))
                .min(self.policy.max_delay)
        } else {
            self.policy.max_delay
        };

        // Add jitter (±25% of delay)
        if self.policy.jitter && !delay.is_zero() {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            let delay_ms = (delay.as_millis() as f64 + jitter).max(0.0);
            delay = Duration::from_millis(delay_ms as u64);
        }

        delay
    }
}
