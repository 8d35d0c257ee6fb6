//! Configuration for transactions and bulk operations.

use std::time::Duration;

/// Minimum batch size the bulk engine will ever use.
pub const MIN_BATCH_SIZE: usize = 10;

/// Engine quirk profile supplying defaults when the caller provides none.
///
/// Platform engines differ in how large a transaction they tolerate and
/// how quickly they serialize conflicting transactions; the profile
/// captures those differences so callers get sane defaults per engine.
#[derive(Debug, Clone)]
pub struct QuirkProfile {
    /// Recommended initial batch size for bulk operations.
    pub recommended_batch_size: usize,
    /// Recommended transaction timeout.
    pub recommended_timeout: Duration,
    /// Whether the engine is known to be slow or fragile under large
    /// transactions.
    pub conservative: bool,
}

impl Default for QuirkProfile {
    fn default() -> Self {
        Self {
            recommended_batch_size: 100,
            recommended_timeout: Duration::from_secs(30),
            conservative: false,
        }
    }
}

impl QuirkProfile {
    /// Profile for engines known to struggle with large transactions:
    /// smaller batches, a longer timeout, and a gentler retry cadence.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            recommended_batch_size: 50,
            recommended_timeout: Duration::from_secs(60),
            conservative: true,
        }
    }

    /// Default backoff base delay for this profile.
    #[must_use]
    pub fn default_retry_delay(&self) -> Duration {
        if self.conservative {
            Duration::from_millis(250)
        } else {
            Duration::from_millis(100)
        }
    }
}

/// Options for a single `execute` call.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Wall-clock timeout; the profile's recommendation when `None`.
    pub timeout: Option<Duration>,
    /// Number of retries after the first attempt.
    pub retries: u32,
    /// Backoff base delay; the profile's default when `None`.
    pub retry_delay: Option<Duration>,
}

impl TransactionOptions {
    /// Creates options with the defaults (no retries).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transaction timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

/// Progress callback invoked once per batch boundary with
/// `(items processed so far, total items)`.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Options for `bulk_write` and `bulk_delete`.
pub struct BulkOptions {
    /// Initial batch size; the profile's recommendation when `None`.
    pub batch_size: Option<usize>,
    /// Retries per batch before its items are recorded as failed.
    pub retries: u32,
    /// Backoff base delay; the profile's default when `None`.
    pub retry_delay: Option<Duration>,
    /// Whether whole-batch failures are retried at all.
    pub retry_on_fail: bool,
    /// Per-batch transaction timeout; the profile's recommendation when
    /// `None`.
    pub timeout: Option<Duration>,
    /// Progress callback.
    pub on_progress: Option<ProgressFn>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            retries: 3,
            retry_delay: None,
            retry_on_fail: true,
            timeout: None,
            on_progress: None,
        }
    }
}

impl BulkOptions {
    /// Creates options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Sets the per-batch retry count.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Enables or disables whole-batch retry.
    #[must_use]
    pub const fn with_retry_on_fail(mut self, retry: bool) -> Self {
        self.retry_on_fail = retry;
        self
    }

    /// Sets the per-batch transaction timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for BulkOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkOptions")
            .field("batch_size", &self.batch_size)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_on_fail", &self.retry_on_fail)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
