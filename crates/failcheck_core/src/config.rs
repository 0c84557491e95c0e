//! Operator settings for the generator and the reconciler.

use crate::error::{ConfigError, ConfigResult};
use std::path::PathBuf;
use std::time::Duration;

/// Default local log location.
pub const DEFAULT_LOG_PATH: &str = "/tmp/failcheck.data";

/// Configuration for the generate loop.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Path of the local log.
    pub log_path: PathBuf,
    /// Timeout applied to each remote operation.
    pub timeout: Duration,
    /// Pause between two cycles, and before retrying after a failure.
    pub pause: Duration,
    /// Truncate the local log and the remote tables before starting.
    pub reset: bool,
    /// Size of the random payload, in bytes.
    pub payload_size: i64,
    /// Sync the local log to disk after each append.
    pub sync_on_write: bool,
}

impl GeneratorConfig {
    /// Creates a configuration with default settings.
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            timeout: Duration::from_secs(5),
            pause: Duration::from_millis(500),
            reset: false,
            payload_size: 10,
            sync_on_write: true,
        }
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between cycles.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Sets whether to start from scratch.
    #[must_use]
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Sets the payload size.
    #[must_use]
    pub fn with_payload_size(mut self, size: i64) -> Self {
        self.payload_size = size;
        self
    }

    /// Sets whether each append is synced to disk.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Checks the settings before the loop starts.
    ///
    /// # Errors
    ///
    /// Returns an error for a payload size that is not positive or does not
    /// fit in memory, or for a zero timeout.
    pub fn validate(&self) -> ConfigResult<()> {
        self.payload_len()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl GeneratorConfig {
    /// Returns the payload size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPayloadSize`] if the size is not
    /// positive or exceeds the address space.
    pub fn payload_len(&self) -> ConfigResult<usize> {
        match usize::try_from(self.payload_size) {
            Ok(len) if len > 0 => Ok(len),
            _ => Err(ConfigError::InvalidPayloadSize(self.payload_size)),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_PATH)
    }
}

/// Configuration for a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Path of the local log.
    pub log_path: PathBuf,
    /// Timeout applied to each remote operation.
    pub timeout: Duration,
    /// Reuse the comparison table as is instead of reloading it.
    pub no_load: bool,
}

impl ReconcileConfig {
    /// Creates a configuration with default settings.
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            timeout: Duration::from_secs(5),
            no_load: false,
        }
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether to skip the bulk load.
    #[must_use]
    pub fn with_no_load(mut self, no_load: bool) -> Self {
        self.no_load = no_load;
        self
    }

    /// Checks the settings before the run starts.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero timeout.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_PATH)
    }
}

/// Parses a duration such as `"500ms"`, `"5s"`, `"1m30s"` or `"1.5h"`.
///
/// Every number needs a unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`), except a
/// bare `"0"`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] when the input does not parse.
pub fn parse_duration(input: &str) -> ConfigResult<Duration> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit"))?;
        if num_len == 0 {
            return Err(invalid("expected a number"));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| invalid("bad number"))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid("unknown unit")),
        };
        rest = &rest[unit_len..];

        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return Err(invalid("out of range"));
    }
    Ok(Duration::from_nanos(total.round() as u64))
}
