//! Process-wide disposal settings

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gc::Collector;

/// Env var enabling the double-free check (`true`/`false`, `1`/`0`).
pub const ENV_DEBUG_DOUBLE_FREE: &str = "NEBULA_DISPOSE_DEBUG_DOUBLE_FREE";

/// Env var setting the global collector's sweep interval (`0` disables).
pub const ENV_SWEEP_INTERVAL: &str = "NEBULA_DISPOSE_SWEEP_INTERVAL";

/// Default number of registrations between opportunistic collection passes.
pub const DEFAULT_SWEEP_INTERVAL: usize = 64;

static DEBUG_DOUBLE_FREE: AtomicBool = AtomicBool::new(false);

/// Enable or disable rejecting re-tracking of an item already in the
/// active context.
pub fn set_debug_double_free(enabled: bool) {
    DEBUG_DOUBLE_FREE.store(enabled, Ordering::SeqCst);
}

/// Whether the double-free check is enabled.
#[inline]
pub fn debug_double_free() -> bool {
    DEBUG_DOUBLE_FREE.load(Ordering::SeqCst)
}

/// Disposal settings applied process-wide.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DisposeConfig {
    /// Reject tracking an item twice in the same context
    pub debug_double_free: bool,
    /// Run a collection pass on the global collector every N registrations
    pub sweep_interval: Option<usize>,
}

impl Default for DisposeConfig {
    fn default() -> Self {
        Self {
            debug_double_free: false,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl DisposeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DEBUG_DOUBLE_FREE) {
            config.debug_double_free = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(Error::configuration(format!(
                        "Invalid {ENV_DEBUG_DOUBLE_FREE}: {value}"
                    )));
                }
            };
        }

        if let Some(value) = lookup(ENV_SWEEP_INTERVAL) {
            let interval: usize = value.trim().parse().map_err(|_| {
                Error::configuration(format!("Invalid {ENV_SWEEP_INTERVAL}: {value}"))
            })?;
            config.sweep_interval = (interval > 0).then_some(interval);
        }

        Ok(config)
    }

    /// Set the double-free flag
    pub fn with_debug_double_free(mut self, enabled: bool) -> Self {
        self.debug_double_free = enabled;
        self
    }

    /// Set the global collector's sweep interval
    pub fn with_sweep_interval(mut self, interval: Option<usize>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Install these settings process-wide.
    pub fn apply(&self) {
        set_debug_double_free(self.debug_double_free);
        Collector::global().set_sweep_interval(self.sweep_interval);
        tracing::debug!(
            debug_double_free = self.debug_double_free,
            sweep_interval = ?self.sweep_interval,
            "dispose config applied"
        );
    }
}
