//! Server configuration.

use std::time::Duration;

use crate::metrics::SOTW_PREFIX;

/// Configuration for the distribution server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Prefix for stream metrics (`xds` for SotW, `delta_xds` for incremental).
    pub stats_prefix: String,
    /// Identifier stamped onto every response; empty disables stamping.
    pub control_plane_id: String,
    /// Hold partial ADS requests until the snapshot matches the named set.
    pub ads: bool,
    /// Response buffer size per stream.
    pub response_buffer_size: usize,
    /// Tick interval for periodic watchdogs.
    pub watchdog_interval: Duration,
    /// Log every stream callback at debug level.
    pub log_callbacks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stats_prefix: SOTW_PREFIX.to_string(),
            control_plane_id: String::new(),
            ads: true,
            response_buffer_size: 16,
            watchdog_interval: Duration::from_secs(1),
            log_callbacks: false,
        }
    }
}

impl ServerConfig {
    /// Set the metrics prefix.
    pub fn with_stats_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stats_prefix = prefix.into();
        self
    }

    /// Set the control plane identifier.
    pub fn with_control_plane_id(mut self, id: impl Into<String>) -> Self {
        self.control_plane_id = id.into();
        self
    }

    /// Enable or disable ADS hold mode.
    pub fn with_ads(mut self, ads: bool) -> Self {
        self.ads = ads;
        self
    }

    /// Set the per-stream response buffer size.
    pub fn with_response_buffer_size(mut self, size: usize) -> Self {
        self.response_buffer_size = size;
        self
    }

    /// Set the watchdog tick interval.
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    /// Enable debug logging of stream callbacks.
    pub fn with_callback_logging(mut self, enabled: bool) -> Self {
        self.log_callbacks = enabled;
        self
    }
}
