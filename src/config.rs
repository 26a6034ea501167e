//! Controller configuration.
//!
//! Defines the host-supplied knobs for the partition controller. The struct
//! is populated by the integrating platform and passed to
//! `AccessController::with_config`.

/// Configuration for the partition controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Verify the integrity of locked `integrity` partitions during
    /// `initialize()`. A mismatch fails initialization and is reported to
    /// the registered fault sinks.
    pub verify_on_init: bool,

    /// Zeroize the plaintext caches of secret partitions when the controller
    /// is dropped.
    pub wipe_cache_on_drop: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            verify_on_init: true,
            wipe_cache_on_drop: true,
        }
    }
}
