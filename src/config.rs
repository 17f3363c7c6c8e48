//! Layer configuration read from the environment.
//!
//! Per §6, the layer honors exactly two environment variables. Both are read once,
//! at layer-init time, into a [`LayerConfig`] that is never re-read afterwards.

/// Configuration snapshot taken at layer load time.
#[derive(Debug, Clone, Copy)]
pub struct LayerConfig {
    /// `VKLENS_TRAP_WARNINGS` — dlg-style trapping of warnings/errors. When set, an
    /// invariant violation that would normally just log a warning instead aborts
    /// the process, matching the source's debug-build assertion behavior.
    pub trap_warnings: bool,
    /// `VKLENS_NO_TIMELINE_SEMAPHORES` — disables the layer's own use of timeline
    /// semaphores. Workaround for buggy validation layers that mishandle them.
    pub no_timeline_semaphores: bool,
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !(v.is_empty() || v == "0"),
        Err(_) => false,
    }
}

impl LayerConfig {
    /// Read the configuration from the process environment. This should be called
    /// exactly once, during instance creation.
    pub fn from_env() -> Self {
        Self {
            trap_warnings: env_flag("VKLENS_TRAP_WARNINGS"),
            no_timeline_semaphores: env_flag("VKLENS_NO_TIMELINE_SEMAPHORES"),
        }
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            trap_warnings: false,
            no_timeline_semaphores: false,
        }
    }
}

/// Log (and, if [`LayerConfig::trap_warnings`] is set, abort on) a tolerated
/// invariant violation. This is the layer's equivalent of the source's
/// `dlg_assert`/`dlg_warn` trapping macros (§9 "Exception/panic semantics").
#[macro_export]
macro_rules! layer_warn {
    ($cfg:expr, $($arg:tt)*) => {{
        log::warn!($($arg)*);
        if $cfg.trap_warnings {
            panic!($($arg)*);
        }
    }};
}
