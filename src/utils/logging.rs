//! Per-module log switches.
//!
//! Scanner modules keep a `const ENABLE_LOGS: bool` next to their imports so
//! the chatty ones (the decode loop, the driver) can be silenced without
//! touching `RUST_LOG`. Lines about a single scan session go through
//! `scan_info!` / `scan_warn!`, which prefix the short session id, e.g.
//! `[scan 3f2a9c1e] submitting attendance for TB000123`.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// `scan_info!(session_id, "format", args..)`
#[macro_export]
macro_rules! scan_info {
    ($session:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[scan {}] {}", $session, format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! scan_warn {
    ($session:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[scan {}] {}", $session, format_args!($($arg)*));
        }
    };
}
