//! Logger setup and module-gated logging macros.
//!
//! A module opts into the macros by declaring its own switch:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//! ```

use log::LevelFilter;

/// Installs `env_logger`. `RUST_LOG` still wins over the default level.
/// Calling it twice is harmless.
pub fn init_logging(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}

/// `true` when `RUNTRACK_DEBUG` is `1` or `true`.
pub fn debug_from_env() -> bool {
    std::env::var("RUNTRACK_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

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

#[cfg(test)]
mod tests {
    use super::*;

    const ENABLE_LOGS: bool = false;

    #[test]
    fn gated_macros_work_as_statements_and_match_arms() {
        init_logging(false);
        init_logging(true);

        let outcome: Result<u32, &str> = Err("offline");
        match outcome {
            Ok(value) => crate::log_info!("loaded {value}"),
            Err(err) => crate::log_error!("load failed: {err}"),
        }
        crate::log_warn!("silenced {}", 1);
        crate::log_debug!("silenced");
    }
}
