//! Opt-in stderr logging for library consumers.
//!
//! Nothing is logged until [`quiver_init_logging`] installs a logger. Levels are numbered from
//! [`LOG_LEVEL_OFF`] to [`LOG_LEVEL_TRACE`].

use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

pub const LOG_LEVEL_OFF: u8 = 0;
pub const LOG_LEVEL_ERROR: u8 = 1;
pub const LOG_LEVEL_WARN: u8 = 2;
pub const LOG_LEVEL_INFO: u8 = 3;
pub const LOG_LEVEL_DEBUG: u8 = 4;
pub const LOG_LEVEL_TRACE: u8 = 5;

fn level_filter(level: u8) -> Option<LevelFilter> {
    Some(match level {
        LOG_LEVEL_OFF => LevelFilter::Off,
        LOG_LEVEL_ERROR => LevelFilter::Error,
        LOG_LEVEL_WARN => LevelFilter::Warn,
        LOG_LEVEL_INFO => LevelFilter::Info,
        LOG_LEVEL_DEBUG => LevelFilter::Debug,
        LOG_LEVEL_TRACE => LevelFilter::Trace,
        _ => return None,
    })
}

/// Route quiver's log records to stderr, keeping those at `level` or more severe.
///
/// The logger is process-wide and cannot be replaced: once one is installed, every later call
/// returns without effect. Levels above [`LOG_LEVEL_TRACE`] are ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_init_logging(level: u8) {
    let Some(filter) = level_filter(level) else {
        return;
    };
    if TermLogger::init(
        filter,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .is_ok()
    {
        log::debug!("quiver logging enabled at {}", filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(level_filter(LOG_LEVEL_OFF), Some(LevelFilter::Off));
        assert_eq!(level_filter(LOG_LEVEL_WARN), Some(LevelFilter::Warn));
        assert_eq!(level_filter(LOG_LEVEL_TRACE), Some(LevelFilter::Trace));
        assert_eq!(level_filter(6), None);
    }

    #[test]
    fn second_init_is_a_noop() {
        unsafe {
            quiver_init_logging(LOG_LEVEL_WARN);
            quiver_init_logging(LOG_LEVEL_TRACE);
            quiver_init_logging(42);
        }
        assert!(log::max_level() <= LevelFilter::Warn);
    }
}
