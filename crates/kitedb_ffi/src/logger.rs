//! Process-wide client logger sink.

use std::ffi::{c_char, CString};

use parking_lot::Mutex;

/// Error log level.
pub const LOG_LEVEL_ERROR: i32 = 1;
/// Warning log level.
pub const LOG_LEVEL_WARNING: i32 = 2;
/// Info log level.
pub const LOG_LEVEL_INFO: i32 = 3;
/// Trace log level.
pub const LOG_LEVEL_TRACE: i32 = 4;

/// Callback receiving formatted log lines from the engine.
pub type KitedbLogWriter = extern "C" fn(level: i32, msg: *const c_char);

static LOG_WRITER: Mutex<Option<KitedbLogWriter>> = Mutex::new(None);

/// Installs a process-wide logging sink.
#[no_mangle]
pub extern "C" fn kitedb_enable_logger(writer: KitedbLogWriter) {
    *LOG_WRITER.lock() = Some(writer);
}

/// Removes the logging sink.
#[no_mangle]
pub extern "C" fn kitedb_disable_logger() {
    *LOG_WRITER.lock() = None;
}

/// Forwards a line to the installed sink, if any.
pub(crate) fn log_to_writer(level: i32, message: &str) {
    let writer = *LOG_WRITER.lock();
    if let Some(writer) = writer {
        if let Ok(line) = CString::new(message) {
            writer(level, line.as_ptr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static LAST_LEVEL: AtomicI32 = AtomicI32::new(0);

    extern "C" fn capture(level: i32, _msg: *const c_char) {
        LAST_LEVEL.store(level, Ordering::SeqCst);
    }

    #[test]
    fn logger_install_and_remove() {
        kitedb_enable_logger(capture);
        log_to_writer(LOG_LEVEL_ERROR, "query failed");
        assert_eq!(LAST_LEVEL.load(Ordering::SeqCst), LOG_LEVEL_ERROR);

        kitedb_disable_logger();
        LAST_LEVEL.store(0, Ordering::SeqCst);
        log_to_writer(LOG_LEVEL_INFO, "ignored");
        assert_eq!(LAST_LEVEL.load(Ordering::SeqCst), 0);
    }
}
