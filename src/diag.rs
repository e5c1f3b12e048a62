//! Opt-in diagnostic tracing of allocation and deallocation events.
//!
//! Tracing is switched on by the presence of the `GOBJECT_INTEROP_DEBUG_MEM`
//! environment variable (its value is ignored). The flag is read once on
//! first use and cached for the lifetime of the process; there is no way to
//! reconfigure it afterwards.
//!
//! Messages go to stderr. A reentrant mutex guards the stream: a multi-line
//! event group holds the lock across several `dbg_log!` calls while the
//! macro re-acquires it per line, and messages from other threads wait for
//! the whole group. Disabled tracing is a complete no-op.

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard, const_reentrant_mutex};

/// Environment variable that switches diagnostic tracing on.
pub const DEBUG_ENV: &str = "GOBJECT_INTEROP_DEBUG_MEM";

static MEM_TRACE: OnceLock<bool> = OnceLock::new();

/// Mutex protecting the diagnostic stream. Reentrant, so one thread may nest
/// log calls under an outer group guard without deadlocking.
static LOG_LOCK: ReentrantMutex<()> = const_reentrant_mutex(());

/// Whether diagnostic tracing is enabled for this process.
pub fn enabled() -> bool {
    #[cfg(test)]
    if let Some(forced) = test_support::forced() {
        return forced;
    }
    *MEM_TRACE.get_or_init(|| std::env::var_os(DEBUG_ENV).is_some())
}

/// Give the calling thread exclusive access to the diagnostic stream for the
/// lifetime of the guard.
pub fn lock() -> ReentrantMutexGuard<'static, ()> {
    LOG_LOCK.lock()
}

/// Acquire the stream guard only when tracing is on. Used to bracket a group
/// of related messages that must stay together in the stream.
pub fn lock_if_enabled() -> Option<ReentrantMutexGuard<'static, ()>> {
    enabled().then(lock)
}

/// Write one message line atomically. No-op when tracing is disabled.
pub fn write(args: fmt::Arguments<'_>) {
    if !enabled() {
        return;
    }
    let mut line = args.to_string();
    line.push('\n');
    write_bytes(line.as_bytes());
}

/// Write raw bytes atomically, without appending a newline. Used by the C
/// surface, which passes explicit (pointer, length) messages.
pub fn write_bytes(bytes: &[u8]) {
    if !enabled() {
        return;
    }
    let _guard = LOG_LOCK.lock();
    #[cfg(test)]
    if test_support::capture(bytes) {
        return;
    }
    let _ = std::io::stderr().lock().write_all(bytes);
}

/// Format and write one diagnostic line if tracing is enabled.
///
/// Arguments are not evaluated when tracing is off.
#[macro_export]
macro_rules! dbg_log {
    ($($arg:tt)*) => {
        if $crate::diag::enabled() {
            $crate::diag::write(format_args!($($arg)*));
        }
    };
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocking_on_the_same_thread_does_not_deadlock() {
        let _serial = test_support::serial();
        test_support::force_on();
        test_support::start_capture();

        {
            let _group = lock();
            dbg_log!("outer");
            // Re-acquires LOG_LOCK on this thread inside the macro.
            dbg_log!("nested");
        }

        let out = test_support::take_capture();
        test_support::clear();
        assert_eq!(out, b"outer\nnested\n");
    }

    #[test]
    fn concurrent_messages_stay_contiguous() {
        let _serial = test_support::serial();
        test_support::force_on();
        test_support::start_capture();

        let writers: Vec<_> = [b'a', b'b']
            .into_iter()
            .map(|fill| {
                std::thread::spawn(move || {
                    let line = String::from_utf8(vec![fill; 64]).unwrap();
                    for _ in 0..200 {
                        write(format_args!("{line}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let out = test_support::take_capture();
        test_support::clear();

        let text = String::from_utf8(out).unwrap();
        let mut lines = 0;
        for line in text.lines() {
            assert_eq!(line.len(), 64, "partial message in stream: {line:?}");
            let fill = line.as_bytes()[0];
            assert!(line.bytes().all(|b| b == fill), "garbled message: {line:?}");
            lines += 1;
        }
        assert_eq!(lines, 400);
    }

    #[test]
    fn disabled_tracing_writes_nothing() {
        let _serial = test_support::serial();
        test_support::force_off();
        test_support::start_capture();

        dbg_log!("invisible");
        write_bytes(b"invisible");

        let out = test_support::take_capture();
        test_support::clear();
        assert!(out.is_empty());
    }
}
