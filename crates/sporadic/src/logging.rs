//! Internal module to handle logging.
//!
//! This crate has a problem.  It wishes to be able to log from the replenishment operations, but those run on the
//! kernel's interrupts-disabled path, which cannot allocate or do I/O.  Rust's logging facades do not support this in
//! any way; the log crate kind of does, but only if the installed handler doesn't do bad things, and we cannot know
//! that it doesn't.
//!
//! The best we can do here is a ringbuffer.  Specifically, we define macros `klog_level` which work (mostly) like the
//! macros from the log crate:
//!
//! - On threads not marked as being in a critical section, these are very boring and forward to the macros from the log
//!   crate.
//! - Inside a marked critical section, these instead push into a ringbuffer with a fixed-size message limit.
//!
//! A kernel has no background threads to drain with, so draining is the host's job: once the critical section is over,
//! it calls [drain_deferred_logs] and the records come out through the log crate as usual.  We make sure to indicate
//! when messages were truncated to the fixed limit, and we count messages dropped because the ring was full,
//! reporting the count on the next record that does get through.
//!
//! The one unfortunate design problem: timestamps.  The handler sees the time of the drain, not the time of the
//! operation.  Carrying tick counts through would let the host correct this, but ticks don't convert to wall time
//! without the platform's help, so we leave the delay visible instead; drains are expected to happen promptly after
//! the critical section ends.
use std::fmt::Arguments as FmtArgs;

use arrayvec::ArrayString;
use thingbuf::{recycling::Recycle, ThingBuf};

// The following two values reserve around `LOG_LENGTH_LIMIT * LOG_QUEUE_LENGTH` bytes for the log queue.

const LOG_LENGTH_LIMIT: usize = 256;
const LOG_QUEUE_LENGTH: usize = 1024;

type InlineLogMessage = ArrayString<LOG_LENGTH_LIMIT>;

/// A log message can either be a fixed-size static string, or something formatted to an inline buffer.
#[derive(Debug)]
pub(crate) enum LogMessage {
    Static(&'static str),
    Inline(InlineLogMessage),
}

pub(crate) struct LogRecord {
    /// If a thread detects that it was unable to enqueue messages, it sets this value.
    skipped_messages: u64,

    level: log::Level,

    /// Output of the `module_path!` macro.
    module: &'static str,

    message: LogMessage,

    /// This message might have been truncated. Was it?
    truncated: bool,
}

/// The arrayvec crate does not support formatting in a way which would let us detect truncations.  This formatter
/// pushes things to a log message until it's full, then sets truncated to true.
///
/// On truncation, it just keeps going and throws out the values.
struct LogMessageFormatter<'a> {
    log_message: &'a mut InlineLogMessage,
    truncated: &'a mut bool,
}

impl<'a> std::fmt::Write for LogMessageFormatter<'a> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        // This formatter never fails. On truncation, it just keeps going and throws the values away.
        if *self.truncated {
            return Ok(());
        }

        let remaining = self.log_message.remaining_capacity();
        // Careful: ArrayString capacity is in bytes.
        if s.as_bytes().len() <= remaining {
            self.log_message.push_str(s);
            return Ok(());
        }

        *self.truncated = true;

        // Otherwise, we are truncating. To do so, we will unfortunately have to push characters until we can't anymore.
        // arrayvec doesn't offer us a good API for this, and we want to preserve character boundaries.  The easiest way
        // is to therefore go char by char.
        for c in s.chars() {
            if self.log_message.try_push(c).is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Build a log message.
///
/// The returned message has skipped_messages set to 0. This is then fixed up by the caller, where the actual enqueueing
/// happens.
pub(crate) fn build_log_message(
    level: log::Level,
    args: FmtArgs<'_>,
    module: &'static str,
) -> LogRecord {
    use std::fmt::Write;

    let mut truncated = false;

    let message = match args.as_str() {
        Some(m) => LogMessage::Static(m),
        None => {
            let mut buf = InlineLogMessage::new();

            let mut formatter = LogMessageFormatter {
                truncated: &mut truncated,
                log_message: &mut buf,
            };

            write!(formatter, "{}", args).expect("Our formatter never fails");

            LogMessage::Inline(buf)
        }
    };

    LogRecord {
        skipped_messages: 0,
        level,
        message,
        module,
        truncated,
    }
}

struct LogRecordRecycler;

impl Recycle<LogRecord> for LogRecordRecycler {
    fn new_element(&self) -> LogRecord {
        LogRecord {
            skipped_messages: 0,
            level: log::Level::Debug,
            message: LogMessage::Static("NOT SET"),
            module: module_path!(),
            truncated: false,
        }
    }

    fn recycle(&self, _element: &mut LogRecord) {
        // No-op; we'll just overwrite it on the next time round.
    }
}

lazy_static::lazy_static! {
    static ref DEFERRED: ThingBuf<LogRecord, LogRecordRecycler> =
        ThingBuf::with_recycle(LOG_QUEUE_LENGTH, LogRecordRecycler);
}

/// Defer a log message to the ring if needed.
///
/// This is the entrypoint for the macro.
pub(crate) fn dispatch_message(level: log::Level, args: FmtArgs<'_>, module: &'static str) {
    use std::cell::Cell;

    thread_local! {
        static SKIPPED_MESSAGES: Cell<u64> = const { Cell::new(0) };
    }

    if level > log::max_level() {
        return;
    }

    // Otherwise let's try to enqueue it.
    let mut record = build_log_message(level, args, module);
    record.skipped_messages = SKIPPED_MESSAGES.get();

    match DEFERRED.push(record) {
        Ok(_) => {
            // Finally told the drain about skipped messages.
            SKIPPED_MESSAGES.replace(0);
        }
        Err(_) => {
            SKIPPED_MESSAGES.replace(SKIPPED_MESSAGES.get() + 1);
        }
    }
}

/// Convert a single log message to the log crate's macros and spit it out.
fn log_one(record: LogRecord) {
    let msg_str = match &record.message {
        LogMessage::Static(s) => s,
        LogMessage::Inline(i) => i.as_str(),
    };

    if record.skipped_messages != 0 {
        log::warn!(
            "The deferred log ring overflowed!  {} messages have been dropped!",
            record.skipped_messages
        );
    }

    let mut suffix_bytes: smallvec::SmallVec<[u8; 64]> = smallvec::SmallVec::new();

    if record.truncated {
        use std::io::Write;

        write!(suffix_bytes, ", truncated to {} bytes", LOG_LENGTH_LIMIT)
            .expect("Writing to a smallvec shouldn't fail");
    }

    let suffix = std::str::from_utf8(&suffix_bytes[..])
        .expect("Rust formatting only ever writes valid UTF8");

    log::log!(target: record.module, record.level, "{} (deferred{suffix})", msg_str);
}

/// Drain every deferred log record out through the log crate.
///
/// Call this from outside the critical section, promptly after it ends.  Returns the number of records emitted.
pub fn drain_deferred_logs() -> usize {
    let mut drained = 0;
    while let Some(msg) = DEFERRED.pop() {
        log_one(msg);
        drained += 1;
    }
    drained
}

/// Same as the log macro, but safe on the interrupts-disabled path and the target is always the current module.
#[allow(clippy::crate_in_macro_def)] // This is private.
macro_rules! klog {
    ($level: expr, $fmt: expr $(, $args: expr)* $(,)?) => {
        let macro_level = $level;
        if crate::critical_section::in_critical_section() && macro_level <= log::max_level() {
            crate::logging::dispatch_message(macro_level, format_args!($fmt, $($args),*), module_path!());
        } else {
            log::log!($level, $fmt, $($args),*);
        }
    }
}

macro_rules! klog_error {
    ($($args: tt)+) => {
        klog!(log::Level::Error, $($args)*);
    }
}

macro_rules! klog_warn {
    ($($args: tt)+) => {
        klog!(log::Level::Warn, $($args)*);
    }
}

macro_rules! klog_info {
    ($($args: tt)+) => {
        klog!(log::Level::Info, $($args)*);
    }
}

macro_rules! klog_debug {
    ($($args: tt)+) => {
        klog!(log::Level::Debug, $($args)*);
    }
}

macro_rules! klog_trace {
    ($($args: tt)+) => {
        klog!(log::Level::Trace, $($args)*);
    }
}

/// If this compiles, we can at least know that our macros can build, but we don't otherwise call it.
///
/// In other words, it's a "test".
#[allow(dead_code)]
fn test_macros_build() {
    macro_rules! tester {
        ($mac: tt) => {
            $mac!("hello");
            $mac!("hello {}", 5);
            $mac!("hello {}", 5,);
        };
    }

    tester!(klog_error);
    tester!(klog_warn);
    tester!(klog_info);
    tester!(klog_debug);
    tester!(klog_trace);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The only test allowed to mark its thread: the ring is global, and a second marked thread would race the drain
    /// counts.
    #[test]
    fn deferred_round_trip() {
        let _ = env_logger::builder().is_test(true).try_init();
        log::set_max_level(log::LevelFilter::Trace);

        crate::critical_section::enter_critical_section();
        klog_info!("charged {} ticks", 42);
        klog_debug!("static message");
        crate::critical_section::exit_critical_section();

        assert_eq!(drain_deferred_logs(), 2);
        // Ring is empty again.
        assert_eq!(drain_deferred_logs(), 0);
    }

    #[test]
    fn truncation_is_detected() {
        let mut buf = InlineLogMessage::new();
        let mut truncated = false;
        let mut formatter = LogMessageFormatter {
            log_message: &mut buf,
            truncated: &mut truncated,
        };

        use std::fmt::Write;
        let long = "x".repeat(LOG_LENGTH_LIMIT + 10);
        formatter.write_str(&long).unwrap();
        assert!(truncated);
        assert_eq!(buf.len(), LOG_LENGTH_LIMIT);
    }
}
