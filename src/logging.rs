//! Tracing bootstrap and the colorized console formatter.
//!
//! Carried forward from the teacher repo's `logging.rs` almost verbatim:
//! the collaborator named in spec §6 (`log(level, text[, since_time])`)
//! is realized here as ordinary `tracing` macro calls throughout the
//! crate, with this module providing the one piece of presentation
//! logic worth keeping — a formatter that colors a whole log line by
//! its severity instead of printing separate timestamp/level columns.

use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Formats an event as a single colored line, without timestamp or level
/// columns — intended for human-facing stdout/stderr output rather than
/// machine-parsed logs.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut buffer = String::new();
        let buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer, event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Installs a plain, non-colorized `tracing` subscriber at the given
/// level. Intended for tests and for embedding in a host application that
/// does not want the colorized console format.
pub fn init_plain(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}
