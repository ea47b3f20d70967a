use crate::config::SchedulerConfig;
use crate::lock;
use compact_str::CompactString;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Level, span};

/// A [tracing::Subscriber] which writes one line per event to a [Write] sink:
///
/// ```text
/// [dicom.scheduler] WARN retrying job job=4f0c… kind=Retrieve
/// ```
///
/// Wrap it in a [tracing::Dispatch] and hand it to
/// [crate::Scheduler::with_dispatch] so that pool threads log through it
/// without a process-wide default.
///
/// **Note**: only events are supported, spans are not.
pub struct SchedulerLogger {
    name: CompactString,
    /// Force [Level::INFO] to be presented as [Level::WARN].
    verbose: bool,
    max_level: Level,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl SchedulerLogger {
    pub fn new(name: &str, sink: impl Write + Send + 'static) -> Self {
        Self {
            name: CompactString::new(name),
            verbose: false,
            max_level: Level::DEBUG,
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Log to standard error.
    pub fn stderr(name: &str) -> Self {
        Self::new(name, std::io::stderr())
    }

    /// Log to standard error, verbose if `config` says so.
    pub fn from_config(name: &str, config: &SchedulerConfig) -> Self {
        Self::stderr(name).with_verbose(config.verbose)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Ignore events less severe than `level`.
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl tracing::Subscriber for SchedulerLogger {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        metadata.level() <= &self.max_level
    }

    fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

    fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        let level = presented_level(event.metadata().level(), self.verbose);
        let message = EventLine::of(event);
        let mut sink = lock(&self.sink);
        if let Err(e) = writeln!(sink, "[{}] {level} {message}", self.name) {
            eprintln!("ERROR: cannot write log message ({e})");
        }
    }

    fn enter(&self, _: &span::Id) {}

    fn exit(&self, _: &span::Id) {}
}

fn presented_level(level: &Level, verbose: bool) -> Level {
    if verbose && *level == Level::INFO {
        Level::WARN
    } else {
        *level
    }
}

/// Text of one event: its message followed by its fields as `name=value`.
#[derive(Default)]
struct EventLine {
    message: String,
    fields: String,
}

impl EventLine {
    fn of(event: &tracing::Event<'_>) -> String {
        let mut line = Self::default();
        event.record(&mut line);
        if line.message.is_empty() {
            line.fields.trim_start().to_string()
        } else {
            line.message + &line.fields
        }
    }

    fn push_field(&mut self, field: &Field, value: std::fmt::Arguments<'_>) {
        // writing to a String never fails
        let _ = write!(self.fields, " {}={value}", field.name());
    }
}

impl Visit for EventLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else if value.is_empty() || value.contains([' ', '"', '=']) {
            self.push_field(field, format_args!("{value:?}"));
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}
