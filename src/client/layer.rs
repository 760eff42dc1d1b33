//! Enrichment handler: a tracing [`Layer`] that turns application events into
//! [`LogRecord`]s and hands them to the [`ProducerQueue`].
//!
//! Nothing on this path can fail the application's own logging. Conversion
//! runs under `catch_unwind`, events emitted while forwarding are ignored,
//! and events from this crate or the HTTP stack are skipped so delivery
//! diagnostics never loop back into the queue.

use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context as LayerContext;

use crate::client::queue::ProducerQueue;
use crate::model::{Context, LogLevel, LogRecord, unix_now};

/// Event targets never forwarded.
const IGNORED_TARGET_PREFIXES: &[&str] = &["loghound", "reqwest", "hyper", "h2", "rustls"];

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Stop forwarding events emitted on the calling thread, for good.
pub(crate) fn suppress_current_thread() {
    SUPPRESSED.with(|s| s.set(true));
}

/// Map a tracing level onto the stored severity scale.
pub fn map_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

// =============================================================================
// Layer
// =============================================================================

/// Forwards every eligible event to a [`ProducerQueue`].
#[derive(Clone)]
pub struct LogForwardLayer {
    queue: Arc<ProducerQueue>,
    application_id: String,
    service_name: Option<String>,
}

impl fmt::Debug for LogForwardLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogForwardLayer")
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}

impl LogForwardLayer {
    pub fn new(
        queue: Arc<ProducerQueue>,
        application_id: impl Into<String>,
        service_name: Option<String>,
    ) -> Self {
        Self {
            queue,
            application_id: application_id.into(),
            service_name,
        }
    }

    /// The queue behind this layer, for `stop` and drop counters.
    pub fn queue(&self) -> &Arc<ProducerQueue> {
        &self.queue
    }

    /// Build the record for one event.
    pub fn to_record(&self, event: &Event<'_>) -> LogRecord {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let level = map_level(meta.level());
        let mut record = LogRecord::new(
            unix_now(),
            level,
            visitor.message.take().unwrap_or_default(),
            self.application_id.clone(),
            meta.target(),
        );
        record.service_name = self.service_name.clone();

        if let Some(Value::String(kind)) = visitor.fields.remove("exception_type") {
            visitor.exception_type = Some(kind);
        }
        if let Some(Value::String(trace)) = visitor.fields.remove("stacktrace") {
            visitor.stacktrace = Some(trace);
        }

        let error_like = level >= LogLevel::Error || visitor.exception_type.is_some();
        if error_like {
            record.file_path = meta.file().map(str::to_string);
            record.line_no = meta.line().map(i64::from);
            record.exception_type = visitor.exception_type.take();
            record.stacktrace = visitor.stacktrace.take();
        }

        record.context = runtime_context();
        record.context.extend(visitor.fields);
        record
    }

    fn forward(&self, event: &Event<'_>) {
        let record = self.to_record(event);
        self.queue.enqueue(record);
    }
}

impl<S> Layer<S> for LogForwardLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let target = event.metadata().target();
        if IGNORED_TARGET_PREFIXES.iter().any(|p| target.starts_with(p)) {
            return;
        }

        let Ok(already_forwarding) = SUPPRESSED.try_with(|s| s.replace(true)) else {
            return;
        };
        if already_forwarding {
            return;
        }

        if catch_unwind(AssertUnwindSafe(|| self.forward(event))).is_err() {
            self.queue.note_lost_record();
        }

        let _ = SUPPRESSED.try_with(|s| s.set(false));
    }
}

fn runtime_context() -> Context {
    let mut context = Context::new();
    context.insert("language".to_string(), Value::from("rust"));
    context.insert("pid".to_string(), Value::from(std::process::id()));

    let thread = std::thread::current();
    context.insert(
        "thread_id".to_string(),
        Value::from(format!("{:?}", thread.id())),
    );
    if let Some(name) = thread.name() {
        context.insert("thread_name".to_string(), Value::from(name));
    }
    context
}

// =============================================================================
// Field visitor
// =============================================================================

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Context,
    exception_type: Option<String>,
    stacktrace: Option<String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name.starts_with("log.") {
            return;
        }
        if name == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return;
        }
        self.fields.insert(name.to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        if self.exception_type.is_none() {
            self.exception_type = Some(error_type_name(value));
            self.stacktrace = Some(error_chain(value));
        }
        self.insert(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}

/// Leading identifier of the error's `Debug` output, e.g. `ParseIntError`.
fn error_type_name(error: &(dyn StdError + 'static)) -> String {
    let debug = format!("{error:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}

/// The error followed by each `source()`, one per line.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
