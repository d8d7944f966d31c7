//! A `tracing_subscriber::Layer` that appends every event as one JSON-lines
//! record to the worker's log file, in the exact shape `rpc::log_stream`
//! tails (§6 "Log file: JSON-lines..."). Grounded in the teacher's
//! `LogCaptureLayer` (`utils/log_capture.rs`), which extracts fields via a
//! `tracing::field::Visit` visitor and forwards a structured event —
//! generalized here from an in-memory broadcast to a durable file sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::rpc::LogEntry;

pub struct JsonFileLogLayer {
    writer: Mutex<BufWriter<File>>,
    service: String,
}

impl JsonFileLogLayer {
    pub fn new(path: impl AsRef<std::path::Path>, service: impl Into<String>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            service: service.into(),
        })
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    operation: Option<String>,
    error: Option<String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "operation" => self.operation = Some(value.to_string()),
            "error" => self.error = Some(value.to_string()),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for JsonFileLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            timestamp: chrono::Utc::now(),
            level: event.metadata().level().to_string(),
            message: visitor.message.unwrap_or_else(|| event.metadata().name().to_string()),
            service: self.service.clone(),
            operation: visitor.operation,
            error: visitor.error,
        };

        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}
