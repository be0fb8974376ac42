use std::{
    fs::{File, OpenOptions},
    io::{LineWriter, Write},
    path::Path,
    sync::Mutex,
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::trace::trace::TraceEvent;

/// Receives every event the loop emits. Sinks must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);
}

/// Run trace on disk: one [`TraceEvent`] per line, appended across runs so a
/// file can hold several sessions. `jq -c 'select(.event == "action_rejected")'`
/// is the usual way in.
///
/// An unopenable path disables the logger instead of failing the run.
pub struct TraceLogger {
    out: Option<Mutex<LineWriter<File>>>,
}

impl TraceLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let out = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(LineWriter::new(file))),
            Err(e) => {
                warn!(path = %path.display(), "trace disabled, cannot open file: {}", e);
                None
            }
        };
        Self { out }
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    fn append(&self, event: &TraceEvent) -> Result<(), String> {
        let Some(out) = &self.out else {
            return Ok(());
        };
        let mut line = serde_json::to_vec(event).map_err(|e| format!("encode: {}", e))?;
        line.push(b'\n');

        let mut out = out.lock().map_err(|_| "writer lock poisoned".to_string())?;
        out.write_all(&line).map_err(|e| format!("write: {}", e))
    }
}

impl EventSink for TraceLogger {
    fn emit(&self, event: &TraceEvent) {
        if let Err(e) = self.append(event) {
            warn!(step = event.step, "trace event dropped ({})", e);
        }
    }
}

/// Forwards events to an async consumer.
pub struct ChannelSink {
    tx: UnboundedSender<TraceEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<TraceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &TraceEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}
