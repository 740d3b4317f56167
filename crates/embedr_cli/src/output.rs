//! JSON-lines output on stdout.

use std::io::{self, Stdout, Write};
use std::sync::{Mutex, MutexGuard};

use agent_bridge::TurnId;
use embedr_session::{GuiHost, UiEvent};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct UiEnvelope<'a> {
    pub turn_id: TurnId,
    #[serde(flatten)]
    pub event: &'a UiEvent,
}

/// Writes each UI event as one JSON line.
pub struct JsonLinesHost<W: Write + Send = Stdout> {
    out: Mutex<W>,
}

impl JsonLinesHost<Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Writes an arbitrary JSON record on its own line.
    pub fn write_record(&self, record: &Value) {
        let mut out = lock_unpoisoned(&self.out);
        let written = serde_json::to_writer(&mut *out, record)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());
        if let Err(error) = written {
            tracing::error!(%error, "failed to write output record");
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> GuiHost for JsonLinesHost<W> {
    fn emit(&self, turn_id: TurnId, event: UiEvent) {
        match serde_json::to_value(UiEnvelope {
            turn_id,
            event: &event,
        }) {
            Ok(record) => self.write_record(&record),
            Err(error) => tracing::error!(%error, "failed to serialize UI event"),
        }
    }

    fn request_credential(&self) {
        self.write_record(&json!({ "type": "credential_request" }));
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
