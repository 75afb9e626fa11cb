//! CLI-side observers: console progress lines and a JSONL event log.
//!
//! Persistence is an observer responsibility; the engine only guarantees
//! emission.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use scout_core::{Observer, ProgressEvent, ProgressKind};
use tokio::sync::Mutex;

/// Prints progress to stderr so exports on stdout stay clean.
pub struct ConsoleObserver;

#[async_trait]
impl Observer for ConsoleObserver {
    fn name(&self) -> &str {
        "console"
    }

    async fn notify(&self, event: &ProgressEvent) -> Result<(), String> {
        match event.kind {
            ProgressKind::Iteration => eprintln!("--- {}", event.message),
            ProgressKind::Finding => eprintln!("  + {}", event.message),
            ProgressKind::Status => eprintln!("{}", event.message),
            ProgressKind::Error => eprintln!("!! {}", event.message),
            ProgressKind::ToolCall => {}
        }
        Ok(())
    }
}

/// Appends every event as one JSON line to a file.
pub struct JsonlObserver {
    file: Mutex<File>,
}

impl JsonlObserver {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Observer for JsonlObserver {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn notify(&self, event: &ProgressEvent) -> Result<(), String> {
        let line = serde_json::to_string(event).map_err(|e| e.to_string())?;
        let mut file = self.file.lock().await;
        writeln!(file, "{line}").map_err(|e| e.to_string())
    }
}
