//! Sinks for live build output.

use async_trait::async_trait;
use bytes::Bytes;
use dockyard_core::{BuildId, OutputSink, Result};
use dockyard_db::LogRepo;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Appends output to a build's persisted log.
pub struct LogSink {
    logs: Arc<dyn LogRepo>,
    path: String,
}

impl LogSink {
    pub fn new(logs: Arc<dyn LogRepo>, path: impl Into<String>) -> Self {
        Self {
            logs,
            path: path.into(),
        }
    }
}

#[async_trait]
impl OutputSink for LogSink {
    async fn write(&self, chunk: Bytes) -> Result<()> {
        self.logs.append_log(&self.path, &chunk).await?;
        Ok(())
    }
}

/// Mirrors output to process logs under the `dockyard::build_output` target,
/// one event per line. Partial lines wait for their newline or [`flush`](Self::flush).
pub struct TraceSink {
    build_id: BuildId,
    pending: Mutex<Vec<u8>>,
}

impl TraceSink {
    pub fn new(build_id: BuildId) -> Self {
        Self {
            build_id,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        info!(target: "dockyard::build_output", build_id = %self.build_id, "{}", line.trim_end());
    }

    /// Emit whatever partial line is buffered.
    pub fn flush(&self) {
        let rest = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        if !rest.is_empty() {
            self.emit(&rest);
        }
    }

    /// Complete lines in `chunk` joined with what was buffered.
    fn split_lines(&self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = pending.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }
}

#[async_trait]
impl OutputSink for TraceSink {
    async fn write(&self, chunk: Bytes) -> Result<()> {
        for line in self.split_lines(&chunk) {
            self.emit(&line);
        }
        Ok(())
    }
}

/// Writes every chunk to each sink in order, failing on the first error.
pub struct MultiSink {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl OutputSink for MultiSink {
    async fn write(&self, chunk: Bytes) -> Result<()> {
        for sink in &self.sinks {
            sink.write(chunk.clone()).await?;
        }
        Ok(())
    }
}
