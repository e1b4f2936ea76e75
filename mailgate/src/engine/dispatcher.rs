// mailgate/src/engine/dispatcher.rs
//
// Appends metrics records to JSONL files in the output directory:
//   decisions.jsonl   every scored request
//   blocked.jsonl     decision == block
//   warned.jsonl      decision == warn
// Point a log shipper at these files to feed the analytics store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::events::{DecisionKind, MetricsRecord};

pub const DECISIONS_FILE: &str = "decisions.jsonl";
pub const BLOCKED_FILE: &str = "blocked.jsonl";
pub const WARNED_FILE: &str = "warned.jsonl";

pub struct Dispatcher {
    out: PathBuf,
}

impl Dispatcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out)
            .with_context(|| format!("creating output directory {}", out.display()))?;
        Ok(Self { out })
    }

    pub fn output_dir(&self) -> &Path {
        &self.out
    }

    pub async fn dispatch(&self, record: &MetricsRecord) -> Result<()> {
        let mut line = record.to_jsonl().into_bytes();
        line.push(b'\n');
        for file in routes(record.decision) {
            let path = self.out.join(file);
            let mut sink = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            sink.write_all(&line)
                .await
                .with_context(|| format!("appending to {}", path.display()))?;
        }
        debug!(decision = %record.decision, fingerprint = %record.fingerprint, "record written");
        Ok(())
    }
}

/// Files a record lands in; every record also goes to `decisions.jsonl`.
fn routes(decision: DecisionKind) -> &'static [&'static str] {
    match decision {
        DecisionKind::Block => &[BLOCKED_FILE, DECISIONS_FILE],
        DecisionKind::Warn  => &[WARNED_FILE, DECISIONS_FILE],
        DecisionKind::Allow => &[DECISIONS_FILE],
    }
}
