//! Durable snapshot plumbing: append-only journal and full snapshot dumps.
//!
//! The journal (`orders.jsonl`) holds one canonical JSON order per line,
//! flushed before the mutation is acknowledged. The full snapshot
//! (`orders_snapshot.json`) is a consolidated `{ts_ms, orders:{...}}` dump
//! written best-effort: it must never fail a trading operation.

use crate::core::errors::ExecError;
use crate::core::types::Order;
use crate::utils::canonical::{to_canonical_line, to_canonical_string};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Journal file name inside the snapshot directory.
pub const JOURNAL_FILE: &str = "orders.jsonl";
/// Full snapshot file name inside the snapshot directory.
pub const SNAPSHOT_FILE: &str = "orders_snapshot.json";

/// Append-only canonical JSON line journal.
pub struct JournalWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl JournalWriter {
    /// Open (creating parents as needed) the journal in append mode.
    pub fn open(snapshot_dir: &Path) -> Result<Self, ExecError> {
        std::fs::create_dir_all(snapshot_dir)
            .map_err(|e| ExecError::State(format!("create snapshot dir: {e}")))?;
        let path = snapshot_dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ExecError::State(format!("open journal {path:?}: {e}")))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record as a canonical JSON line and flush before
    /// returning. The mutation is only acknowledged after this succeeds.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), ExecError> {
        let line = to_canonical_line(record)
            .map_err(|e| ExecError::State(format!("serialize journal line: {e}")))?;
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| ExecError::State(format!("append journal {:?}: {e}", self.path)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replay the journal, yielding each line's order in write order. Blank
/// lines are skipped; a malformed line is an error (the journal is
/// canonical by construction).
pub fn replay_journal(snapshot_dir: &Path) -> Result<Vec<Order>, ExecError> {
    let path = snapshot_dir.join(JOURNAL_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file =
        File::open(&path).map_err(|e| ExecError::State(format!("open journal {path:?}: {e}")))?;
    let reader = BufReader::new(file);

    let mut orders = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ExecError::State(format!("read journal {path:?}: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let order: Order = serde_json::from_str(&line).map_err(|e| {
            ExecError::State(format!("journal line {} malformed: {e}", line_no + 1))
        })?;
        orders.push(order);
    }
    Ok(orders)
}

/// Write the consolidated snapshot `{ts_ms, orders:{cid: order}}`.
/// Best-effort: failures are logged, never raised.
pub fn write_full_snapshot(snapshot_dir: &Path, ts_ms: i64, orders: &BTreeMap<String, Order>) {
    #[derive(Serialize)]
    struct FullSnapshot<'a> {
        ts_ms: i64,
        orders: &'a BTreeMap<String, Order>,
    }

    let result = (|| -> Result<(), String> {
        std::fs::create_dir_all(snapshot_dir).map_err(|e| e.to_string())?;
        let body = to_canonical_string(&FullSnapshot { ts_ms, orders }).map_err(|e| e.to_string())?;
        std::fs::write(snapshot_dir.join(SNAPSHOT_FILE), body).map_err(|e| e.to_string())
    })();

    if let Err(e) = result {
        warn!(error = %e, "full snapshot write failed");
    }
}
