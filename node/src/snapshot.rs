//! # State Snapshots
//!
//! The node keeps all state in memory and persists it as one JSON document
//! holding the engine state, the token ledger and the role table. Writes go
//! to a temporary file in the same directory and are renamed into place, so
//! a crash mid-write never leaves a truncated snapshot behind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bondline_contracts::access_control::RoleTable;
use bondline_contracts::token_ledger::LedgerState;
use bondline_contracts::{RoleRegistry, TokenLedger};
use bondline_protocol::engine::CurveState;
use bondline_protocol::CurveEngine;

/// Snapshot file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Attempts at capturing a pair of engine/token states that agree.
const CAPTURE_ATTEMPTS: usize = 8;

/// Everything the node needs to resume where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub engine: CurveState,
    pub token: LedgerState,
    pub roles: RoleTable,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Captures the three components.
    ///
    /// Engine and token are separate locks, so a withdrawal can land between
    /// the two reads. The capture is retried until the pair satisfies
    /// `total_issued == supply + pending` with nothing in flight. If it never
    /// does (a foreign minter, or constant withdrawal traffic) the last pair
    /// is returned with a warning.
    pub fn capture(engine: &CurveEngine, token: &TokenLedger, roles: &RoleRegistry) -> Self {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let engine_state = engine.snapshot();
            let token_state = token.snapshot();
            if is_consistent(&engine_state, &token_state) || attempt >= CAPTURE_ATTEMPTS {
                if attempt >= CAPTURE_ATTEMPTS {
                    tracing::warn!(attempt, "snapshot captured without a consistent engine/token pair");
                }
                return Self {
                    engine: engine_state,
                    token: token_state,
                    roles: roles.snapshot(),
                    taken_at: Utc::now(),
                };
            }
            std::thread::yield_now();
        }
    }

    /// Replaces live state with this snapshot.
    pub fn apply(self, engine: &CurveEngine, token: &TokenLedger, roles: &RoleRegistry) {
        roles.restore(self.roles);
        token.restore(self.token);
        engine.restore(self.engine);
    }
}

fn is_consistent(engine: &CurveState, token: &LedgerState) -> bool {
    if engine.in_flight != 0 {
        return false;
    }
    engine
        .ledger
        .totals()
        .and_then(|(mint, promo)| mint.checked_add(promo))
        .and_then(|pending| pending.checked_add(token.total_supply))
        .is_some_and(|accounted| accounted == engine.total_issued)
}

/// Path of the snapshot file for `data_dir`.
pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE)
}

/// Atomically writes `snapshot` to `path`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let dir = path
        .parent()
        .context("snapshot path has no parent directory")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;

    let body = serde_json::to_vec_pretty(snapshot).context("failed to serialize snapshot")?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        file.write_all(&body)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", tmp.display()))?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = body.len(), "snapshot written");
    Ok(())
}

/// Captures and saves a snapshot on the blocking pool, keeping the lock
/// retries and file I/O off the async workers.
pub async fn persist(
    engine: Arc<CurveEngine>,
    token: Arc<TokenLedger>,
    roles: Arc<RoleRegistry>,
    path: PathBuf,
) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let snap = Snapshot::capture(&engine, &token, &roles);
        save(&path, &snap)
    })
    .await
    .context("snapshot task panicked")?
}

/// Reads a snapshot, or `None` if there is no file yet.
pub fn load(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}
