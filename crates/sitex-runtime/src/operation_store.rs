//! Durable per-extension operation record store.
//!
//! One JSON document per extension id under the settings root. Every write is
//! an atomic whole-record replace and every read re-parses from disk, so the
//! detached background task and concurrent pollers never observe a torn
//! record and never trust a stale in-memory copy across requests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sitex_core::write_text_atomic;

/// File name of the record document inside the per-extension settings folder.
pub const OPERATION_RECORD_FILE: &str = "operation.json";

const DEFAULT_OPERATION_STATUS: u16 = 200;

/// Lifecycle states of an async install/uninstall operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProvisioningState {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl ProvisioningState {
    /// Returns the stable wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    /// Returns true when no further progress will occur without a new
    /// operation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Which kind of async work a record currently tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Uninstall,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "Install",
            Self::Uninstall => "Uninstall",
        }
    }
}

/// Durable tracking state for one extension id.
///
/// `operation == None` means no operation is in flight or pending
/// acknowledgement; such a record must never surface as "in progress".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub provisioning_state: ProvisioningState,
    #[serde(default = "default_operation_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,
}

impl OperationRecord {
    pub fn is_terminal(&self) -> bool {
        self.provisioning_state.is_terminal()
    }
}

fn default_operation_status() -> u16 {
    DEFAULT_OPERATION_STATUS
}

/// Location of the record document for `id`: `{root}/{id}/operation.json`.
pub fn operation_record_path(root: &Path, id: &str) -> PathBuf {
    root.join(id).join(OPERATION_RECORD_FILE)
}

/// Loads the record for `id`, re-parsing from durable storage. Returns `None`
/// when no record exists.
pub fn load_operation_record(root: &Path, id: &str) -> Result<Option<OperationRecord>> {
    let path = operation_record_path(root, id);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let record = serde_json::from_str::<OperationRecord>(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(record))
}

/// Creates a fresh record for `id`, unconditionally overwriting any prior
/// record: `Created`, status 200, no comment, operation set to `kind`.
pub fn create_operation_record(root: &Path, id: &str, kind: OperationKind) -> Result<OperationRecord> {
    let record = OperationRecord {
        provisioning_state: ProvisioningState::Created,
        status: DEFAULT_OPERATION_STATUS,
        comment: None,
        operation: Some(kind),
    };
    save_operation_record(root, id, &record)?;
    Ok(record)
}

/// Persists `record` with an atomic whole-document replace.
pub fn save_operation_record(root: &Path, id: &str, record: &OperationRecord) -> Result<()> {
    let path = operation_record_path(root, id);
    let mut payload =
        serde_json::to_string_pretty(record).context("failed to encode operation record")?;
    payload.push('\n');
    write_text_atomic(path.as_path(), payload.as_str())
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Deletes the record for `id`. Idempotent: succeeds when the record is
/// already absent.
pub fn delete_operation_record(root: &Path, id: &str) -> Result<()> {
    let path = operation_record_path(root, id);
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))
}
