//! Pure decision logic for read requests and synchronous completions.
//!
//! Maps `(stored record, live lookup result, request mode)` onto the response
//! status, the response body descriptor, the restart notification flag, and
//! the side effect the dispatcher must apply to the record. Keeping this free
//! of I/O lets every row of the lifecycle be tested directly.

use crate::descriptor::SiteExtensionDescriptor;
use crate::operation_store::{OperationKind, OperationRecord, ProvisioningState};

const STATUS_OK: u16 = 200;
const STATUS_NOT_FOUND: u16 = 404;

const INSTALL_ANOMALY_COMMENT: &str =
    "install reported success but the extension is not present in the installed set; poll again to reconcile";

/// How the caller expects the operation protocol to behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Accept-now/poll-later: immediate acknowledgement, repeated reads until
    /// a terminal outcome.
    Async,
    /// Block until the operation fully completes before responding.
    Sync,
}

/// Record mutation the dispatcher must apply after delivering a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSideEffect {
    None,
    /// Clear `operation` back to `None`: the terminal outcome has been
    /// delivered and must not repeat its notification.
    ClearOperation,
    /// Delete the record entirely: the extension no longer exists, tracking
    /// it is pointless.
    DeleteRecord,
}

/// Outcome of resolving a read request against the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadDecision {
    pub status: u16,
    pub descriptor: SiteExtensionDescriptor,
    /// Set exactly when an install's terminal success is delivered for the
    /// first time; the transport surfaces it as a restart notification.
    pub restart_required: bool,
    pub side_effect: RecordSideEffect,
}

impl ReadDecision {
    fn ok(descriptor: SiteExtensionDescriptor) -> Self {
        Self {
            status: STATUS_OK,
            descriptor,
            restart_required: false,
            side_effect: RecordSideEffect::None,
        }
    }

    fn not_found(id: &str) -> Self {
        Self {
            status: STATUS_NOT_FOUND,
            descriptor: SiteExtensionDescriptor::empty(id),
            restart_required: false,
            side_effect: RecordSideEffect::None,
        }
    }
}

/// Descriptor surfaced while an operation record speaks for the extension:
/// the live metadata when present, otherwise a placeholder, with the record's
/// tracking fields overlaid either way.
fn record_descriptor(
    id: &str,
    record: &OperationRecord,
    live: Option<&SiteExtensionDescriptor>,
) -> SiteExtensionDescriptor {
    let mut descriptor = live
        .cloned()
        .unwrap_or_else(|| SiteExtensionDescriptor::empty(id));
    descriptor.overlay_record(record);
    descriptor
}

/// Resolves a read request per the operation lifecycle decision table.
pub fn decide_read(
    id: &str,
    record: Option<&OperationRecord>,
    live: Option<&SiteExtensionDescriptor>,
    mode: RequestMode,
) -> ReadDecision {
    if mode == RequestMode::Sync {
        // No polling protocol: reflect the installed set directly.
        return match live {
            Some(found) => ReadDecision::ok(found.clone()),
            None => ReadDecision::not_found(id),
        };
    }

    let Some(record) = record else {
        return match live {
            Some(found) => ReadDecision::ok(found.clone()),
            None => ReadDecision::not_found(id),
        };
    };

    let Some(operation) = record.operation else {
        // Residual record already drained by a poller: surface live state
        // with the stored fields overlaid, never as "in progress".
        return match live {
            Some(found) => {
                let mut descriptor = found.clone();
                descriptor.overlay_record(record);
                ReadDecision::ok(descriptor)
            }
            None => ReadDecision::not_found(id),
        };
    };

    if !record.is_terminal() {
        return ReadDecision {
            status: record.status,
            descriptor: record_descriptor(id, record, live),
            restart_required: false,
            side_effect: RecordSideEffect::None,
        };
    }

    match (operation, record.provisioning_state) {
        (OperationKind::Uninstall, ProvisioningState::Succeeded) => ReadDecision {
            status: record.status,
            descriptor: record_descriptor(id, record, live),
            restart_required: false,
            side_effect: RecordSideEffect::DeleteRecord,
        },
        (OperationKind::Install, ProvisioningState::Succeeded) => match live {
            Some(found) => {
                let mut descriptor = found.clone();
                descriptor.overlay_record(record);
                ReadDecision {
                    status: STATUS_OK,
                    descriptor,
                    restart_required: true,
                    side_effect: RecordSideEffect::ClearOperation,
                }
            }
            // The record asserts success but the installed set disagrees:
            // report the inconsistency and keep the operation flag so a
            // retry can reconcile.
            None => {
                let mut descriptor = SiteExtensionDescriptor::empty(id);
                descriptor.provisioning_state = Some(record.provisioning_state);
                descriptor.comment = Some(INSTALL_ANOMALY_COMMENT.to_string());
                ReadDecision {
                    status: STATUS_NOT_FOUND,
                    descriptor,
                    restart_required: false,
                    side_effect: RecordSideEffect::None,
                }
            }
        },
        // Terminal failures stay on disk for diagnosis.
        _ => ReadDecision {
            status: record.status,
            descriptor: record_descriptor(id, record, live),
            restart_required: false,
            side_effect: RecordSideEffect::None,
        },
    }
}

/// Terminal mapping applied after a synchronous install ran inline.
///
/// Success consumes the record in the same request (operation cleared, no
/// restart notification); failure surfaces the stored status and comment and
/// leaves the record untouched.
pub fn decide_sync_install(
    id: &str,
    record: &OperationRecord,
    live: Option<&SiteExtensionDescriptor>,
) -> ReadDecision {
    if record.provisioning_state == ProvisioningState::Failed {
        return ReadDecision {
            status: record.status,
            descriptor: record_descriptor(id, record, live),
            restart_required: false,
            side_effect: RecordSideEffect::None,
        };
    }
    match live {
        Some(found) => {
            let mut descriptor = found.clone();
            descriptor.overlay_record(record);
            ReadDecision {
                status: STATUS_OK,
                descriptor,
                restart_required: false,
                side_effect: RecordSideEffect::ClearOperation,
            }
        }
        None => {
            let mut descriptor = SiteExtensionDescriptor::empty(id);
            descriptor.provisioning_state = Some(record.provisioning_state);
            descriptor.comment = Some(INSTALL_ANOMALY_COMMENT.to_string());
            ReadDecision {
                status: STATUS_NOT_FOUND,
                descriptor,
                restart_required: false,
                side_effect: RecordSideEffect::None,
            }
        }
    }
}

/// Terminal mapping applied after a synchronous uninstall ran inline.
pub fn decide_sync_uninstall(id: &str, record: &OperationRecord) -> ReadDecision {
    if record.provisioning_state == ProvisioningState::Failed {
        return ReadDecision {
            status: record.status,
            descriptor: record_descriptor(id, record, None),
            restart_required: false,
            side_effect: RecordSideEffect::None,
        };
    }
    ReadDecision {
        status: STATUS_OK,
        descriptor: record_descriptor(id, record, None),
        restart_required: false,
        side_effect: RecordSideEffect::DeleteRecord,
    }
}
