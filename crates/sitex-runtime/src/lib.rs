//! Asynchronous operation lifecycle for installable site extensions.
//!
//! The runtime tracks one durable operation record per extension id, exposes a
//! pure state machine that maps stored records and live catalog lookups onto
//! HTTP-shaped outcomes, and dispatches install/uninstall work to detached
//! background tasks so management-plane clients can acknowledge immediately
//! and poll to completion.

mod descriptor;
mod extension_manager;
mod fs_manager;
mod operation_service;
mod operation_store;
mod operation_tracker;

pub use descriptor::SiteExtensionDescriptor;
pub use extension_manager::{validate_extension_id, SiteExtensionError, SiteExtensionManager};
pub use fs_manager::FsExtensionManager;
pub use operation_service::{InstallOutcome, SiteExtensionService, UninstallOutcome};
pub use operation_store::{
    create_operation_record, delete_operation_record, load_operation_record,
    operation_record_path, save_operation_record, OperationKind, OperationRecord,
    ProvisioningState, OPERATION_RECORD_FILE,
};
pub use operation_tracker::{
    decide_read, decide_sync_install, decide_sync_uninstall, ReadDecision, RecordSideEffect,
    RequestMode,
};
