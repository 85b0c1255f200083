//! Request dispatcher for the site extension operation lifecycle.
//!
//! Mutating requests create the operation record synchronously, then either
//! hand the work to a detached background task (async mode) and acknowledge
//! immediately, or run the same body inline (sync mode) and apply the
//! terminal mapping before responding. Read requests load the record, fetch
//! the live descriptor, and defer to the pure decision logic.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::descriptor::SiteExtensionDescriptor;
use crate::extension_manager::{validate_extension_id, SiteExtensionManager};
use crate::operation_store::{
    create_operation_record, delete_operation_record, load_operation_record,
    save_operation_record, OperationKind, OperationRecord, ProvisioningState,
};
use crate::operation_tracker::{
    decide_read, decide_sync_install, decide_sync_uninstall, ReadDecision, RecordSideEffect,
    RequestMode,
};

/// Result of an install request, shaped for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Async acknowledgement: respond 201 and expect polling.
    Accepted(SiteExtensionDescriptor),
    /// Sync completion: respond 200 with the final descriptor.
    Completed(SiteExtensionDescriptor),
    /// Sync failure: respond with the stored status snapshot.
    Failed {
        status: u16,
        descriptor: SiteExtensionDescriptor,
    },
}

/// Result of an uninstall request, shaped for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// Async acknowledgement: respond 202 and expect polling.
    Accepted(SiteExtensionDescriptor),
    /// Sync completion: respond 200 with a boolean success indicator.
    Completed(bool),
    /// Sync failure: respond with the stored status snapshot.
    Failed {
        status: u16,
        descriptor: SiteExtensionDescriptor,
    },
}

/// Dispatcher tying the record store, the decision logic, and the extension
/// manager together.
#[derive(Clone)]
pub struct SiteExtensionService {
    manager: Arc<dyn SiteExtensionManager>,
    settings_root: PathBuf,
}

impl SiteExtensionService {
    pub fn new(manager: Arc<dyn SiteExtensionManager>, settings_root: PathBuf) -> Self {
        Self {
            manager,
            settings_root,
        }
    }

    pub fn settings_root(&self) -> &Path {
        self.settings_root.as_path()
    }

    /// Installs an extension. Both modes first overwrite the operation record;
    /// async mode acknowledges with the freshly created record, sync mode
    /// awaits the work inline and applies the terminal mapping.
    pub async fn install(
        &self,
        id: &str,
        version: Option<String>,
        feed_url: Option<String>,
        mode: RequestMode,
    ) -> Result<InstallOutcome> {
        validate_extension_id(id)?;
        let record = create_operation_record(&self.settings_root, id, OperationKind::Install)?;
        let mut descriptor = self
            .manager
            .init_install_descriptor(id, version.as_deref(), feed_url.as_deref())
            .await?;
        descriptor.overlay_record(&record);

        match mode {
            RequestMode::Async => {
                let manager = Arc::clone(&self.manager);
                let settings_root = self.settings_root.clone();
                let id = id.to_string();
                spawn_detached(async move {
                    if let Err(error) =
                        run_install(manager, settings_root, id.clone(), version, feed_url).await
                    {
                        warn!(id = %id, %error, "background install could not persist its outcome");
                    }
                });
                Ok(InstallOutcome::Accepted(descriptor))
            }
            RequestMode::Sync => {
                run_install(
                    Arc::clone(&self.manager),
                    self.settings_root.clone(),
                    id.to_string(),
                    version,
                    feed_url,
                )
                .await?;
                let record = load_operation_record(&self.settings_root, id)?
                    .context("operation record missing after synchronous install")?;
                let live = self.manager.get_local_extension(id, false).await?;
                let decision = decide_sync_install(id, &record, live.as_ref());
                self.apply_side_effect(id, &record, decision.side_effect)?;
                if record.provisioning_state == ProvisioningState::Failed
                    || decision.status != 200
                {
                    Ok(InstallOutcome::Failed {
                        status: decision.status,
                        descriptor: decision.descriptor,
                    })
                } else {
                    Ok(InstallOutcome::Completed(decision.descriptor))
                }
            }
        }
    }

    /// Uninstalls an extension; see [`SiteExtensionService::install`] for the
    /// mode split.
    pub async fn uninstall(&self, id: &str, mode: RequestMode) -> Result<UninstallOutcome> {
        validate_extension_id(id)?;
        let record = create_operation_record(&self.settings_root, id, OperationKind::Uninstall)?;
        let mut descriptor = self.manager.init_uninstall_descriptor(id).await?;
        descriptor.overlay_record(&record);

        match mode {
            RequestMode::Async => {
                let manager = Arc::clone(&self.manager);
                let settings_root = self.settings_root.clone();
                let id = id.to_string();
                spawn_detached(async move {
                    if let Err(error) =
                        run_uninstall(manager, settings_root, id.clone()).await
                    {
                        warn!(id = %id, %error, "background uninstall could not persist its outcome");
                    }
                });
                Ok(UninstallOutcome::Accepted(descriptor))
            }
            RequestMode::Sync => {
                run_uninstall(
                    Arc::clone(&self.manager),
                    self.settings_root.clone(),
                    id.to_string(),
                )
                .await?;
                let record = load_operation_record(&self.settings_root, id)?
                    .context("operation record missing after synchronous uninstall")?;
                let decision = decide_sync_uninstall(id, &record);
                self.apply_side_effect(id, &record, decision.side_effect)?;
                if record.provisioning_state == ProvisioningState::Failed {
                    Ok(UninstallOutcome::Failed {
                        status: decision.status,
                        descriptor: decision.descriptor,
                    })
                } else {
                    Ok(UninstallOutcome::Completed(true))
                }
            }
        }
    }

    /// Resolves a read of one installed extension per the decision table and
    /// applies the resulting record side effect.
    pub async fn get_local(
        &self,
        id: &str,
        check_latest: bool,
        mode: RequestMode,
    ) -> Result<ReadDecision> {
        validate_extension_id(id)?;
        let record = load_operation_record(&self.settings_root, id)?;
        let live = self.manager.get_local_extension(id, check_latest).await?;
        let decision = decide_read(id, record.as_ref(), live.as_ref(), mode);
        if let Some(record) = record.as_ref() {
            self.apply_side_effect(id, record, decision.side_effect)?;
        }
        Ok(decision)
    }

    /// Pass-through listing of installed extensions.
    pub async fn list_local(
        &self,
        filter: Option<&str>,
        check_latest: bool,
    ) -> Result<Vec<SiteExtensionDescriptor>> {
        Ok(self.manager.get_local_extensions(filter, check_latest).await?)
    }

    /// Pass-through listing of the feed.
    pub async fn list_remote(
        &self,
        filter: Option<&str>,
        allow_prerelease: bool,
        feed_url: Option<&str>,
    ) -> Result<Vec<SiteExtensionDescriptor>> {
        Ok(self
            .manager
            .get_remote_extensions(filter, allow_prerelease, feed_url)
            .await?)
    }

    /// Pass-through lookup of one feed entry.
    pub async fn get_remote(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<Option<SiteExtensionDescriptor>> {
        Ok(self
            .manager
            .get_remote_extension(id, version, feed_url)
            .await?)
    }

    fn apply_side_effect(
        &self,
        id: &str,
        record: &OperationRecord,
        side_effect: RecordSideEffect,
    ) -> Result<()> {
        match side_effect {
            RecordSideEffect::None => Ok(()),
            RecordSideEffect::ClearOperation => {
                let mut cleared = record.clone();
                cleared.operation = None;
                save_operation_record(&self.settings_root, id, &cleared)
            }
            RecordSideEffect::DeleteRecord => delete_operation_record(&self.settings_root, id),
        }
    }
}

/// Background body shared by both modes: mark the record `Running`, invoke
/// the manager, persist the terminal outcome. Concurrent operations for one
/// id are not serialized; the record is last-writer-wins.
async fn run_install(
    manager: Arc<dyn SiteExtensionManager>,
    settings_root: PathBuf,
    id: String,
    version: Option<String>,
    feed_url: Option<String>,
) -> Result<()> {
    let mut record = mark_running(&settings_root, &id, OperationKind::Install)?;
    match manager
        .install_extension(&id, version.as_deref(), feed_url.as_deref())
        .await
    {
        Ok(_descriptor) => {
            record.provisioning_state = ProvisioningState::Succeeded;
            record.status = 200;
            record.comment = None;
        }
        Err(error) => {
            record.provisioning_state = ProvisioningState::Failed;
            record.status = error.status_snapshot();
            record.comment = Some(error.to_string());
        }
    }
    save_operation_record(&settings_root, &id, &record)?;
    info!(
        id = %id,
        state = record.provisioning_state.as_str(),
        status = record.status,
        "site extension install finished"
    );
    Ok(())
}

async fn run_uninstall(
    manager: Arc<dyn SiteExtensionManager>,
    settings_root: PathBuf,
    id: String,
) -> Result<()> {
    let mut record = mark_running(&settings_root, &id, OperationKind::Uninstall)?;
    match manager.uninstall_extension(&id).await {
        Ok(_removed) => {
            record.provisioning_state = ProvisioningState::Succeeded;
            record.status = 200;
            record.comment = None;
        }
        Err(error) => {
            record.provisioning_state = ProvisioningState::Failed;
            record.status = error.status_snapshot();
            record.comment = Some(error.to_string());
        }
    }
    save_operation_record(&settings_root, &id, &record)?;
    info!(
        id = %id,
        state = record.provisioning_state.as_str(),
        status = record.status,
        "site extension uninstall finished"
    );
    Ok(())
}

fn mark_running(settings_root: &Path, id: &str, kind: OperationKind) -> Result<OperationRecord> {
    let mut record = match load_operation_record(settings_root, id)? {
        Some(record) => record,
        // The acknowledgement record was removed between dispatch and start;
        // recreate it so the outcome still lands somewhere observable.
        None => create_operation_record(settings_root, id, kind)?,
    };
    record.provisioning_state = ProvisioningState::Running;
    save_operation_record(settings_root, id, &record)?;
    Ok(record)
}

fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(future);
        return;
    }

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match runtime {
            Ok(runtime) => runtime.block_on(future),
            Err(error) => eprintln!("site extension background worker bootstrap failed: {error}"),
        }
    });
}
