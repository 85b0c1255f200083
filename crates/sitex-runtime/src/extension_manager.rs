//! Collaborator boundary for feed lookup and install/uninstall mechanics.
//!
//! The operation lifecycle only depends on these signatures plus the
//! guarantee that install/uninstall eventually terminate and are safe to run
//! detached.

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::SiteExtensionDescriptor;

/// Classified failures surfaced by extension manager implementations. The
/// background task records `status_snapshot()` verbatim; the core never
/// reinterprets it.
#[derive(Debug, Error)]
pub enum SiteExtensionError {
    #[error("site extension '{id}' was not found")]
    NotFound { id: String },
    #[error("invalid site extension request: {0}")]
    InvalidRequest(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SiteExtensionError {
    /// HTTP status snapshot stored when a background operation fails with
    /// this error.
    pub fn status_snapshot(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            _ => 400,
        }
    }
}

/// Rejects ids that would escape the per-extension folder layout.
pub fn validate_extension_id(id: &str) -> Result<(), SiteExtensionError> {
    if id.is_empty() {
        return Err(SiteExtensionError::InvalidRequest(
            "extension id must be non-empty".to_string(),
        ));
    }
    let safe = id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
    if !safe || id.starts_with('.') {
        return Err(SiteExtensionError::InvalidRequest(format!(
            "extension id '{id}' contains unsupported characters"
        )));
    }
    Ok(())
}

/// External extension-management collaborator.
#[async_trait]
pub trait SiteExtensionManager: Send + Sync {
    async fn get_remote_extensions(
        &self,
        filter: Option<&str>,
        allow_prerelease: bool,
        feed_url: Option<&str>,
    ) -> Result<Vec<SiteExtensionDescriptor>, SiteExtensionError>;

    async fn get_remote_extension(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError>;

    async fn get_local_extensions(
        &self,
        filter: Option<&str>,
        check_latest: bool,
    ) -> Result<Vec<SiteExtensionDescriptor>, SiteExtensionError>;

    async fn get_local_extension(
        &self,
        id: &str,
        check_latest: bool,
    ) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError>;

    /// Installs (or updates) an extension; must eventually terminate.
    async fn install_extension(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError>;

    /// Uninstalls an extension; must eventually terminate.
    async fn uninstall_extension(&self, id: &str) -> Result<bool, SiteExtensionError>;

    /// Builds the acknowledgement descriptor before async install work
    /// begins.
    async fn init_install_descriptor(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError>;

    /// Builds the acknowledgement descriptor before async uninstall work
    /// begins.
    async fn init_uninstall_descriptor(
        &self,
        id: &str,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_validate_extension_id_accepts_package_style_names() {
        for id in ["logstream", "Log.Stream-2", "a_b"] {
            assert!(validate_extension_id(id).is_ok(), "id {id} should pass");
        }
    }

    #[test]
    fn unit_validate_extension_id_rejects_path_escapes() {
        for id in ["", "..", "a/b", "a\\b", ".hidden", "a b"] {
            assert!(validate_extension_id(id).is_err(), "id {id:?} should fail");
        }
    }

    #[test]
    fn unit_status_snapshot_classifies_error_taxonomy() {
        let not_found = SiteExtensionError::NotFound {
            id: "x".to_string(),
        };
        assert_eq!(not_found.status_snapshot(), 404);
        let invalid = SiteExtensionError::InvalidRequest("bad".to_string());
        assert_eq!(invalid.status_snapshot(), 400);
    }
}
