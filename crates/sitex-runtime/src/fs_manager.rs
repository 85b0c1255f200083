//! Filesystem-backed extension manager.
//!
//! The feed root holds one `{id}.json` descriptor per available package; the
//! install root holds one directory per installed extension containing its
//! `extension.json` manifest. Install mechanics reduce to resolving the feed
//! entry and materializing the manifest, which keeps the manager safe to run
//! detached and deterministic under test.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sitex_core::write_text_atomic;

use crate::descriptor::SiteExtensionDescriptor;
use crate::extension_manager::{validate_extension_id, SiteExtensionError, SiteExtensionManager};

const INSTALLED_MANIFEST_FILE: &str = "extension.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedEntry {
    #[serde(flatten)]
    descriptor: SiteExtensionDescriptor,
    #[serde(default)]
    prerelease: bool,
}

/// Extension manager over two directory roots: an available-package feed and
/// an installed set.
#[derive(Debug, Clone)]
pub struct FsExtensionManager {
    feed_root: PathBuf,
    install_root: PathBuf,
}

impl FsExtensionManager {
    pub fn new(feed_root: PathBuf, install_root: PathBuf) -> Self {
        Self {
            feed_root,
            install_root,
        }
    }

    pub fn install_root(&self) -> &Path {
        self.install_root.as_path()
    }

    fn feed_entry_path(&self, id: &str) -> PathBuf {
        self.feed_root.join(format!("{id}.json"))
    }

    fn installed_dir(&self, id: &str) -> PathBuf {
        self.install_root.join(id)
    }

    fn installed_manifest_path(&self, id: &str) -> PathBuf {
        self.installed_dir(id).join(INSTALLED_MANIFEST_FILE)
    }

    fn load_feed_entry(&self, id: &str) -> Result<Option<FeedEntry>, SiteExtensionError> {
        let path = self.feed_entry_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let entry = serde_json::from_str::<FeedEntry>(&raw)?;
        Ok(Some(entry))
    }

    fn load_installed(&self, id: &str) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError> {
        let path = self.installed_manifest_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let descriptor = serde_json::from_str::<SiteExtensionDescriptor>(&raw)?;
        Ok(Some(descriptor))
    }

    fn fill_latest_marker(
        &self,
        descriptor: &mut SiteExtensionDescriptor,
    ) -> Result<(), SiteExtensionError> {
        let latest = match self.load_feed_entry(&descriptor.id)? {
            Some(entry) => entry.descriptor.version == descriptor.version,
            // No feed entry to compare against: nothing newer is known.
            None => true,
        };
        descriptor.local_is_latest_version = Some(latest);
        Ok(())
    }
}

fn matches_filter(descriptor: &SiteExtensionDescriptor, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    let needle = filter.to_ascii_lowercase();
    if needle.is_empty() {
        return true;
    }
    let id_hit = descriptor.id.to_ascii_lowercase().contains(&needle);
    let title_hit = descriptor
        .title
        .as_deref()
        .map(|title| title.to_ascii_lowercase().contains(&needle))
        .unwrap_or(false);
    id_hit || title_hit
}

#[async_trait]
impl SiteExtensionManager for FsExtensionManager {
    async fn get_remote_extensions(
        &self,
        filter: Option<&str>,
        allow_prerelease: bool,
        feed_url: Option<&str>,
    ) -> Result<Vec<SiteExtensionDescriptor>, SiteExtensionError> {
        if !self.feed_root.exists() {
            return Ok(Vec::new());
        }
        let mut descriptors = Vec::new();
        for entry in std::fs::read_dir(&self.feed_root)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .and_then(|value| value.to_str())
                .map(|value| value.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !path.is_file() || !is_json {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let feed_entry = serde_json::from_str::<FeedEntry>(&raw)?;
            if feed_entry.prerelease && !allow_prerelease {
                continue;
            }
            let mut descriptor = feed_entry.descriptor;
            if descriptor.feed_url.is_none() {
                descriptor.feed_url = feed_url.map(str::to_string);
            }
            if matches_filter(&descriptor, filter) {
                descriptors.push(descriptor);
            }
        }
        descriptors.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(descriptors)
    }

    async fn get_remote_extension(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError> {
        validate_extension_id(id)?;
        let Some(entry) = self.load_feed_entry(id)? else {
            return Ok(None);
        };
        if let Some(requested) = version {
            if entry.descriptor.version.as_deref() != Some(requested) {
                return Ok(None);
            }
        }
        let mut descriptor = entry.descriptor;
        if descriptor.feed_url.is_none() {
            descriptor.feed_url = feed_url.map(str::to_string);
        }
        Ok(Some(descriptor))
    }

    async fn get_local_extensions(
        &self,
        filter: Option<&str>,
        check_latest: bool,
    ) -> Result<Vec<SiteExtensionDescriptor>, SiteExtensionError> {
        if !self.install_root.exists() {
            return Ok(Vec::new());
        }
        let mut descriptors = Vec::new();
        for entry in std::fs::read_dir(&self.install_root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(id) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(mut descriptor) = self.load_installed(id)? else {
                continue;
            };
            if !matches_filter(&descriptor, filter) {
                continue;
            }
            if check_latest {
                self.fill_latest_marker(&mut descriptor)?;
            }
            descriptors.push(descriptor);
        }
        descriptors.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(descriptors)
    }

    async fn get_local_extension(
        &self,
        id: &str,
        check_latest: bool,
    ) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError> {
        validate_extension_id(id)?;
        let Some(mut descriptor) = self.load_installed(id)? else {
            return Ok(None);
        };
        if check_latest {
            self.fill_latest_marker(&mut descriptor)?;
        }
        Ok(Some(descriptor))
    }

    async fn install_extension(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError> {
        validate_extension_id(id)?;
        let Some(entry) = self.load_feed_entry(id)? else {
            return Err(SiteExtensionError::NotFound { id: id.to_string() });
        };
        if let Some(requested) = version {
            if entry.descriptor.version.as_deref() != Some(requested) {
                return Err(SiteExtensionError::NotFound { id: id.to_string() });
            }
        }

        let mut descriptor = entry.descriptor;
        descriptor.local_path = Some(self.installed_dir(id).display().to_string());
        if descriptor.feed_url.is_none() {
            descriptor.feed_url = feed_url.map(str::to_string);
        }

        let manifest_path = self.installed_manifest_path(id);
        let mut payload = serde_json::to_string_pretty(&descriptor)?;
        payload.push('\n');
        write_text_atomic(manifest_path.as_path(), payload.as_str()).map_err(|error| {
            SiteExtensionError::InvalidRequest(format!(
                "failed to materialize extension manifest: {error}"
            ))
        })?;
        Ok(descriptor)
    }

    async fn uninstall_extension(&self, id: &str) -> Result<bool, SiteExtensionError> {
        validate_extension_id(id)?;
        let dir = self.installed_dir(id);
        if !dir.exists() {
            return Err(SiteExtensionError::NotFound { id: id.to_string() });
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    async fn init_install_descriptor(
        &self,
        id: &str,
        version: Option<&str>,
        feed_url: Option<&str>,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError> {
        validate_extension_id(id)?;
        let mut descriptor = match self.load_feed_entry(id)? {
            Some(entry) => entry.descriptor,
            None => SiteExtensionDescriptor::empty(id),
        };
        if version.is_some() {
            descriptor.version = version.map(str::to_string);
        }
        if feed_url.is_some() {
            descriptor.feed_url = feed_url.map(str::to_string);
        }
        Ok(descriptor)
    }

    async fn init_uninstall_descriptor(
        &self,
        id: &str,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError> {
        validate_extension_id(id)?;
        Ok(self
            .load_installed(id)?
            .unwrap_or_else(|| SiteExtensionDescriptor::empty(id)))
    }
}
