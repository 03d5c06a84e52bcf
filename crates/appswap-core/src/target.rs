use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// What an update session acts on. Fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    download_url: String,
    installed_bundle_path: PathBuf,
    watched_process_id: Option<u32>,
}

impl UpdateTarget {
    pub fn new(
        download_url: impl Into<String>,
        installed_bundle_path: impl Into<PathBuf>,
        watched_process_id: Option<u32>,
    ) -> Result<Self> {
        let download_url = download_url.into().trim().to_string();
        validate_download_url(&download_url)?;

        let installed_bundle_path = installed_bundle_path.into();
        if installed_bundle_path.file_name().is_none() {
            return Err(anyhow!(
                "installed bundle path must name a bundle: {}",
                installed_bundle_path.display()
            ));
        }

        Ok(Self {
            download_url,
            installed_bundle_path,
            watched_process_id,
        })
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn installed_bundle_path(&self) -> &Path {
        &self.installed_bundle_path
    }

    pub fn watched_process_id(&self) -> Option<u32> {
        self.watched_process_id
    }
}

fn validate_download_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("download url must not be empty"));
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(anyhow!("download url has no scheme: {url}"));
    };
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return Err(anyhow!(
            "unsupported download url scheme '{scheme}'; expected http or https"
        ));
    }
    if rest.is_empty() || rest.starts_with('/') {
        return Err(anyhow!("download url has no host: {url}"));
    }

    Ok(())
}
