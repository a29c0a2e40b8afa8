//! Chrome for Testing installation.
//!
//! Downloads the latest Stable Chrome for Testing build and its matching
//! chromedriver from the known-good-versions endpoints and unpacks them into
//! the per-version cache directory.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;
use zip::ZipArchive;

use super::paths;
use crate::{Error, Result};

const LAST_KNOWN_GOOD_URL: &str =
    "https://googlechromelabs.github.io/chrome-for-testing/last-known-good-versions-with-downloads.json";

/// Environment variable that forbids downloads entirely.
pub const SKIP_DOWNLOAD_ENV: &str = "VIBIUM_SKIP_BROWSER_DOWNLOAD";

/// Paths to the installed binaries.
#[derive(Debug)]
pub struct InstallResult {
    pub chrome_path: PathBuf,
    pub chromedriver_path: PathBuf,
    pub version: String,
}

#[derive(Deserialize)]
struct LastKnownGood {
    channels: HashMap<String, Channel>,
}

#[derive(Deserialize)]
struct Channel {
    version: String,
    downloads: HashMap<String, Vec<Download>>,
}

#[derive(Deserialize)]
struct Download {
    platform: String,
    url: String,
}

/// Download and install Chrome for Testing plus chromedriver.
pub async fn install() -> Result<InstallResult> {
    if std::env::var(SKIP_DOWNLOAD_ENV).as_deref() == Ok("1") {
        return Err(Error::Install(format!(
            "browser download skipped ({SKIP_DOWNLOAD_ENV}=1)"
        )));
    }

    let platform = paths::platform()?;
    let known_good: LastKnownGood = reqwest::get(LAST_KNOWN_GOOD_URL).await?.json().await?;
    let stable = known_good
        .channels
        .get("Stable")
        .ok_or_else(|| Error::Install("no Stable channel in version feed".to_string()))?;

    info!(version = %stable.version, "installing Chrome for Testing");

    let version_dir = paths::chrome_for_testing_dir()?.join(&stable.version);
    std::fs::create_dir_all(&version_dir)?;

    for kind in ["chrome", "chromedriver"] {
        let url = stable
            .downloads
            .get(kind)
            .and_then(|downloads| downloads.iter().find(|d| d.platform == platform))
            .map(|d| d.url.as_str())
            .ok_or_else(|| {
                Error::Install(format!("no {kind} download available for platform {platform}"))
            })?;
        info!(url, "downloading {kind}");
        let bytes = reqwest::get(url).await?.bytes().await?;
        extract_zip(&bytes, &version_dir)?;
    }

    let chrome_path = paths::chrome_executable()
        .map_err(|e| Error::Install(format!("chrome installed but not found: {e}")))?;
    let chromedriver_path = paths::chromedriver_path()
        .map_err(|e| Error::Install(format!("chromedriver installed but not found: {e}")))?;

    mark_executable(&chrome_path)?;
    mark_executable(&chromedriver_path)?;

    Ok(InstallResult {
        chrome_path,
        chromedriver_path,
        version: stable.version.clone(),
    })
}

/// Unpack a zip archive into `dest`, preserving the archive's directory
/// structure and unix modes.
fn extract_zip(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Install(format!("bad archive: {e}")))?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::Install(format!("bad archive entry: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        std::fs::write(&target, contents)?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_feed_deserializes() {
        let feed = r#"{
            "timestamp": "2024-01-01T00:00:00.000Z",
            "channels": {
                "Stable": {
                    "channel": "Stable",
                    "version": "121.0.6167.85",
                    "revision": "1233107",
                    "downloads": {
                        "chrome": [
                            {"platform": "linux64", "url": "https://example.com/chrome-linux64.zip"}
                        ],
                        "chromedriver": [
                            {"platform": "linux64", "url": "https://example.com/chromedriver-linux64.zip"}
                        ]
                    }
                }
            }
        }"#;
        let parsed: LastKnownGood = serde_json::from_str(feed).unwrap();
        let stable = parsed.channels.get("Stable").unwrap();
        assert_eq!(stable.version, "121.0.6167.85");
        assert_eq!(stable.downloads["chrome"][0].platform, "linux64");
    }

    #[test]
    fn skip_env_blocks_downloads() {
        std::env::set_var(SKIP_DOWNLOAD_ENV, "1");
        let err = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(install())
            .unwrap_err();
        std::env::remove_var(SKIP_DOWNLOAD_ENV);
        assert!(err.to_string().contains(SKIP_DOWNLOAD_ENV));
    }
}
