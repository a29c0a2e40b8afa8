//! Cache-directory layout and binary discovery.
//!
//! Installed browsers live under `<cache>/vibium/chrome-for-testing/<version>/`
//! using the directory names the Chrome for Testing archives unpack to.

use std::path::PathBuf;

use crate::{Error, Result};

/// Root cache directory (`~/.cache/vibium` on Linux).
pub fn cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|d| d.join("vibium"))
        .ok_or_else(|| Error::Install("could not determine cache directory".to_string()))
}

/// Directory holding per-version Chrome for Testing installs.
pub fn chrome_for_testing_dir() -> Result<PathBuf> {
    Ok(cache_dir()?.join("chrome-for-testing"))
}

/// Platform string used by the Chrome for Testing download endpoints.
pub fn platform() -> Result<&'static str> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Ok("linux64"),
        ("macos", "aarch64") => Ok("mac-arm64"),
        ("macos", "x86_64") => Ok("mac-x64"),
        ("windows", _) => Ok("win64"),
        (os, arch) => Err(Error::Install(format!(
            "unsupported platform: {os}/{arch}"
        ))),
    }
}

/// Path to the newest installed Chrome binary.
pub fn chrome_executable() -> Result<PathBuf> {
    let platform = platform()?;
    let version_dir = newest_version_dir()?;
    let relative = match platform {
        "linux64" => PathBuf::from("chrome-linux64").join("chrome"),
        "mac-arm64" | "mac-x64" => PathBuf::from(format!("chrome-{platform}"))
            .join("Google Chrome for Testing.app")
            .join("Contents")
            .join("MacOS")
            .join("Google Chrome for Testing"),
        _ => PathBuf::from("chrome-win64").join("chrome.exe"),
    };
    let path = version_dir.join(relative);
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Install("chrome not installed".to_string()))
    }
}

/// Path to the newest installed chromedriver binary.
pub fn chromedriver_path() -> Result<PathBuf> {
    let platform = platform()?;
    let version_dir = newest_version_dir()?;
    let binary = if platform == "win64" {
        "chromedriver.exe"
    } else {
        "chromedriver"
    };
    let path = version_dir
        .join(format!("chromedriver-{platform}"))
        .join(binary);
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Install("chromedriver not installed".to_string()))
    }
}

/// The highest-versioned directory under the Chrome for Testing cache.
fn newest_version_dir() -> Result<PathBuf> {
    let root = chrome_for_testing_dir()?;
    let mut versions: Vec<String> = Vec::new();
    let entries = std::fs::read_dir(&root)
        .map_err(|_| Error::Install("no browsers installed (run 'vibium install')".to_string()))?;
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                versions.push(name.to_string());
            }
        }
    }
    versions.sort_by(|a, b| compare_versions(a, b));
    versions
        .pop()
        .map(|v| root.join(v))
        .ok_or_else(|| Error::Install("no browsers installed (run 'vibium install')".to_string()))
}

/// Order dotted version strings numerically, component by component.
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    parse(a).cmp(&parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn versions_compare_numerically_not_lexically() {
        assert_eq!(compare_versions("121.0.6167.85", "121.0.6167.9"), Ordering::Greater);
        assert_eq!(compare_versions("120.0.1", "121.0.0"), Ordering::Less);
        assert_eq!(compare_versions("121.0.0", "121.0.0"), Ordering::Equal);
    }

    #[test]
    fn platform_is_known_on_supported_hosts() {
        // The build host must be one of the supported platforms.
        assert!(!platform().unwrap().is_empty());
    }
}
