//! Installed toolchain discovery under the rustup home directory.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::Serialize;
use tracing::debug;

use crate::{TaskError, TaskErrorKind};

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub const HOST_TRIPLE: &str = "x86_64-unknown-linux-gnu";
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub const HOST_TRIPLE: &str = "aarch64-unknown-linux-gnu";
#[cfg(all(target_arch = "x86_64", target_os = "macos"))]
pub const HOST_TRIPLE: &str = "x86_64-apple-darwin";
#[cfg(all(target_arch = "aarch64", target_os = "macos"))]
pub const HOST_TRIPLE: &str = "aarch64-apple-darwin";
#[cfg(all(target_arch = "x86_64", target_os = "windows"))]
pub const HOST_TRIPLE: &str = "x86_64-pc-windows-msvc";
#[cfg(not(any(
    all(target_arch = "x86_64", target_os = "linux"),
    all(target_arch = "aarch64", target_os = "linux"),
    all(target_arch = "x86_64", target_os = "macos"),
    all(target_arch = "aarch64", target_os = "macos"),
    all(target_arch = "x86_64", target_os = "windows"),
)))]
pub const HOST_TRIPLE: &str = "unknown";

/// Release channel, ordered the way a toolchain picker lists them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainChannel {
    Stable,
    Beta,
    Nightly,
    /// Pinned release such as `1.85.0`.
    Version(Version),
    /// Custom or linked toolchains (`stage1`, `my-fork`).
    Other(String),
}

/// One installed toolchain. `name` is the directory name with the host triple removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainInfo {
    pub name: String,
    pub channel: ToolchainChannel,
    /// Archive date (`YYYY-MM-DD`) for dated channels.
    pub date: Option<String>,
}

impl ToolchainInfo {
    /// Parse an installed directory name like `nightly-2025-01-04-x86_64-unknown-linux-gnu`.
    /// Names that are not a known channel or a release version are kept as
    /// [`ToolchainChannel::Other`]; only an empty name is an error.
    pub fn from_name(dir_name: &str, host: &str) -> Result<Self, TaskError> {
        let name = dir_name
            .strip_suffix(host)
            .and_then(|s| s.strip_suffix('-'))
            .unwrap_or(dir_name);
        if name.is_empty() {
            return Err(TaskError::new(
                TaskErrorKind::ToolchainParse,
                format!("unrecognised toolchain `{dir_name}`"),
            ));
        }
        let other = || Self {
            name: name.to_string(),
            channel: ToolchainChannel::Other(name.to_string()),
            date: None,
        };
        let mut parts = name.splitn(2, '-');
        let head = parts.next().unwrap_or(name);
        let date = parts.next().map(str::to_string);
        if date.as_deref().is_some_and(|d| !is_date(d)) {
            return Ok(other());
        }
        let channel = match head {
            "stable" => ToolchainChannel::Stable,
            "beta" => ToolchainChannel::Beta,
            "nightly" => ToolchainChannel::Nightly,
            v => match Version::parse(v) {
                Ok(version) => ToolchainChannel::Version(version),
                Err(_) => return Ok(other()),
            },
        };
        Ok(Self {
            name: name.to_string(),
            channel,
            date,
        })
    }
}

impl PartialOrd for ToolchainInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ToolchainInfo {
    /// Undated before dated within a channel; dates ascend.
    fn cmp(&self, other: &Self) -> Ordering {
        self.channel
            .cmp(&other.channel)
            .then_with(|| self.date.cmp(&other.date))
            .then_with(|| self.name.cmp(&other.name))
    }
}

fn is_date(d: &str) -> bool {
    let fields: Vec<&str> = d.split('-').collect();
    matches!(fields.as_slice(), [y, m, day]
        if y.len() == 4 && m.len() == 2 && day.len() == 2
            && fields.iter().all(|f| f.chars().all(|c| c.is_ascii_digit())))
}

/// `$RUSTUP_HOME`, falling back to `~/.rustup`. Missing means rustup is not installed.
pub fn rustup_home() -> Result<PathBuf, TaskError> {
    let home = std::env::var_os("RUSTUP_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".rustup")))
        .ok_or_else(TaskError::missing_toolchain_manager)?;
    if home.is_dir() {
        Ok(home)
    } else {
        Err(TaskError::missing_toolchain_manager())
    }
}

/// Toolchains installed for this host, sorted.
pub fn list_toolchains() -> Result<Vec<ToolchainInfo>, TaskError> {
    list_toolchains_in(&rustup_home()?, HOST_TRIPLE)
}

/// Toolchains under `rustup_home/toolchains` built for `host`, sorted. Entries for other hosts are
/// skipped.
pub fn list_toolchains_in(rustup_home: &Path, host: &str) -> Result<Vec<ToolchainInfo>, TaskError> {
    let dir = rustup_home.join("toolchains");
    let read_err = |e: std::io::Error| {
        TaskError::new(
            TaskErrorKind::ReadingToolchainsDir,
            format!("failed to read {}: {e}", dir.display()),
        )
    };
    let suffix = format!("-{host}");
    let mut found = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if !entry.path().is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.ends_with(&suffix) {
            debug!(target: "tasks.runner", toolchain = name, "toolchain_skipped");
            continue;
        }
        found.push(ToolchainInfo::from_name(name, host)?);
    }
    found.sort();
    Ok(found)
}
