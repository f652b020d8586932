// 🔏 Data Fingerprint - detect changed source files between runs
//
// SHA-256 of both data files, persisted as JSON. A changed (or first-seen)
// fingerprint means the warehouse should be rebuilt from scratch.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Hex SHA-256 of a file's contents, streamed.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFingerprint {
    pub transactions: String,
    pub clients: String,
}

impl DataFingerprint {
    pub fn compute(transactions_path: &Path, clients_path: &Path) -> Result<Self> {
        Ok(DataFingerprint {
            transactions: file_sha256(transactions_path)?,
            clients: file_sha256(clients_path)?,
        })
    }

    /// Previously saved fingerprint; `None` when missing or unreadable.
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring malformed fingerprint file");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Whether the data files differ from the last recorded fingerprint. The
/// current fingerprint is recorded whenever a rebuild is requested.
pub fn should_clear_database(
    transactions_path: &Path,
    clients_path: &Path,
    hash_file: &Path,
) -> Result<bool> {
    let current = DataFingerprint::compute(transactions_path, clients_path)?;

    match DataFingerprint::load(hash_file) {
        Some(saved) if saved == current => {
            debug!("Data files unchanged since last run");
            Ok(false)
        }
        _ => {
            current.save(hash_file)?;
            Ok(true)
        }
    }
}
