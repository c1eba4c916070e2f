//! JSON snapshot files for the refresh worker.
//!
//! A snapshot holds everything a refresh needs without external services:
//! groups, addresses with their memberships, and the balances the fixture
//! provider should serve. Writes are atomic (temp file, then rename).

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use gate_balances::{FixtureBalanceProvider, SourceBalances};
use gate_membership::{InMemoryMembershipStore, StoreSnapshot};
use gate_types::validate_group;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub store: StoreSnapshot,
    #[serde(default)]
    pub balances: Vec<SourceBalances>,
    /// Pinned store clock. Absent means the wall clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }

    /// Reject groups that would never have passed group management.
    pub fn validate(&self) -> Result<()> {
        for group in &self.store.groups {
            validate_group(group)
                .with_context(|| format!("Invalid group {} ({})", group.id, group.metadata.name))?;
        }
        Ok(())
    }

    /// Build the store and balance provider described by this snapshot.
    pub fn open(&self) -> Result<(InMemoryMembershipStore, FixtureBalanceProvider)> {
        let store = InMemoryMembershipStore::from_snapshot(self.store.clone())
            .context("Failed to load snapshot into store")?;
        if let Some(now) = self.now {
            store.set_now(now);
        }
        let provider = FixtureBalanceProvider::from_sources(self.balances.iter().cloned());
        Ok((store, provider))
    }

    /// Same snapshot with the store contents replaced by `store`'s.
    pub fn with_store(&self, store: &InMemoryMembershipStore) -> Self {
        Self {
            store: store.to_snapshot(),
            balances: self.balances.clone(),
            now: self.now,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize snapshot: {}", e))?;
        atomic_write(path, &json)
    }
}

/// Write a file atomically (write to .tmp, then rename).
fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("json")
    ));
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_membership::MembershipStore;

    const SNAPSHOT: &str = r#"{
        "now": "2024-06-01T12:00:00Z",
        "groups": [{
            "id": 1,
            "community_id": "dao",
            "metadata": {"name": "holders", "membership_ttl": 600},
            "requirements": [{
                "rule": "threshold",
                "data": {"threshold": "10", "source": {"source_type": "eth_native", "evm_chain_id": 1}}
            }]
        }],
        "addresses": [{"id": 7, "address": "0x1111111111111111111111111111111111111111", "community_id": "dao"}],
        "balances": [{
            "source": {"source_type": "eth_native", "evm_chain_id": 1},
            "balances": {"0x1111111111111111111111111111111111111111": "11"}
        }]
    }"#;

    #[tokio::test]
    async fn test_open_builds_store_and_provider() {
        let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
        snapshot.validate().unwrap();

        let (store, provider) = snapshot.open().unwrap();

        assert_eq!(store.now(), snapshot.now.unwrap());
        assert_eq!(store.community_groups("dao").await.unwrap().len(), 1);
        assert_eq!(store.find_address("dao", "0x1111111111111111111111111111111111111111"), Some(7));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_group() {
        let mut snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
        snapshot.store.groups[0].metadata.required_requirements = Some(3);

        let err = snapshot.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid group 1"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();

        snapshot.save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();

        assert_eq!(loaded, snapshot);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Snapshot::load(Path::new("/nonexistent/snapshot.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read snapshot"));
    }
}
