use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Settings, Subscription},
    core::{catalog::Node, tester::TestProgress, traffic::TrafficSnapshot},
    error::{Error, Result},
    logging,
    utils::logging::Type,
};

/// The durable document. Collections are always replaced as whole values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub settings: Settings,
    pub subscriptions: Vec<Subscription>,
    pub nodes: Vec<Node>,
    pub proxy_group: Vec<String>,
    pub current_node: String,
    pub is_testing: bool,
    pub test_total: usize,
    pub test_progress: Option<TestProgress>,
    pub traffic_info: TrafficSnapshot,
    pub traffic_error: Option<String>,
    pub connection_error: Option<String>,
}

/// Single writer of the snapshot.
///
/// Every update persists the full document before it becomes visible, so
/// readers never observe a state that is not on disk.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    data: RwLock<Snapshot>,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let text = fs::read(&path)
                .map_err(|e| Error::Storage(format!("failed to read {}: {e}", path.display())))?;
            serde_json::from_slice(&text).map_err(|e| {
                Error::Storage(format!("corrupt snapshot {}: {e}", path.display()))
            })?
        } else {
            logging!(
                info,
                Type::Storage,
                "no snapshot at {}, starting empty",
                path.display()
            );
            Snapshot::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(Snapshot::default())
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            path: None,
            data: RwLock::new(snapshot),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.data.read())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.data.read().clone()
    }

    pub fn settings(&self) -> Settings {
        self.read(|snap| snap.settings.clone())
    }

    /// Applies `f` to a copy, persists the copy, then publishes it.
    ///
    /// When persisting fails the in-memory state is left unchanged.
    pub fn update<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> Result<R> {
        let mut guard = self.data.write();
        let mut next = guard.clone();
        let out = f(&mut next);
        if next != *guard {
            if let Some(path) = &self.path {
                persist(path, &next)?;
            }
            *guard = next;
        }
        Ok(out)
    }
}

fn persist(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Storage(format!("failed to create {}: {e}", parent.display())))?;
    }
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| Error::Storage(format!("failed to serialize snapshot: {e}")))?;

    // 先写入临时文件，成功后再重命名
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &json)
        .map_err(|e| Error::Storage(format!("failed to write {}: {e}", temp_path.display())))?;
    fs::rename(&temp_path, path).map_err(|e| {
        Error::Storage(format!(
            "failed to rename {} -> {}: {e}",
            temp_path.display(),
            path.display()
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ProxyType;

    fn node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            proxy_type: ProxyType::Trojan,
            alive: true,
            latency: None,
        }
    }

    #[test]
    fn updates_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let store = Store::open(&path).unwrap();
        store
            .update(|snap| {
                snap.nodes = vec![node("HK-1")];
                snap.current_node = "HK-1".into();
            })
            .unwrap();
        assert!(!dir.path().join("storage.json.tmp").exists());

        let reopened = Store::open(&path).unwrap();
        let snap = reopened.snapshot();
        assert_eq!(snap.nodes, vec![node("HK-1")]);
        assert_eq!(snap.current_node, "HK-1");
    }

    #[test]
    fn document_uses_camel_case_keys() {
        let store = Store::in_memory();
        store.update(|snap| snap.is_testing = true).unwrap();
        let value = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(value["isTesting"], true);
        assert!(value.get("proxyGroup").is_some());
        assert!(value.get("connectionError").is_some());
    }

    #[test]
    fn corrupt_document_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(Store::open(&path), Err(Error::Storage(_))));
    }

    #[test]
    fn update_returns_closure_value() {
        let store = Store::in_memory();
        let len = store
            .update(|snap| {
                snap.proxy_group = vec!["a".into(), "b".into()];
                snap.proxy_group.len()
            })
            .unwrap();
        assert_eq!(len, 2);
        assert_eq!(store.read(|snap| snap.proxy_group.clone()), ["a", "b"]);
    }
}
