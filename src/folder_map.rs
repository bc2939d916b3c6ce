use std::collections::{BTreeMap, HashSet};
use std::sync::Once;

use rayon::prelude::*;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drive::{DriveError, FolderStore};

static INIT: Once = Once::new();

// Initialize Rayon global thread pool (only once per container)
pub fn init_thread_pool(workers: usize) {
    INIT.call_once(|| {
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global();
    });
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderNode {
    pub name: String,
    pub parent: Option<String>,
    pub path: String,
}

/// Snapshot of a shared drive's folder tree, keyed by folder id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FolderMap {
    folders: BTreeMap<String, FolderNode>,
}

impl FolderMap {
    pub fn from_entries(entries: Vec<FolderEntry>) -> Self {
        let links: BTreeMap<String, (String, Option<String>)> = entries
            .into_iter()
            .map(|entry| {
                let parent = entry.parents.into_iter().next();
                (entry.id, (entry.name, parent))
            })
            .collect();

        // Path walks only read `links`
        let folders = links
            .par_iter()
            .map(|(id, (name, parent))| {
                let node = FolderNode {
                    name: name.clone(),
                    parent: parent.clone(),
                    path: resolve_path(id, &links),
                };
                (id.clone(), node)
            })
            .collect();

        Self { folders }
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FolderNode> {
        self.folders.get(id)
    }

    // Four-space indent
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(buf).map_err(serde_json::Error::custom)
    }
}

// Walk parent links up to the outermost folder we know about; a repeated id ends the walk
fn resolve_path(id: &str, links: &BTreeMap<String, (String, Option<String>)>) -> String {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(id);

    while let Some(current) = cursor {
        if !seen.insert(current) {
            break;
        }
        let Some((name, parent)) = links.get(current) else {
            break;
        };
        names.push(name.as_str());
        cursor = parent.as_deref();
    }

    names.reverse();
    names.join("/")
}

/// Where the map comes from and where it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    pub drive_id: String,
    pub target_folder: String,
    pub filename: String,
}

// Build the folder map for the drive and write it into the target folder, returning the file id
pub async fn sync_folder_map(store: &dyn FolderStore, settings: &MapSettings) -> Result<String, DriveError> {
    info!(drive_id = %settings.drive_id, "building folder map");
    let entries = store.list_folders(&settings.drive_id).await?;
    let map = FolderMap::from_entries(entries);
    info!(folders = map.len(), "built folder map");

    let content = map.to_pretty_json().map_err(|error| DriveError::Encode(error.to_string()))?;

    match store.find_file(&settings.target_folder, &settings.filename).await? {
        Some(file_id) => {
            info!(%file_id, "updating existing map file");
            store.update_file(&file_id, content).await
        }
        None => {
            info!(filename = %settings.filename, folder = %settings.target_folder, "creating map file");
            store.create_file(&settings.target_folder, &settings.filename, content).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    fn folder(id: &str, name: &str, parents: &[&str]) -> FolderEntry {
        FolderEntry {
            id: id.to_string(),
            name: name.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        folders: Vec<FolderEntry>,
        existing: Option<String>,
        writes: Mutex<Vec<(String, String)>>,
    }

    impl MemoryStore {
        fn writes(&self) -> Vec<(String, String)> {
            self.writes.lock().expect("poisoned mutex").clone()
        }
    }

    #[async_trait]
    impl FolderStore for MemoryStore {
        async fn list_folders(&self, _drive_id: &str) -> Result<Vec<FolderEntry>, DriveError> {
            Ok(self.folders.clone())
        }

        async fn find_file(&self, _folder_id: &str, _name: &str) -> Result<Option<String>, DriveError> {
            Ok(self.existing.clone())
        }

        async fn create_file(&self, folder_id: &str, name: &str, content: String) -> Result<String, DriveError> {
            self.writes
                .lock()
                .expect("poisoned mutex")
                .push((format!("create:{folder_id}/{name}"), content));
            Ok("new-file".to_string())
        }

        async fn update_file(&self, file_id: &str, content: String) -> Result<String, DriveError> {
            self.writes
                .lock()
                .expect("poisoned mutex")
                .push((format!("update:{file_id}"), content));
            Ok(file_id.to_string())
        }
    }

    fn settings() -> MapSettings {
        MapSettings {
            drive_id: "drive-1".to_string(),
            target_folder: "target".to_string(),
            filename: "folder_map.txt".to_string(),
        }
    }

    #[test]
    fn parent_is_first_listed_parent() {
        let map = FolderMap::from_entries(vec![
            folder("a", "Projects", &["drive-root", "other"]),
            folder("b", "Orphan", &[]),
        ]);

        assert_eq!(map.get("a").and_then(|n| n.parent.as_deref()), Some("drive-root"));
        assert_eq!(map.get("b").and_then(|n| n.parent.as_deref()), None);
    }

    #[test]
    fn nested_paths_resolve_through_known_ancestors() {
        let map = FolderMap::from_entries(vec![
            folder("root", "Clients", &["drive-root"]),
            folder("acme", "Acme", &["root"]),
            folder("invoices", "Invoices", &["acme"]),
        ]);

        assert_eq!(map.len(), 3);
        assert_eq!(map.get("invoices").map(|n| n.path.as_str()), Some("Clients/Acme/Invoices"));
        assert_eq!(map.get("root").map(|n| n.path.as_str()), Some("Clients"));
    }

    #[test]
    fn parent_cycles_terminate() {
        let map = FolderMap::from_entries(vec![folder("x", "X", &["y"]), folder("y", "Y", &["x"])]);

        assert_eq!(map.get("x").map(|n| n.path.as_str()), Some("Y/X"));
        assert_eq!(map.get("y").map(|n| n.path.as_str()), Some("X/Y"));
    }

    #[test]
    fn pretty_json_uses_four_space_indent() {
        let map = FolderMap::from_entries(vec![folder("a", "Docs", &[])]);
        let json = map.to_pretty_json().expect("map should serialize");

        assert!(json.starts_with("{\n    \"a\": {\n        \"name\": \"Docs\""));
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(parsed["a"]["parent"], serde_json::Value::Null);
    }

    #[test]
    fn non_ascii_names_survive_rendering() {
        let map = FolderMap::from_entries(vec![folder("a", "Prüfberichte", &[]), folder("b", "報告", &["a"])]);
        let json = map.to_pretty_json().expect("map should serialize");

        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(parsed["b"]["path"], "Prüfberichte/報告");
    }

    #[tokio::test]
    async fn creates_map_file_when_missing() {
        let store = MemoryStore {
            folders: vec![folder("a", "Docs", &["drive-1"])],
            ..Default::default()
        };

        let file_id = sync_folder_map(&store, &settings()).await.expect("sync should succeed");

        assert_eq!(file_id, "new-file");
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "create:target/folder_map.txt");
        assert!(writes[0].1.contains("\"Docs\""));
    }

    #[tokio::test]
    async fn updates_existing_map_file_in_place() {
        let store = MemoryStore {
            existing: Some("file-7".to_string()),
            ..Default::default()
        };

        let file_id = sync_folder_map(&store, &settings()).await.expect("sync should succeed");

        assert_eq!(file_id, "file-7");
        assert_eq!(store.writes(), vec![("update:file-7".to_string(), "{}".to_string())]);
    }
}
