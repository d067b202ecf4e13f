// Finds plugin descriptors on the filesystem.
//
// Each search path may contain:
//   plugins/greeter/plugin.json      (a plugin directory)
//   plugins/greeter.plugin.json      (a bare descriptor file)

use crate::core::plugins::{Discovery, PluginDescriptor, PluginError, PluginSource};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DESCRIPTOR_FILE: &str = "plugin.json";
const DESCRIPTOR_SUFFIX: &str = ".plugin.json";

pub struct DirectoryPluginSource {
    search_paths: Vec<PathBuf>,
}

impl DirectoryPluginSource {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Descriptor files directly under `dir`, sorted by path.
    fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
        let entries = std::fs::read_dir(dir).map_err(|e| PluginError::Io {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let candidate = path.join(DESCRIPTOR_FILE);
                if candidate.is_file() {
                    files.push(candidate);
                }
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(DESCRIPTOR_SUFFIX))
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_descriptor(path: &Path) -> Result<PluginDescriptor, PluginError> {
        let contents = std::fs::read_to_string(path).map_err(|e| PluginError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut descriptor: PluginDescriptor =
            serde_json::from_str(&contents).map_err(|e| PluginError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let id = descriptor.id.trim();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(PluginError::Malformed {
                path: path.to_path_buf(),
                reason: "`id` must be a non-empty word".to_string(),
            });
        }
        descriptor.id = id.to_string();
        descriptor.path = path.to_path_buf();
        Ok(descriptor)
    }
}

#[async_trait]
impl PluginSource for DirectoryPluginSource {
    async fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();

        for dir in &self.search_paths {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "Plugin search path not found, skipping");
                continue;
            }

            let files = match Self::descriptor_files(dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!(path = %dir.display(), "Failed to scan plugin directory: {}", e);
                    discovery.problems.push(e);
                    continue;
                }
            };

            for file in files {
                match Self::read_descriptor(&file) {
                    Ok(descriptor) => {
                        debug!(id = %descriptor.id, path = %file.display(), "Found plugin");
                        discovery.descriptors.push(descriptor);
                    }
                    Err(e) => {
                        warn!("Skipping plugin descriptor: {}", e);
                        discovery.problems.push(e);
                    }
                }
            }
        }

        // First one found wins. Search paths are in priority order.
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(discovery.descriptors.len());
        for descriptor in discovery.descriptors.drain(..) {
            if seen.insert(descriptor.id.clone()) {
                unique.push(descriptor);
            } else {
                warn!(
                    id = %descriptor.id,
                    path = %descriptor.path.display(),
                    "Duplicate plugin id, keeping the first"
                );
                discovery.problems.push(PluginError::DuplicateId {
                    id: descriptor.id,
                    path: descriptor.path,
                });
            }
        }
        unique.sort_by(|a, b| a.id.cmp(&b.id));
        discovery.descriptors = unique;

        discovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn finds_directories_and_bare_descriptors() {
        let root = tempdir().unwrap();
        write(
            &root.path().join("greeter").join("plugin.json"),
            r#"{ "id": "greeter", "name": "Greeter", "dependencies": ["core-utils"] }"#,
        );
        write(
            &root.path().join("core-utils.plugin.json"),
            r#"{ "id": "core-utils", "version": "1.2.0", "config": { "color": "blue" } }"#,
        );
        write(&root.path().join("README.md"), "not a plugin");
        std::fs::create_dir_all(root.path().join("empty-dir")).unwrap();

        let discovery = DirectoryPluginSource::new(vec![root.path().to_path_buf()])
            .discover()
            .await;

        assert!(discovery.problems.is_empty());
        let ids: Vec<&str> = discovery.descriptors.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["core-utils", "greeter"]);

        let utils = &discovery.descriptors[0];
        assert_eq!(utils.version, "1.2.0");
        assert!(utils.enabled);
        assert_eq!(utils.config["color"], "blue");
        assert_eq!(utils.path, root.path().join("core-utils.plugin.json"));

        let greeter = &discovery.descriptors[1];
        assert_eq!(greeter.display_name(), "Greeter");
        assert_eq!(greeter.dependencies, vec!["core-utils".to_string()]);
    }

    #[tokio::test]
    async fn bad_descriptors_and_missing_paths_are_reported_not_fatal() {
        let root = tempdir().unwrap();
        write(&root.path().join("broken.plugin.json"), "{ not json");
        write(&root.path().join("anon.plugin.json"), r#"{ "id": "  " }"#);
        write(&root.path().join("ok.plugin.json"), r#"{ "id": "ok" }"#);

        let discovery = DirectoryPluginSource::new(vec![
            root.path().join("does-not-exist"),
            root.path().to_path_buf(),
        ])
        .discover()
        .await;

        assert_eq!(discovery.descriptors.len(), 1);
        assert_eq!(discovery.problems.len(), 2);
        assert!(discovery
            .problems
            .iter()
            .all(|p| matches!(p, PluginError::Malformed { .. })));
    }

    #[tokio::test]
    async fn earlier_search_paths_win_duplicates() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write(
            &first.path().join("dup.plugin.json"),
            r#"{ "id": "dup", "version": "2.0.0" }"#,
        );
        write(
            &second.path().join("dup").join("plugin.json"),
            r#"{ "id": "dup", "version": "1.0.0" }"#,
        );

        let discovery = DirectoryPluginSource::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ])
        .discover()
        .await;

        assert_eq!(discovery.descriptors.len(), 1);
        assert_eq!(discovery.descriptors[0].version, "2.0.0");
        assert!(matches!(
            &discovery.problems[..],
            [PluginError::DuplicateId { id, .. }] if id == "dup"
        ));
    }
}
