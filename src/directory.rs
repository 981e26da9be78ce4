use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Project id to display name, swapped wholesale on reload.
///
/// The file is a flat JSON object: `{"svc-a": "Payments", "svc-b": ""}`.
#[derive(Default)]
pub struct ProjectDirectory {
    names: RwLock<Arc<HashMap<String, String>>>,
}

impl ProjectDirectory {
    pub fn from_map(names: HashMap<String, String>) -> Self {
        Self {
            names: RwLock::new(Arc::new(names)),
        }
    }

    /// Load at startup. A missing file yields an empty directory; a file that
    /// exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "project directory file not found, using raw ids");
            return Ok(Self::default());
        }
        let names = read_file(path)?;
        info!(path = %path.display(), projects = names.len(), "Loaded project directory");
        Ok(Self::from_map(names))
    }

    /// Re-read `path`; on any failure the current map stays in place.
    pub fn reload(&self, path: &Path) -> Result<usize> {
        let names = read_file(path)?;
        let count = names.len();
        match self.names.write() {
            Ok(mut guard) => *guard = Arc::new(names),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(names),
        }
        info!(path = %path.display(), projects = count, "Reloaded project directory");
        Ok(count)
    }

    /// Display name for `project`, or the id itself when unmapped or blank.
    pub fn resolve(&self, project: &str) -> String {
        let names = self.snapshot();
        match names.get(project) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => project.to_string(),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        match self.names.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn read_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_falls_back_to_id() {
        let dir = ProjectDirectory::from_map(HashMap::from([
            ("svc-a".to_string(), "支付中心".to_string()),
            ("svc-b".to_string(), String::new()),
        ]));
        assert_eq!(dir.resolve("svc-a"), "支付中心");
        assert_eq!(dir.resolve("svc-b"), "svc-b");
        assert_eq!(dir.resolve("svc-c"), "svc-c");
    }

    #[test]
    fn test_reload_replaces_wholesale_and_keeps_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"svc-a": "Alpha", "svc-b": "Beta"}}"#).unwrap();

        let dir = ProjectDirectory::load(file.path()).unwrap();
        assert_eq!(dir.resolve("svc-b"), "Beta");

        let mut next = tempfile::NamedTempFile::new().unwrap();
        write!(next, r#"{{"svc-a": "Alpha 2"}}"#).unwrap();
        assert_eq!(dir.reload(next.path()).unwrap(), 1);
        assert_eq!(dir.resolve("svc-a"), "Alpha 2");
        assert_eq!(dir.resolve("svc-b"), "svc-b");

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        write!(broken, "{{not json").unwrap();
        assert!(dir.reload(broken.path()).is_err());
        assert_eq!(dir.resolve("svc-a"), "Alpha 2");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = ProjectDirectory::load(Path::new("/nonexistent/projects.json")).unwrap();
        assert!(dir.snapshot().is_empty());
    }
}
