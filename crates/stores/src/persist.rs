use std::{
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Serialize, de::DeserializeOwned},
    tracing::{debug, warn},
};

use crate::error::StoreError;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Missing files load as defaults; so do unreadable or corrupt ones, with a
/// warning, so a bad file never blocks startup.
pub(crate) fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read store, using defaults");
            return T::default();
        },
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "corrupt store file, using defaults");
        T::default()
    })
}

pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io)?;
    }
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data).map_err(io)?;
    debug!(path = %path.display(), "saved store");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    #[test]
    fn missing_and_corrupt_files_load_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing: HashMap<String, u32> = load_or_default(&dir.path().join("nope.json"));
        assert!(missing.is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        let loaded: HashMap<String, u32> = load_or_default(&corrupt);
        assert!(loaded.is_empty());
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("x.json");
        let mut value = HashMap::new();
        value.insert("a".to_string(), 1u32);
        save_json(&path, &value).unwrap();
        let back: HashMap<String, u32> = load_or_default(&path);
        assert_eq!(back, value);
    }
}
