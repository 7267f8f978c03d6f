//! Directory-backed object store. Folder and file ids are root-relative paths
//! joined with `/`; the root folder id is the empty string.

use std::{
    fs,
    path::PathBuf,
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::{FileEntry, ObjectStore, StoreError, StoreResult, mime_for_name};
use crate::io_utils::sha256_hex;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::io(&root, err))?;
        Ok(Self { root })
    }

    /// Maps an id onto a path below the root, rejecting anything that would
    /// escape it.
    pub fn resolve(&self, id: &str) -> StoreResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in id.split('/').filter(|s| !s.is_empty()) {
            check_name(segment).map_err(|_| StoreError::InvalidId(id.to_string()))?;
            path.push(segment);
        }
        Ok(path)
    }

    /// Direct children of `folder_id` that are folders (`folders`) or files.
    fn entries(&self, folder_id: &str, folders: bool) -> StoreResult<Vec<FileEntry>> {
        let dir = self.resolve(folder_id)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound {
                kind: "folder",
                id: folder_id.to_string(),
            });
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|err| StoreError::io(&dir, err))? {
            let entry = entry.map_err(|err| StoreError::io(&dir, err))?;
            let metadata = entry
                .metadata()
                .map_err(|err| StoreError::io(entry.path(), err))?;
            let wanted = if folders {
                metadata.is_dir()
            } else {
                metadata.is_file()
            };
            if !wanted {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push(FileEntry {
                id: Self::child_id(folder_id, &name),
                name,
                modified: DateTime::<Utc>::from(modified),
            });
        }
        Ok(found)
    }

    fn child_id(parent_id: &str, name: &str) -> String {
        let parent = parent_id.trim_matches('/');
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        }
    }
}

fn check_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidId(name.to_string()));
    }
    Ok(())
}

impl ObjectStore for LocalObjectStore {
    fn list_files(
        &self,
        folder_id: &str,
        mime_filter: &[&str],
        max_results: usize,
    ) -> StoreResult<Vec<FileEntry>> {
        let mut found = self
            .entries(folder_id, false)?
            .into_iter()
            .filter(|entry| mime_filter.is_empty() || mime_filter.contains(&mime_for_name(&entry.name)))
            .collect::<Vec<_>>();
        found.sort_by(FileEntry::newest_first);
        found.truncate(max_results);
        Ok(found)
    }

    fn list_folders(&self, folder_id: &str) -> StoreResult<Vec<FileEntry>> {
        let mut folders = self.entries(folder_id, true)?;
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    fn download_file(&self, id: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound {
                kind: "file",
                id: id.to_string(),
            });
        }
        fs::read(&path).map_err(|err| StoreError::io(&path, err))
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> StoreResult<String> {
        check_name(name)?;
        let parent = self.resolve(parent_id)?;
        if !parent.is_dir() {
            return Err(StoreError::NotFound {
                kind: "folder",
                id: parent_id.to_string(),
            });
        }
        let path = parent.join(name);
        if !path.is_dir() {
            fs::create_dir(&path).map_err(|err| StoreError::io(&path, err))?;
            info!("Created folder {path:?}");
        }
        Ok(Self::child_id(parent_id, name))
    }

    fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> StoreResult<String> {
        check_name(name)?;
        let parent = self.resolve(parent_id)?;
        if !parent.is_dir() {
            return Err(StoreError::NotFound {
                kind: "folder",
                id: parent_id.to_string(),
            });
        }
        let path = parent.join(name);
        let id = Self::child_id(parent_id, name);
        if path.is_file() {
            let existing = fs::read(&path).map_err(|err| StoreError::io(&path, err))?;
            if sha256_hex(&existing) == sha256_hex(bytes) {
                debug!("Skipping upload of unchanged {id}");
                return Ok(id);
            }
        }
        fs::write(&path, bytes).map_err(|err| StoreError::io(&path, err))?;
        debug!("Uploaded {id} ({} bytes, {mime_type})", bytes.len());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SPREADSHEET_MIMES, XLSX_MIME};

    #[test]
    fn create_folder_is_idempotent_and_nested() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();
        let base = store.create_folder("attachments", "").unwrap();
        assert_eq!(base, "attachments");
        assert_eq!(store.create_folder("attachments", "").unwrap(), base);
        let sender = store.create_folder("ops_example.com", &base).unwrap();
        assert_eq!(sender, "attachments/ops_example.com");
        assert!(dir.path().join("attachments/ops_example.com").is_dir());
    }

    #[test]
    fn upload_download_and_list_spreadsheets() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();
        let folder = store.create_folder("grn", "").unwrap();
        let id = store
            .upload_file("a.xlsx", &folder, b"first", XLSX_MIME)
            .unwrap();
        store
            .upload_file("notes.txt", &folder, b"ignored", "text/plain")
            .unwrap();
        store.upload_file("b.xls", &folder, b"second", XLSX_MIME).unwrap();
        assert_eq!(store.download_file(&id).unwrap(), b"first");

        let listed = store.list_files(&folder, SPREADSHEET_MIMES, 10).unwrap();
        let mut names = listed.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["a.xlsx", "b.xls"]);
        assert_eq!(store.list_files(&folder, SPREADSHEET_MIMES, 1).unwrap().len(), 1);
    }

    #[test]
    fn folders_and_files_are_listed_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();
        let base = store.create_folder("grn", "").unwrap();
        store.create_folder("zeta@example.com", &base).unwrap();
        store.create_folder("ops@example.com", &base).unwrap();
        store.upload_file("top.xlsx", &base, b"x", XLSX_MIME).unwrap();

        let folders = store.list_folders(&base).unwrap();
        let ids = folders.iter().map(|f| f.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["grn/ops@example.com", "grn/zeta@example.com"]);
        let files = store.list_files(&base, SPREADSHEET_MIMES, 10).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "grn/top.xlsx");
        assert!(store.list_folders("nowhere").is_err());
    }

    #[test]
    fn rejects_escaping_ids_and_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();
        assert!(matches!(store.resolve("../x"), Err(StoreError::InvalidId(_))));
        assert!(matches!(
            store.download_file("missing.xlsx"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.list_files("nowhere", SPREADSHEET_MIMES, 5),
            Err(StoreError::NotFound { .. })
        ));
    }
}
