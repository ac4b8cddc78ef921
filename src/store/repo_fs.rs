//! Filesystem-backed object store.
//!
//! `store://bucket/key` maps to `<root>/<bucket>/<key>`. Writes go to a
//! sibling temp file first and are renamed into place.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::common::error::{PipelineError, PipelineResult};

use super::domain::{validate_key, ObjectMeta, ObjectStore, StorePath};

/// Object store rooted at a local directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, path: &StorePath) -> PipelineResult<PathBuf> {
        validate_key(path)?;
        Ok(self.root.join(path.bucket()).join(path.key()))
    }
}

impl ObjectStore for FsObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> PipelineResult<Vec<ObjectMeta>> {
        let scope = StorePath::new(bucket, prefix);
        validate_key(&scope)?;
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&bucket_dir).follow_links(false) {
            let entry = entry.map_err(|err| PipelineError::store(&scope, err))?;
            if !entry.file_type().is_file()
                || entry.file_name().to_string_lossy().starts_with(".tmp-")
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(scope.key()) {
                let size = entry
                    .metadata()
                    .map_err(|err| PipelineError::store(&scope, err))?
                    .len();
                out.push(ObjectMeta { key, size });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn get(&self, path: &StorePath) -> PipelineResult<Vec<u8>> {
        let file = self.object_path(path)?;
        fs::read(&file).map_err(|err| PipelineError::store(path, err))
    }

    fn put(&self, path: &StorePath, body: &[u8]) -> PipelineResult<()> {
        let file = self.object_path(path)?;
        let parent = file
            .parent()
            .ok_or_else(|| PipelineError::store(path, "object has no parent directory"))?;
        fs::create_dir_all(parent).map_err(|err| PipelineError::store(path, err))?;

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".tmp-{name}"));
        let mut handle = fs::File::create(&tmp).map_err(|err| PipelineError::store(path, err))?;
        handle
            .write_all(body)
            .and_then(|_| handle.sync_all())
            .map_err(|err| PipelineError::store(path, err))?;
        fs::rename(&tmp, &file).map_err(|err| PipelineError::store(path, err))?;
        tracing::debug!(%path, bytes = body.len(), "object written");
        Ok(())
    }
}
