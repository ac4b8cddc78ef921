//! Object store addressing and the store contract.

use std::fmt;
use std::str::FromStr;

use crate::common::error::{PipelineError, PipelineResult};

/// URI scheme of object store paths.
pub const SCHEME: &str = "store://";

/// `store://bucket/key` address of one object or key prefix.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    bucket: String,
    key: String,
}

impl StorePath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into().trim_start_matches('/').to_string(),
        }
    }

    pub fn parse(raw: &str) -> PipelineResult<Self> {
        let rest = raw
            .strip_prefix(SCHEME)
            .ok_or_else(|| PipelineError::config(format!("'{raw}' is not a {SCHEME} path")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(PipelineError::config(format!("'{raw}' names no bucket")));
        }
        Ok(Self::new(bucket, key))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a key segment.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        let key = if self.key.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", self.key.trim_end_matches('/'), segment)
        };
        Self::new(self.bucket.clone(), key)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{SCHEME}{}", self.bucket)
        } else {
            write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
        }
    }
}

impl FromStr for StorePath {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorePath::parse(s)
    }
}

impl serde::Serialize for StorePath {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for StorePath {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        StorePath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Listing entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

impl ObjectMeta {
    /// Keys ending in `/` are folder placeholders, not data.
    pub fn is_directory_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// Bucket/key object storage.
///
/// Writes are last-writer-wins; the store is assumed externally consistent.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectStore: Send + Sync {
    /// Objects whose key starts with `prefix`, sorted by key.
    fn list(&self, bucket: &str, prefix: &str) -> PipelineResult<Vec<ObjectMeta>>;

    fn get(&self, path: &StorePath) -> PipelineResult<Vec<u8>>;

    fn put(&self, path: &StorePath, body: &[u8]) -> PipelineResult<()>;

    /// True when at least one object lives at or under `path`.
    fn exists(&self, path: &StorePath) -> PipelineResult<bool> {
        Ok(!self.list(path.bucket(), path.key())?.is_empty())
    }
}

/// Reject keys that could escape a bucket when mapped onto a filesystem.
pub fn validate_key(path: &StorePath) -> PipelineResult<()> {
    let bad = path
        .key()
        .split('/')
        .any(|segment| segment == ".." || segment == ".");
    if bad || path.bucket().contains(['/', '\\']) || path.bucket() == ".." {
        return Err(PipelineError::store(path, "path escapes its bucket"));
    }
    Ok(())
}
