use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::types::StampedeResult;

/// Where an object lives in an [ObjectStore].
#[derive(derive_more::Display, Debug, Clone, PartialEq, Eq, Hash)]
#[display("s3://{bucket}/{key}")]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Fetch and store whole objects by location.
#[async_trait]
pub trait ObjectStore: fmt::Debug + Send + Sync + 'static {
    async fn get_object(&self, location: &ObjectLocation) -> StampedeResult<Vec<u8>>;

    /// Write the object, replacing anything already stored at `location`.
    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>) -> StampedeResult<()>;
}

/// Object store on the local filesystem. Buckets are directories under `root` and keys are paths
/// relative to their bucket.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, location: &ObjectLocation) -> StampedeResult<PathBuf> {
        for part in [&location.bucket, &location.key] {
            let escapes = Path::new(part)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
            if escapes {
                bail!("Object location {location} must not contain absolute or parent paths");
            }
        }

        Ok(self.root.join(&location.bucket).join(&location.key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, location: &ObjectLocation) -> StampedeResult<Vec<u8>> {
        let path = self.path_for(location)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {location} from {}", path.display()))
    }

    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>) -> StampedeResult<()> {
        let path = self.path_for(location)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {location} to {}", path.display()))
    }
}

/// Object store held in memory, useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<ObjectLocation, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: ObjectLocation, body: impl Into<Vec<u8>>) {
        self.objects.lock().insert(location, body.into());
    }

    pub fn get(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        self.objects.lock().get(location).cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, location: &ObjectLocation) -> StampedeResult<Vec<u8>> {
        self.get(location)
            .with_context(|| format!("No object at {location}"))
    }

    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>) -> StampedeResult<()> {
        self.insert(location.clone(), body);
        Ok(())
    }
}
