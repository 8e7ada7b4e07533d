//! An in-memory content store.
//!
//! Used as the staging half of layout archives and as the store behind
//! in-process repositories in tests; it is the simplest complete
//! implementation of the store facade, including both listing capabilities.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    oci::{self, Descriptor, Manifest},
    store::{verify, Error, ReferrerLister, Store, TagLister},
    Digest, Reference,
};

/// The key a tag reference normalizes to.
///
/// Registry and scheme prefixes are stripped so that a tag written through
/// a fully qualified reference resolves through the short form and back.
fn tag_key(reference: &Reference) -> Option<String> {
    reference
        .tag
        .as_ref()
        .map(|tag| format!("{}:{tag}", reference.repository))
}

/// An in-memory content store.
#[derive(Debug, Default, Clone)]
pub struct Memory {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: HashMap<Digest, (Descriptor, Bytes)>,
    tags: HashMap<String, Descriptor>,
}

impl Memory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every descriptor currently tagged, with the normalized tag it is
    /// tagged under.
    pub fn tagged(&self) -> Vec<(String, Descriptor)> {
        match self.inner.read() {
            Ok(inner) => inner
                .tags
                .iter()
                .map(|(tag, descriptor)| (tag.clone(), descriptor.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, Error> {
        self.inner
            .read()
            .map_err(|_| Error::Transport("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, Error> {
        self.inner
            .write()
            .map_err(|_| Error::Transport("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for Memory {
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error> {
        let inner = self.read()?;
        inner
            .blobs
            .get(&descriptor.digest)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| Error::NotFound(descriptor.digest.to_string()))
    }

    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        let inner = self.read()?;
        Ok(inner.blobs.contains_key(&descriptor.digest))
    }

    async fn push(&self, descriptor: &Descriptor, content: Bytes) -> Result<(), Error> {
        verify(descriptor, &content)?;
        let mut inner = self.write()?;
        inner
            .blobs
            .insert(descriptor.digest.clone(), (descriptor.clone(), content));
        Ok(())
    }

    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        let parsed = Reference::from_str(reference)
            .map_err(|error| Error::InvalidReference(format!("{reference}: {error}")))?;

        let inner = self.read()?;
        if let Some(digest) = &parsed.digest {
            return inner
                .blobs
                .get(digest)
                .map(|(descriptor, _)| descriptor.clone())
                .ok_or_else(|| Error::NotFound(reference.to_string()));
        }
        // Tags are looked up by their normalized key first, then by the raw
        // reference string; the latter supports layouts keyed by bare tags.
        let candidates = tag_key(&parsed)
            .into_iter()
            .chain(std::iter::once(reference.to_string()));
        for key in candidates {
            if let Some(descriptor) = inner.tags.get(&key) {
                return Ok(descriptor.clone());
            }
        }
        Err(Error::NotFound(reference.to_string()))
    }

    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error> {
        // A tag equal to the descriptor's own digest is a self-tag;
        // digests always resolve, so there is nothing to record.
        if reference == descriptor.digest.to_string() {
            return Ok(());
        }

        let key = match Reference::from_str(reference) {
            Ok(parsed) if parsed.digest.as_ref() == Some(&descriptor.digest) => return Ok(()),
            // References without a tag of their own (bare tag strings, or
            // strings the loose grammar reads differently) key by their raw
            // spelling so they resolve by the same spelling later.
            Ok(parsed) => tag_key(&parsed).unwrap_or_else(|| reference.to_string()),
            Err(_) => reference.to_string(),
        };

        let mut inner = self.write()?;
        if !inner.blobs.contains_key(&descriptor.digest) {
            return Err(Error::NotFound(format!(
                "cannot tag content that has not been pushed: {}",
                descriptor.digest
            )));
        }
        inner.tags.insert(key, descriptor.clone());
        Ok(())
    }

    fn tags(&self) -> Option<&dyn TagLister> {
        Some(self)
    }

    fn referrers(&self) -> Option<&dyn ReferrerLister> {
        Some(self)
    }
}

#[async_trait]
impl TagLister for Memory {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, Error> {
        let inner = self.read()?;
        let mut tags = inner
            .tags
            .keys()
            .filter_map(|key| {
                let (repo, tag) = key.rsplit_once(':')?;
                (repo == repository).then(|| tag.to_string())
            })
            .collect::<Vec<_>>();
        tags.sort();
        Ok(tags)
    }
}

#[async_trait]
impl ReferrerLister for Memory {
    async fn list_referrers(
        &self,
        subject: &Descriptor,
        artifact_type: Option<&str>,
    ) -> Result<Vec<Descriptor>, Error> {
        let inner = self.read()?;
        let mut referrers = Vec::new();
        for (descriptor, content) in inner.blobs.values() {
            if !oci::is_image_manifest(&descriptor.media_type) {
                continue;
            }
            let manifest = match Manifest::from_bytes(content) {
                Ok(manifest) => manifest,
                Err(_) => continue,
            };
            let refers = manifest
                .subject
                .as_ref()
                .is_some_and(|s| s.digest == subject.digest);
            if !refers {
                continue;
            }
            if let Some(artifact_type) = artifact_type {
                if manifest.artifact_type.as_deref() != Some(artifact_type) {
                    continue;
                }
            }

            // The referrers API surfaces manifest annotations on the
            // returned descriptors; consumers match on them without
            // fetching each manifest.
            let mut referrer = descriptor.clone();
            referrer.artifact_type = manifest.artifact_type.clone();
            referrer.annotations = manifest.annotations.clone();
            referrers.push(referrer);
        }
        Ok(referrers)
    }
}
