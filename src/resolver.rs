//! Binding component coordinates to references and the stores that serve
//! them.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use color_eyre::{eyre::Context, Result};

use crate::{
    oci_tag,
    store::{memory::Memory, registry::Registry, Store},
    Authentication, Reference, DESCRIPTOR_PATH_PREFIX,
};

/// Resolves component coordinates to canonical references, and references
/// to concrete stores.
#[async_trait]
pub trait Resolver: std::fmt::Debug + Send + Sync {
    /// The store serving the provided reference.
    async fn store(&self, reference: &Reference) -> Result<Arc<dyn Store>>;

    /// The canonical reference for a component coordinate:
    /// `<base>[/<sub path>]/component-descriptors/<name>:<tag>`.
    fn component_reference(&self, name: &str, version: &str) -> Result<Reference>;

    /// Probe the resolution target, where a cheap probe exists.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn component_repository(sub_path: Option<&str>, name: &str) -> String {
    match sub_path {
        Some(sub_path) => format!("{sub_path}/{DESCRIPTOR_PATH_PREFIX}/{name}"),
        None => format!("{DESCRIPTOR_PATH_PREFIX}/{name}"),
    }
}

/// A resolver backed by a remote registry.
///
/// Stores are cached per `(registry, repository)` pair, never per full
/// reference, so resolving many tags of one component reuses one client and
/// its token cache.
#[derive(Debug)]
pub struct RegistryResolver {
    registry: String,
    sub_path: Option<String>,
    authentication: Authentication,
    insecure: bool,
    cache: RwLock<HashMap<(String, String), Arc<Registry>>>,
}

#[bon::bon]
impl RegistryResolver {
    /// Create a resolver for the provided registry base URL.
    ///
    /// The base may carry a scheme (`oci://`, `http://`, `https://`) and a
    /// sub path under which all components live; `http` implies an insecure
    /// connection.
    #[builder]
    pub fn new(
        /// The registry base, e.g. `ghcr.io`, `http://localhost:5000/ocm`.
        /// Defaults to [`crate::default_base`].
        #[builder(into)]
        base: Option<String>,

        /// The credential to present to the registry.
        authentication: Option<Authentication>,

        /// Use plain HTTP even without an `http://` scheme in the base.
        #[builder(default)]
        insecure: bool,
    ) -> Self {
        let base = base.unwrap_or_else(crate::default_base);
        let (scheme, rest) = match base.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, base.as_str()),
        };
        let (registry, sub_path) = match rest.split_once('/') {
            Some((registry, sub_path)) if !sub_path.is_empty() => {
                (registry.to_string(), Some(sub_path.trim_matches('/').to_string()))
            }
            Some((registry, _)) => (registry.to_string(), None),
            None => (rest.to_string(), None),
        };

        Self {
            registry,
            sub_path,
            authentication: authentication.unwrap_or_default(),
            insecure: insecure || scheme == Some("http"),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Resolver for RegistryResolver {
    async fn store(&self, reference: &Reference) -> Result<Arc<dyn Store>> {
        let registry = reference
            .registry
            .clone()
            .unwrap_or_else(|| self.registry.clone());
        let key = (registry.clone(), reference.repository.clone());

        {
            let cache = self
                .cache
                .read()
                .unwrap_or_else(|poison| poison.into_inner());
            if let Some(store) = cache.get(&key) {
                return Ok(store.clone());
            }
        }

        let store = Arc::new(
            Registry::builder()
                .registry(registry)
                .repository(reference.repository.clone())
                .authentication(self.authentication.clone())
                .insecure(self.insecure)
                .build(),
        );
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        let store = cache.entry(key).or_insert(store).clone();
        Ok(store)
    }

    fn component_reference(&self, name: &str, version: &str) -> Result<Reference> {
        let reference = Reference::builder()
            .registry(self.registry.clone())
            .repository(component_repository(self.sub_path.as_deref(), name))
            .tag(oci_tag(version))
            .build();
        reference
            .to_string()
            .parse()
            .context("validate component reference")
    }
}

/// A resolver that binds every reference to one store.
///
/// This is the shape transport archives and in-process repositories take:
/// the archive is the store, and coordinates only select tags within it.
#[derive(Debug, Clone)]
pub struct StoreResolver {
    store: Arc<dyn Store>,
    sub_path: Option<String>,
}

impl StoreResolver {
    /// Create a resolver serving everything from the provided store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sub_path: None,
        }
    }

    /// Create a resolver over a fresh in-memory store.
    pub fn memory() -> Self {
        Self::new(Arc::new(Memory::new()))
    }

    /// Prefix canonical references with the provided sub path.
    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.sub_path = Some(sub_path.into());
        self
    }
}

#[async_trait]
impl Resolver for StoreResolver {
    async fn store(&self, _: &Reference) -> Result<Arc<dyn Store>> {
        Ok(self.store.clone())
    }

    fn component_reference(&self, name: &str, version: &str) -> Result<Reference> {
        let reference = Reference::builder()
            .repository(component_repository(self.sub_path.as_deref(), name))
            .tag(oci_tag(version))
            .build();
        reference
            .to_string()
            .parse()
            .context("validate component reference")
    }
}
