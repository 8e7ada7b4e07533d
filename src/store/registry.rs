//! Interacts with remote OCI registries.
//!
//! One instance serves one repository in one registry; the resolver caches
//! instances per `(registry, repository)` pair so tags never multiply
//! clients or their token caches.

use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use derive_more::Debug;
use oci_client::{
    client::{ClientConfig, ClientProtocol},
    secrets::RegistryAuth,
    RegistryOperation,
};
use tracing::debug;

use crate::{
    oci::{self, Descriptor},
    store::{verify, Error, Store, TagLister},
    Authentication, Reference,
};

/// Manifest media types the registry is asked to serve when resolving.
const ACCEPTED_MANIFEST_TYPES: &[&str] = &[oci::IMAGE_MANIFEST, oci::IMAGE_INDEX];

fn transport(error: oci_client::errors::OciDistributionError) -> Error {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("not found") || lowered.contains("404") {
        Error::NotFound(message)
    } else {
        Error::Transport(message)
    }
}

/// Each instance is a unique view of a remote registry for a specific
/// repository.
#[derive(Debug)]
pub struct Registry {
    /// The client used to interact with the registry.
    #[debug(skip)]
    client: oci_client::Client,

    /// The credential presented to the registry.
    #[debug(skip)]
    auth: RegistryAuth,

    /// The registry host, possibly with a port.
    registry: String,

    /// The repository served by this instance.
    repository: String,
}

#[bon::bon]
impl Registry {
    /// Create a new store for a specific registry and repository.
    #[builder]
    pub fn new(
        /// The registry host, possibly with a port.
        #[builder(into)]
        registry: String,

        /// The repository to serve.
        #[builder(into)]
        repository: String,

        /// The credential to present to the registry.
        authentication: Option<Authentication>,

        /// Use plain HTTP instead of HTTPS.
        /// Only sensible for local registries.
        #[builder(default)]
        insecure: bool,
    ) -> Self {
        let protocol = if insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = oci_client::Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        let auth = match authentication.unwrap_or_default() {
            Authentication::None => RegistryAuth::Anonymous,
            Authentication::Basic { username, password } => {
                RegistryAuth::Basic(username, password)
            }
        };

        Self {
            client,
            auth,
            registry,
            repository,
        }
    }
}

impl Registry {
    /// Build a registry reference selecting the provided tag or digest.
    fn reference(&self, selector: &str) -> oci_client::Reference {
        if selector.contains(':') && crate::Algorithm::is_known(selector.split(':').next().unwrap_or_default()) {
            oci_client::Reference::with_digest(
                self.registry.clone(),
                self.repository.clone(),
                selector.to_string(),
            )
        } else {
            oci_client::Reference::with_tag(
                self.registry.clone(),
                self.repository.clone(),
                selector.to_string(),
            )
        }
    }

    /// The selector a loosely written reference carries for this store.
    fn selector_for(&self, reference: &str) -> Result<String, Error> {
        let parsed = Reference::from_str(reference)
            .map_err(|error| Error::InvalidReference(format!("{reference}: {error}")))?;
        parsed
            .selector()
            .ok_or_else(|| Error::InvalidReference(format!("{reference}: no tag or digest")))
    }

    async fn authenticate(&self, reference: &oci_client::Reference, operation: RegistryOperation) -> Result<(), Error> {
        self.client
            .auth(reference, &self.auth, operation)
            .await
            .map_err(transport)?;
        Ok(())
    }

    fn blob_descriptor(descriptor: &Descriptor) -> oci_client::manifest::OciDescriptor {
        oci_client::manifest::OciDescriptor {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.to_string(),
            size: descriptor.size,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Store for Registry {
    #[tracing::instrument]
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error> {
        let reference = self.reference(&descriptor.digest.to_string());
        if oci::is_taggable(&descriptor.media_type) {
            let (content, _) = self
                .client
                .pull_manifest_raw(&reference, &self.auth, ACCEPTED_MANIFEST_TYPES)
                .await
                .map_err(transport)?;
            verify(descriptor, &content)?;
            return Ok(Bytes::from(content));
        }

        self.authenticate(&reference, RegistryOperation::Pull).await?;
        let mut content = Vec::with_capacity(descriptor.size.max(0) as usize);
        self.client
            .pull_blob(&reference, &Self::blob_descriptor(descriptor), &mut content)
            .await
            .map_err(transport)?;
        verify(descriptor, &content)?;
        Ok(Bytes::from(content))
    }

    #[tracing::instrument]
    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        if oci::is_taggable(&descriptor.media_type) {
            let reference = self.reference(&descriptor.digest.to_string());
            return match self.client.fetch_manifest_digest(&reference, &self.auth).await {
                Ok(_) => Ok(true),
                Err(error) => match transport(error) {
                    Error::NotFound(_) => Ok(false),
                    other => Err(other),
                },
            };
        }

        match self.fetch(descriptor).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    #[tracing::instrument(skip(content))]
    async fn push(&self, descriptor: &Descriptor, content: Bytes) -> Result<(), Error> {
        verify(descriptor, &content)?;
        let digest = descriptor.digest.to_string();
        let reference = self.reference(&digest);
        self.authenticate(&reference, RegistryOperation::Push).await?;

        if oci::is_taggable(&descriptor.media_type) {
            let content_type = http::HeaderValue::from_str(&descriptor.media_type)
                .map_err(|error| Error::Transport(error.to_string()))?;
            self.client
                .push_manifest_raw(&reference, content.to_vec(), content_type)
                .await
                .map_err(transport)?;
        } else {
            self.client
                .push_blob(&reference, &content, &digest)
                .await
                .map_err(transport)?;
        }
        debug!(%digest, "pushed");
        Ok(())
    }

    #[tracing::instrument]
    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        let selector = self.selector_for(reference)?;
        let target = self.reference(&selector);

        let (content, digest) = self
            .client
            .pull_manifest_raw(&target, &self.auth, ACCEPTED_MANIFEST_TYPES)
            .await
            .map_err(transport)?;
        let digest = crate::Digest::from_str(&digest)
            .map_err(|error| Error::InvalidDigest(error.to_string()))?;

        // The registry reports the media type through the manifest body;
        // annotations and artifact type ride along for listing.
        let preview: serde_json::Value = serde_json::from_slice(&content)
            .map_err(|error| Error::Transport(format!("parse manifest: {error}")))?;
        let media_type = preview
            .get("mediaType")
            .and_then(|value| value.as_str())
            .unwrap_or(oci::IMAGE_MANIFEST)
            .to_string();
        let artifact_type = preview
            .get("artifactType")
            .and_then(|value| value.as_str())
            .map(String::from);
        let annotations = preview
            .get("annotations")
            .and_then(|value| {
                serde_json::from_value::<std::collections::BTreeMap<String, String>>(value.clone())
                    .ok()
            })
            .unwrap_or_default();

        Ok(Descriptor {
            media_type,
            digest,
            size: content.len() as i64,
            urls: Vec::new(),
            annotations,
            artifact_type,
            platform: None,
            data: None,
        })
    }

    #[tracing::instrument]
    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error> {
        if !oci::is_taggable(&descriptor.media_type) {
            return Err(Error::Unsupported(format!(
                "registries only tag manifests and indexes, not {}",
                descriptor.media_type
            )));
        }

        let parsed = Reference::from_str(reference)
            .map_err(|error| Error::InvalidReference(format!("{reference}: {error}")))?;
        let tag = match (&parsed.tag, &parsed.digest) {
            (Some(tag), _) => tag.clone(),
            // Tagging by digest is a self-tag; digests always resolve.
            (None, Some(digest)) if *digest == descriptor.digest => return Ok(()),
            _ => {
                return Err(Error::InvalidReference(format!(
                    "{reference}: no tag to apply"
                )))
            }
        };

        let content = self.fetch(descriptor).await?;
        let target = self.reference(&tag);
        self.authenticate(&target, RegistryOperation::Push).await?;

        let content_type = http::HeaderValue::from_str(&descriptor.media_type)
            .map_err(|error| Error::Transport(error.to_string()))?;
        self.client
            .push_manifest_raw(&target, content.to_vec(), content_type)
            .await
            .map_err(transport)?;
        Ok(())
    }

    fn tags(&self) -> Option<&dyn TagLister> {
        Some(self)
    }
}

#[async_trait]
impl TagLister for Registry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, Error> {
        if repository != self.repository {
            return Err(Error::Unsupported(format!(
                "this store serves {}, not {repository}",
                self.repository
            )));
        }

        let reference = oci_client::Reference::with_tag(
            self.registry.clone(),
            self.repository.clone(),
            "latest".to_string(),
        );
        let response = self
            .client
            .list_tags(&reference, &self.auth, None, None)
            .await
            .map_err(transport)?;
        Ok(response.tags)
    }
}
