//! The repository engine: publishing and retrieving component versions and
//! their resources.
//!
//! A component version persists as an OCI image manifest whose first layer
//! is the encoded component descriptor and whose remaining layers are the
//! descriptors staged by local resource uploads. Listing, resource
//! retrieval, artifact upload and download all read that shape back.

use std::{str::FromStr, sync::Arc};

use bytes::Bytes;
use color_eyre::{
    eyre::{bail, ensure, eyre, Context},
    Result, Section, SectionExt,
};
use itertools::Itertools;
use tap::Pipe;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::{
    copy::{self, CopyOptions},
    descriptor::{
        self, Access, AccessScheme, ComponentDescriptor, DigestSpec, Identity, LocalBlobAccess,
        OciArtifactAccess, OciLayerAccess, Resource, GENERIC_BLOB_DIGEST, OCI_ARTIFACT_DIGEST,
    },
    layout,
    oci::{self, ArtifactKind, Descriptor, Index, Manifest},
    resolver::Resolver,
    staging::Staging,
    store::{Error, Store},
    version_from_tag, Algorithm, Digest, Reference,
};

/// The default creator annotation value.
const DEFAULT_CREATOR: &str = concat!("stevedore/", env!("CARGO_PKG_VERSION"));

/// A piece of content returned from a repository, with the metadata needed
/// to interpret and verify it.
#[derive(Debug, Clone)]
pub struct Blob {
    /// The media type of the content.
    pub media_type: String,

    /// The digest of the content.
    pub digest: Digest,

    /// The content itself.
    pub bytes: Bytes,
}

impl Blob {
    /// Wrap content, computing its digest with the canonical algorithm.
    pub fn new(media_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            media_type: media_type.into(),
            digest: Digest::from_content(&bytes),
            bytes,
        }
    }

    /// The size of the content in bytes.
    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }
}

/// How the access of a local resource is rewritten once it is staged.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LocalResourceMode {
    /// The access becomes a local blob whose global access names the staged
    /// artifact as an OCI layer.
    #[default]
    LocalBlobWithGlobalAccess,

    /// The access directly names the staged artifact as an OCI layer.
    OciLayer,
}

/// A repository of component versions backed by OCI stores.
#[derive(Debug)]
pub struct Repository {
    scheme: AccessScheme,
    resolver: Arc<dyn Resolver>,
    staging: Staging,
    creator: String,
    copy_options: CopyOptions,
    mode: LocalResourceMode,
}

#[bon::bon]
impl Repository {
    /// Create a repository over the provided resolver.
    #[builder]
    pub fn new(
        /// Maps coordinates to references and references to stores.
        resolver: Arc<dyn Resolver>,

        /// The access types this repository understands.
        scheme: Option<AccessScheme>,

        /// The agent identifier written on published manifests.
        #[builder(into)]
        creator: Option<String>,

        /// Options applied to every graph copy and search.
        copy_options: Option<CopyOptions>,

        /// How staged local resources rewrite their access.
        #[builder(default)]
        mode: LocalResourceMode,
    ) -> Self {
        Self {
            scheme: scheme.unwrap_or_default(),
            resolver,
            staging: Staging::new(),
            creator: creator.unwrap_or_else(|| DEFAULT_CREATOR.to_string()),
            copy_options: copy_options.unwrap_or_default(),
            mode,
        }
    }
}

impl Repository {
    /// The canonical reference and store for a component coordinate.
    async fn location(&self, name: &str, version: &str) -> Result<(Reference, Arc<dyn Store>)> {
        let reference = self
            .resolver
            .component_reference(name, version)
            .context("build component reference")?;
        let store = self
            .resolver
            .store(&reference)
            .await
            .context("resolve store")?;
        Ok((reference, store))
    }

    /// Publish a component version.
    ///
    /// The descriptor is encoded and pushed, then sealed together with every
    /// staged local resource descriptor under a freshly tagged top-level
    /// manifest. On success the staged set for the coordinate is cleared; on
    /// failure it is deliberately left intact so a retry does not re-upload
    /// content.
    #[instrument(skip(self, component), fields(component = %component.component.name, version = %component.component.version))]
    pub async fn add_component_version(&self, component: &ComponentDescriptor) -> Result<()> {
        component.validate().context("validate descriptor")?;
        let name = component.component.name.clone();
        let version = component.component.version.clone();
        let (reference, store) = self.location(&name, &version).await?;

        let encoded = descriptor::encode(component)
            .await
            .context("encode descriptor")?;
        let descriptor_layer =
            Descriptor::for_content(oci::COMPONENT_DESCRIPTOR_LAYER, &encoded);
        store
            .push(&descriptor_layer, Bytes::from(encoded))
            .await
            .context("push descriptor layer")?;

        let config = oci::empty_descriptor();
        if !store
            .exists(&config)
            .await
            .context("check for config blob")?
        {
            store
                .push(&config, Bytes::from_static(oci::EMPTY_JSON_CONTENT))
                .await
                .context("push config blob")?;
        }

        let mut layers = vec![descriptor_layer];
        layers.extend(self.staging.get(&reference.to_string()));

        let mut manifest = Manifest::builder()
            .artifact_type(oci::COMPONENT_DESCRIPTOR_V2)
            .config(config)
            .layers(layers)
            .build();
        manifest.subject = Some(oci::component_index_descriptor());
        manifest.annotations.insert(
            oci::ANNOTATION_COMPONENT_VERSION.to_string(),
            oci::component_version_annotation(&name, &version),
        );
        manifest
            .annotations
            .insert(oci::ANNOTATION_CREATOR.to_string(), self.creator.clone());

        let manifest_descriptor = manifest.descriptor()?;
        store
            .push(&manifest_descriptor, Bytes::from(manifest.to_bytes()?))
            .await
            .context("push component manifest")?;
        store
            .tag(&manifest_descriptor, &reference.to_string())
            .await
            .context("tag component manifest")?;

        self.staging.delete(&reference.to_string());
        debug!(%reference, digest = %manifest_descriptor.digest, "published component version");
        Ok(())
    }

    /// Fetch the component manifest (and any wrapping index) for a
    /// reference.
    async fn component_manifest(
        &self,
        store: &Arc<dyn Store>,
        reference: &Reference,
    ) -> Result<(Option<Index>, Manifest)> {
        let descriptor = store
            .resolve(&reference.to_string())
            .await
            .context("resolve component reference")?;
        let content = store
            .fetch(&descriptor)
            .await
            .context("fetch component manifest")?;

        if oci::is_image_index(&descriptor.media_type) {
            let index = Index::from_bytes(&content)?;
            let first = index
                .manifests
                .first()
                .ok_or_else(|| eyre!("component index lists no manifests"))?;
            ensure!(
                oci::is_image_manifest(&first.media_type),
                "the first entry of a component index must be an image manifest, found {}",
                first.media_type
            );
            let content = store
                .fetch(first)
                .await
                .context("fetch component manifest from index")?;
            let manifest = Manifest::from_bytes(&content)?;
            Ok((Some(index), manifest))
        } else if oci::is_image_manifest(&descriptor.media_type) {
            Ok((None, Manifest::from_bytes(&content)?))
        } else {
            bail!(
                "component reference resolves to unsupported media type {}",
                descriptor.media_type
            );
        }
    }

    /// Decode the component descriptor carried by a component manifest.
    async fn decode_descriptor(
        &self,
        store: &Arc<dyn Store>,
        manifest: &Manifest,
    ) -> Result<ComponentDescriptor> {
        let layer = manifest
            .layers
            .iter()
            .find(|layer| layer.media_type.starts_with(oci::COMPONENT_DESCRIPTOR))
            .ok_or_else(|| eyre!("component manifest carries no descriptor layer"))?;
        let content = store
            .fetch(layer)
            .await
            .context("fetch descriptor layer")?;
        descriptor::decode(&content).await.context("decode descriptor")
    }

    /// Retrieve a component version.
    #[instrument(skip(self))]
    pub async fn get_component_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<ComponentDescriptor> {
        let (reference, store) = self.location(name, version).await?;
        let (_, manifest) = self.component_manifest(&store, &reference).await?;
        let component = self.decode_descriptor(&store, &manifest).await?;

        ensure!(
            component.component.name == name && component.component.version == version,
            "stored descriptor names {}:{} but was retrieved as {name}:{version}",
            component.component.name,
            component.component.version,
        );
        Ok(component)
    }

    /// List the known versions of a component, newest first.
    ///
    /// Tag listing and referrer listing are both consulted where the store
    /// supports them; results merge, sort descending by loose semver, and
    /// deduplicate. At least one listing path must be available.
    #[instrument(skip(self))]
    pub async fn list_component_versions(&self, name: &str) -> Result<Vec<String>> {
        let (reference, store) = self.location(name, "latest").await?;

        let mut versions = Vec::new();
        let mut failures = Vec::new();
        let mut supported = false;

        if let Some(lister) = store.tags() {
            supported = true;
            match self
                .versions_from_tags(&store, lister, &reference)
                .await
                .context("list versions through tags")
            {
                Ok(found) => versions.extend(found),
                Err(error) => failures.push(error),
            }
        }
        if let Some(lister) = store.referrers() {
            supported = true;
            match self
                .versions_from_referrers(lister, name)
                .await
                .context("list versions through referrers")
            {
                Ok(found) => versions.extend(found),
                Err(error) => failures.push(error),
            }
        }

        ensure!(
            supported,
            "store supports neither tag listing nor referrer listing"
        );
        if versions.is_empty() && !failures.is_empty() {
            let mut report = eyre!("every supported listing path failed");
            for failure in failures {
                report = report.section(format!("{failure:#}").header("Failure:"));
            }
            return Err(report);
        }

        versions
            .into_iter()
            .filter_map(|version| match crate::parse_loose_version(&version) {
                Some(semver) => Some((semver, version)),
                None => {
                    warn!(%version, "skipping tag that does not parse as a version");
                    None
                }
            })
            .sorted_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)))
            .dedup_by(|a, b| a.1 == b.1)
            .map(|(_, version)| version)
            .collect::<Vec<_>>()
            .pipe(Ok)
    }

    async fn versions_from_tags(
        &self,
        store: &Arc<dyn Store>,
        lister: &dyn crate::store::TagLister,
        reference: &Reference,
    ) -> Result<Vec<String>> {
        let tags = lister
            .list_tags(&reference.repository)
            .await
            .context("list tags")?;

        let mut tasks = JoinSet::new();
        for tag in tags {
            let store = store.clone();
            let candidate = reference.with_tag(&tag).to_string();
            tasks.spawn(async move {
                let descriptor = store.resolve(&candidate).await?;
                Ok::<_, Error>((tag, descriptor))
            });
        }

        let mut versions = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (tag, descriptor) = match joined.context("join tag resolution")? {
                Ok(resolved) => resolved,
                Err(Error::NotFound(reference)) => {
                    debug!(%reference, "tag disappeared during listing");
                    continue;
                }
                Err(error) => return Err(error).context("resolve tag"),
            };
            if is_component_manifest(&descriptor) {
                versions.push(version_from_tag(&tag));
            }
        }
        Ok(versions)
    }

    async fn versions_from_referrers(
        &self,
        lister: &dyn crate::store::ReferrerLister,
        name: &str,
    ) -> Result<Vec<String>> {
        let referrers = lister
            .list_referrers(
                &oci::component_index_descriptor(),
                Some(oci::COMPONENT_DESCRIPTOR_V2),
            )
            .await
            .context("list referrers")?;

        let mut versions = Vec::new();
        for referrer in referrers {
            let Some(annotation) = referrer.annotations.get(oci::ANNOTATION_COMPONENT_VERSION)
            else {
                continue;
            };
            match oci::parse_component_version_annotation(annotation) {
                Ok((component, version)) if component == name => versions.push(version),
                Ok(_) => {}
                Err(error) => warn!(%annotation, %error, "skipping malformed referrer"),
            }
        }
        Ok(versions)
    }

    /// Attach content to a component version as a local resource.
    ///
    /// OCI layout blobs are exploded into the component's store as full
    /// artifact graphs; anything else is wrapped as a single-layer manifest.
    /// Either way the resulting descriptor joins the staged set for the
    /// coordinate, and the resource's access and digest are rewritten in
    /// place to point at the staged artifact.
    #[instrument(skip(self, resource, content), fields(resource = %resource.name))]
    pub async fn add_local_resource(
        &self,
        name: &str,
        version: &str,
        resource: &mut Resource,
        content: Bytes,
    ) -> Result<()> {
        let access = self
            .scheme
            .resolve(&resource.access)
            .context("resolve resource access")?;
        let Access::LocalBlob(local) = access else {
            bail!(
                "local resources require a local blob access, found {}",
                resource.access.kind()
            );
        };

        let (reference, store) = self.location(name, version).await?;
        let staged = if oci::is_oci_layout(&local.media_type) {
            self.stage_layout(&store, resource, &content)
                .await
                .context("stage layout resource")?
        } else {
            self.stage_blob(&store, resource, &local, content)
                .await
                .context("stage blob resource")?
        };

        self.staging.add(reference.to_string(), staged.clone());
        self.rewrite_access(resource, &reference, &staged, &local.media_type);
        debug!(%reference, digest = %staged.digest, "staged local resource");
        Ok(())
    }

    /// Explode an OCI layout blob into the store and stage its index.
    async fn stage_layout(
        &self,
        store: &Arc<dyn Store>,
        resource: &Resource,
        content: &Bytes,
    ) -> Result<Descriptor> {
        let reader = Arc::new(
            layout::Reader::read(content.as_ref())
                .await
                .context("parse layout")?,
        );
        let index = reader.index().clone();
        let index_content = index.to_bytes()?;

        for manifest in &index.manifests {
            copy::graph(
                reader.clone(),
                store.clone(),
                manifest.clone(),
                self.copy_options.clone(),
            )
            .await
            .with_context(|| format!("copy graph rooted at {}", manifest.digest))?;
        }

        let mut descriptor = index.descriptor()?;
        store
            .push(&descriptor, Bytes::from(index_content))
            .await
            .context("push layout index")?;
        oci::adopt_descriptor(&mut descriptor, resource.identity(), ArtifactKind::Resource)
            .context("mark index with resource identity")?;
        Ok(descriptor)
    }

    /// Wrap an opaque blob as a single-layer artifact and stage its
    /// manifest.
    async fn stage_blob(
        &self,
        store: &Arc<dyn Store>,
        resource: &Resource,
        local: &LocalBlobAccess,
        content: Bytes,
    ) -> Result<Descriptor> {
        let digest = if local.local_reference.is_empty() {
            Digest::from_content(&content)
        } else {
            Digest::from_str(&local.local_reference).context("parse local reference digest")?
        };
        let mut layer = Descriptor::builder()
            .media_type(local.media_type.clone())
            .digest(digest)
            .size(content.len() as i64)
            .build();
        oci::adopt_descriptor(&mut layer, resource.identity(), ArtifactKind::Resource)
            .context("mark layer with resource identity")?;
        store.push(&layer, content).await.context("push layer")?;

        let config = oci::empty_descriptor();
        if !store
            .exists(&config)
            .await
            .context("check for config blob")?
        {
            store
                .push(&config, Bytes::from_static(oci::EMPTY_JSON_CONTENT))
                .await
                .context("push config blob")?;
        }

        let manifest = Manifest::builder()
            .artifact_type(local.media_type.clone())
            .config(config)
            .layers(vec![layer])
            .build();
        let mut descriptor = manifest.descriptor()?;
        store
            .push(&descriptor, Bytes::from(manifest.to_bytes()?))
            .await
            .context("push wrapping manifest")?;
        oci::adopt_descriptor(&mut descriptor, resource.identity(), ArtifactKind::Resource)
            .context("mark manifest with resource identity")?;
        Ok(descriptor)
    }

    /// Rewrite a staged resource's access and digest in place.
    ///
    /// The local blob wrapper keeps the media type the content was staged
    /// with, so retrieval dispatches the same way the staging did; the
    /// nested layer access describes the staged artifact itself.
    fn rewrite_access(
        &self,
        resource: &mut Resource,
        reference: &Reference,
        staged: &Descriptor,
        blob_media_type: &str,
    ) {
        let layer_access = OciLayerAccess::builder()
            .reference(reference.to_string())
            .digest(staged.digest.clone())
            .media_type(staged.media_type.clone())
            .size(staged.size)
            .build();
        resource.access = match self.mode {
            LocalResourceMode::OciLayer => Access::OciLayer(layer_access),
            LocalResourceMode::LocalBlobWithGlobalAccess => Access::LocalBlob(
                LocalBlobAccess::builder()
                    .local_reference(staged.digest.to_string())
                    .media_type(blob_media_type)
                    .global_access(Box::new(Access::OciLayer(layer_access)))
                    .build(),
            ),
        };
        resource.digest = Some(DigestSpec::oci_artifact(&staged.digest));
    }

    /// Retrieve a local resource by identity.
    ///
    /// The identity may omit extra identity attributes; it must match
    /// exactly one resource of the stored descriptor.
    #[instrument(skip(self))]
    pub async fn get_local_resource(
        &self,
        name: &str,
        version: &str,
        identity: &Identity,
    ) -> Result<Blob> {
        let (reference, store) = self.location(name, version).await?;
        let (index, manifest) = self.component_manifest(&store, &reference).await?;
        let component = self.decode_descriptor(&store, &manifest).await?;

        let matches = component
            .component
            .resources
            .iter()
            .filter(|resource| identity.is_subset_of(&resource.identity()))
            .collect::<Vec<_>>();
        ensure!(
            matches.len() == 1,
            "identity {identity} matches {} resources of {name}:{version}, expected exactly 1",
            matches.len(),
        );
        let resource = matches[0];

        let access = self
            .scheme
            .resolve(&resource.access)
            .context("resolve resource access")?;
        let Access::LocalBlob(local) = access else {
            bail!(
                "local resources require a local blob access, found {}",
                resource.access.kind()
            );
        };

        let candidates: Vec<Descriptor> = match &index {
            Some(index) => index.manifests.clone(),
            None => manifest.layers.clone(),
        };
        let target = resource.identity();
        let candidate = candidates
            .into_iter()
            .find(|candidate| {
                oci::matches_identity(candidate, &target, ArtifactKind::Resource)
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                eyre!("no stored artifact carries the identity {target}")
                    .with_section(|| reference.to_string().header("Component:"))
            })?;

        if oci::is_oci_layout(&local.media_type) {
            self.materialize_layout(&store, &candidate, local.reference_name.as_deref())
                .await
        } else if oci::is_image_manifest(&candidate.media_type) {
            let content = store
                .fetch(&candidate)
                .await
                .context("fetch wrapping manifest")?;
            let wrapper = Manifest::from_bytes(&content)?;
            let layer = wrapper
                .layers
                .first()
                .ok_or_else(|| eyre!("wrapping manifest carries no layers"))?;
            let bytes = store.fetch(layer).await.context("fetch resource layer")?;
            Ok(Blob {
                media_type: layer.media_type.clone(),
                digest: layer.digest.clone(),
                bytes,
            })
        } else {
            // The barebones shape: the matched descriptor is the content
            // layer itself.
            let bytes = store
                .fetch(&candidate)
                .await
                .context("fetch resource layer")?;
            Ok(Blob {
                media_type: candidate.media_type.clone(),
                digest: candidate.digest.clone(),
                bytes,
            })
        }
    }

    /// Extract the graph below a descriptor into a fresh gzipped layout.
    async fn materialize_layout(
        &self,
        store: &Arc<dyn Store>,
        root: &Descriptor,
        reference_name: Option<&str>,
    ) -> Result<Blob> {
        let writer = Arc::new(layout::Writer::tar_gzip());
        copy::graph(
            store.clone(),
            writer.clone(),
            root.clone(),
            self.copy_options.clone(),
        )
        .await
        .context("materialize layout")?;
        if let Some(reference_name) = reference_name {
            writer
                .tag(root, reference_name)
                .await
                .context("tag layout root")?;
        }

        let (descriptor, bytes) = writer.close().await.context("seal layout")?;
        Ok(Blob {
            media_type: descriptor.media_type,
            digest: descriptor.digest,
            bytes,
        })
    }

    /// Upload an artifact carried in an OCI layout to its target reference.
    ///
    /// The resource's access must name an artifact inside the layout; after
    /// the copy the access points at the target and the digest records the
    /// transferred artifact.
    #[instrument(skip(self, resource, layout_blob), fields(resource = %resource.name))]
    pub async fn upload_resource(
        &self,
        target: &Reference,
        resource: &mut Resource,
        layout_blob: Bytes,
    ) -> Result<()> {
        let access = self
            .scheme
            .resolve(&resource.access)
            .context("resolve resource access")?;
        let Access::OciArtifact(artifact) = access else {
            bail!(
                "uploading requires an artifact access, found {}",
                resource.access.kind()
            );
        };

        let reader = Arc::new(
            layout::Reader::read(layout_blob.as_ref())
                .await
                .context("parse layout")?,
        );
        let root = self
            .resolve_in_layout(&reader, &artifact.image_reference)
            .await
            .with_context(|| format!("resolve {} inside layout", artifact.image_reference))?;

        let store = self
            .resolver
            .store(target)
            .await
            .context("resolve target store")?;
        copy::graph(
            reader.clone(),
            store.clone(),
            root.clone(),
            self.copy_options.clone(),
        )
        .await
        .context("copy artifact to target")?;
        store
            .tag(&root, &target.to_string())
            .await
            .context("tag artifact in target")?;

        resource.digest = Some(DigestSpec::oci_artifact(&root.digest));
        resource.access = Access::OciArtifact(
            OciArtifactAccess::builder()
                .image_reference(target.to_string())
                .build(),
        );
        Ok(())
    }

    /// Resolve a reference against a layout, tolerating the laxer keying
    /// some producers use.
    async fn resolve_in_layout(
        &self,
        reader: &Arc<layout::Reader>,
        reference: &str,
    ) -> Result<Descriptor> {
        match reader.resolve(reference).await {
            Ok(descriptor) => return Ok(descriptor),
            Err(Error::NotFound(_)) => {}
            Err(error) => return Err(error).context("resolve in layout"),
        }

        // Some tools key their layouts by bare tag.
        if let Ok(parsed) = Reference::from_str(reference) {
            if let Some(tag) = &parsed.tag {
                match reader.resolve(tag).await {
                    Ok(descriptor) => return Ok(descriptor),
                    Err(Error::NotFound(_)) => {}
                    Err(error) => return Err(error).context("resolve bare tag in layout"),
                }
            }
        }

        // Last resort: when the layout holds exactly one top-level artifact
        // there is nothing to disambiguate.
        let store: Arc<dyn Store> = reader.clone();
        let tops = copy::top_level(store, reader.index().manifests.clone(), &self.copy_options).await;
        match tops.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(Error::NotFound(reference.to_string()))
                .context("reference does not resolve inside the layout"),
        }
    }

    /// Download the content a resource's access points at.
    ///
    /// Artifacts materialize as gzipped OCI layouts; layer accesses return
    /// the layer bytes. Either way a digest carried by the resource is
    /// validated against the materialized content.
    #[instrument(skip(self, resource), fields(resource = %resource.name))]
    pub async fn download_resource(&self, resource: &Resource) -> Result<Blob> {
        let access = self
            .scheme
            .resolve(&resource.access)
            .context("resolve resource access")?;
        self.download_access(resource, &access).await
    }

    async fn download_access(&self, resource: &Resource, access: &Access) -> Result<Blob> {
        match access {
            Access::OciArtifact(artifact) => {
                let reference = Reference::from_str(&artifact.image_reference)
                    .context("parse artifact reference")?;
                let store = self
                    .resolver
                    .store(&reference)
                    .await
                    .context("resolve store")?;
                let root = store
                    .resolve(&artifact.image_reference)
                    .await
                    .context("resolve artifact")?;

                let blob = self
                    .materialize_layout(&store, &root, Some(&artifact.image_reference))
                    .await?;
                validate_resource_digest(resource, &root.digest, &blob.bytes)?;
                Ok(blob)
            }
            Access::OciLayer(layer) => {
                let reference =
                    Reference::from_str(&layer.reference).context("parse layer reference")?;
                let store = self
                    .resolver
                    .store(&reference)
                    .await
                    .context("resolve store")?;
                let root = store
                    .resolve(&layer.reference)
                    .await
                    .context("resolve enclosing artifact")?;

                let found = copy::find_digest(
                    store.clone(),
                    root,
                    layer.digest.clone(),
                    self.copy_options.clone(),
                )
                .await
                .context("search for layer")?;
                let bytes = store.fetch(&found).await.context("fetch layer")?;

                validate_resource_digest(resource, &found.digest, &bytes)?;
                Ok(Blob {
                    media_type: found.media_type,
                    digest: found.digest,
                    bytes,
                })
            }
            Access::LocalBlob(local) => match &local.global_access {
                Some(global) if matches!(global.as_ref(), Access::OciLayer(_)) => {
                    Box::pin(self.download_access(resource, global)).await
                }
                _ => bail!("local blob access has no downloadable global access"),
            },
            Access::Other(other) => {
                bail!("cannot download access type {}", other.kind)
            }
        }
    }
}

/// Report whether a resolved descriptor marks a component manifest:
/// either the current shape carrying the component descriptor artifact
/// type, or the legacy shape with no artifact type at all.
fn is_component_manifest(descriptor: &Descriptor) -> bool {
    match descriptor.artifact_type.as_deref() {
        Some(oci::COMPONENT_DESCRIPTOR_V2) => oci::is_taggable(&descriptor.media_type),
        Some(_) => false,
        None => oci::is_image_manifest(&descriptor.media_type),
    }
}

/// Validate a materialized download against the digest the resource
/// declares, if it declares one.
fn validate_resource_digest(resource: &Resource, top: &Digest, content: &[u8]) -> Result<()> {
    let Some(declared) = &resource.digest else {
        return Ok(());
    };
    let algorithm = Algorithm::from_descriptor_name(&declared.hash_algorithm)
        .ok_or_else(|| eyre!("unknown hash algorithm: {}", declared.hash_algorithm))?;

    let actual = match declared.normalisation_algorithm.as_str() {
        OCI_ARTIFACT_DIGEST => top.clone(),
        GENERIC_BLOB_DIGEST => Digest {
            algorithm,
            hash: algorithm.hash(content),
        },
        other => bail!("unsupported normalisation algorithm: {other}"),
    };
    if actual.as_hex() != declared.value {
        return Err(Error::DigestMismatch {
            expected: format!("{algorithm}:{}", declared.value),
            actual: actual.to_string(),
        })
        .context("validate downloaded content");
    }
    Ok(())
}
