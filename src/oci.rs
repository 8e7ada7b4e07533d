//! The OCI image model: descriptors, manifests, indexes, and the
//! annotation scheme used to attach component identities to them.

use std::collections::BTreeMap;

use bon::Builder;
use color_eyre::{
    eyre::{bail, Context},
    Result,
};
use serde::{Deserialize, Serialize};
use tap::Pipe;
use tracing::debug;

use crate::{descriptor::Identity, Digest};

/// Media type prefix shared by all component descriptor encodings.
pub const COMPONENT_DESCRIPTOR: &str = "application/vnd.ocm.software.component-descriptor";

/// Media type of a v2 component descriptor, independent of encoding.
pub const COMPONENT_DESCRIPTOR_V2: &str = "application/vnd.ocm.software.component-descriptor.v2";

/// Media type of the persisted form of a v2 component descriptor:
/// a YAML document wrapped in a single-entry tar.
pub const COMPONENT_DESCRIPTOR_LAYER: &str =
    "application/vnd.ocm.software.component-descriptor.v2+yaml+tar";

/// Media type prefix shared by all OCI layout encodings.
pub const OCI_LAYOUT: &str = "application/vnd.ocm.software.oci.layout";

/// Media type of an OCI image layout packaged as a tar.
pub const OCI_LAYOUT_TAR: &str = "application/vnd.ocm.software.oci.layout.v1+tar";

/// Media type of an OCI image layout packaged as a gzipped tar.
pub const OCI_LAYOUT_TAR_GZIP: &str = "application/vnd.ocm.software.oci.layout.v1+tar+gzip";

/// Media type of an OCI image manifest.
pub const IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// Media type of an OCI image index.
pub const IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Media type of a plain OCI image layer.
pub const IMAGE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// Media type of the OCI empty JSON blob.
pub const EMPTY_JSON: &str = "application/vnd.oci.empty.v1+json";

/// Media type of the synthetic blob every published component manifest
/// declares as its subject, so that stores with a referrers index can
/// enumerate component versions without listing tags.
pub const COMPONENT_INDEX: &str = "application/vnd.ocm.software.component-index.v1+json";

/// Annotation naming the component version a manifest belongs to.
/// The value is `component-descriptors/<name>:<version>`.
pub const ANNOTATION_COMPONENT_VERSION: &str = "software.ocm.componentversion";

/// Annotation naming the agent that published a component version.
pub const ANNOTATION_CREATOR: &str = "software.ocm.creator";

/// Annotation carrying the component identities of an artifact,
/// as a JSON array of [`ArtifactEntry`].
pub const ANNOTATION_ARTIFACT: &str = "software.ocm.artifact";

/// Annotation naming the reference a manifest was tagged with
/// inside an OCI layout index.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// The content of the OCI empty JSON blob.
pub const EMPTY_JSON_CONTENT: &[u8] = b"{}";

/// Identity attribute mapped to [`Platform::architecture`].
pub const IDENTITY_ARCHITECTURE: &str = "architecture";

/// Identity attribute mapped to [`Platform::os`].
pub const IDENTITY_OS: &str = "os";

/// Identity attribute mapped to [`Platform::variant`].
pub const IDENTITY_VARIANT: &str = "variant";

/// Identity attribute mapped to [`Platform::os_version`].
pub const IDENTITY_OS_VERSION: &str = "os.version";

/// Identity attribute mapped to [`Platform::os_features`], comma-separated.
pub const IDENTITY_OS_FEATURES: &str = "os.features";

/// Report whether the media type identifies an OCI image manifest.
pub fn is_image_manifest(media_type: &str) -> bool {
    media_type == IMAGE_MANIFEST
}

/// Report whether the media type identifies an OCI image index.
pub fn is_image_index(media_type: &str) -> bool {
    media_type == IMAGE_INDEX
}

/// Report whether the media type identifies content that participates in
/// tag resolution: manifests and indexes are taggable, plain blobs are not.
pub fn is_taggable(media_type: &str) -> bool {
    is_image_manifest(media_type) || is_image_index(media_type)
}

/// Report whether the media type identifies an OCI layout tar,
/// gzipped or not.
pub fn is_oci_layout(media_type: &str) -> bool {
    media_type == OCI_LAYOUT_TAR || media_type == OCI_LAYOUT_TAR_GZIP
}

/// The platform section of a descriptor.
///
/// Never constructed by hand in this crate: the write side fills it from
/// the well-known identity attributes of a resource
/// (see [`platform_from_identity`]), and the read side gets it back from
/// the manifests and indexes a store serves. Attributes outside the five
/// mapped here travel through the artifact annotation instead.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, mirrored from the [`IDENTITY_ARCHITECTURE`]
    /// attribute. Empty when the identity only named an operating system.
    #[builder(into)]
    pub architecture: String,

    /// Operating system, mirrored from the [`IDENTITY_OS`] attribute.
    /// Empty when the identity only named an architecture.
    #[builder(into)]
    pub os: String,

    /// Operating system version, mirrored verbatim from the
    /// [`IDENTITY_OS_VERSION`] attribute.
    #[builder(into)]
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Required platform features. The [`IDENTITY_OS_FEATURES`] attribute
    /// carries these comma-separated; here they are individual entries.
    #[builder(into, default)]
    #[serde(rename = "os.features", default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,

    /// CPU variant, mirrored from the [`IDENTITY_VARIANT`] attribute.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

/// A content descriptor: the address of a blob plus everything needed
/// to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// The media type of the referenced content.
    #[builder(into)]
    pub media_type: String,

    /// The content-addressable digest of the referenced content.
    #[builder(into)]
    pub digest: Digest,

    /// The size of the referenced content in bytes.
    pub size: i64,

    /// Download mirrors for the referenced content.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    /// Arbitrary annotations attached to the descriptor.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// The type of artifact the referenced content represents,
    /// when the content is a manifest.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// The platform the referenced content targets,
    /// when the content is a platform-specific manifest or layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Embedded content, base64 encoded. Only used for very small blobs.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Descriptor {
    /// Create a descriptor addressing the provided content.
    pub fn for_content(media_type: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        let content = content.as_ref();
        Self::builder()
            .media_type(media_type)
            .digest(Digest::from_content(content))
            .size(content.len() as i64)
            .build()
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {} bytes)", self.digest, self.media_type, self.size)
    }
}

impl From<&Descriptor> for Descriptor {
    fn from(descriptor: &Descriptor) -> Self {
        descriptor.clone()
    }
}

/// The descriptor of the OCI empty JSON blob, used as the config of
/// manifests that carry no runnable image configuration.
pub fn empty_descriptor() -> Descriptor {
    Descriptor::builder()
        .media_type(EMPTY_JSON)
        .digest(Digest::from_content(EMPTY_JSON_CONTENT))
        .size(EMPTY_JSON_CONTENT.len() as i64)
        .data("e30=")
        .build()
}

/// The stable descriptor every published component manifest declares as its
/// subject. Referrer-capable stores index component manifests under it.
pub fn component_index_descriptor() -> Descriptor {
    Descriptor::for_content(COMPONENT_INDEX, EMPTY_JSON_CONTENT)
}

/// An OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always 2 for this generation of the image spec.
    #[builder(default = 2)]
    pub schema_version: u32,

    /// The media type of the manifest itself.
    #[builder(into, default = IMAGE_MANIFEST.to_string())]
    pub media_type: String,

    /// The type of artifact the manifest represents.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// The configuration blob of the artifact.
    pub config: Descriptor,

    /// The content layers of the artifact, in application order.
    #[builder(default)]
    pub layers: Vec<Descriptor>,

    /// The manifest this manifest refers to, discoverable via the
    /// referrers API where the store supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Arbitrary annotations attached to the manifest.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    /// Serialize the manifest to its canonical JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serialize manifest")
    }

    /// Parse a manifest from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("parse manifest")
    }

    /// The descriptor addressing this manifest, including its artifact type.
    pub fn descriptor(&self) -> Result<Descriptor> {
        let bytes = self.to_bytes()?;
        let mut descriptor = Descriptor::for_content(&self.media_type, &bytes);
        descriptor.artifact_type = self.artifact_type.clone();
        Ok(descriptor)
    }
}

/// An OCI image index.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Always 2 for this generation of the image spec.
    #[builder(default = 2)]
    pub schema_version: u32,

    /// The media type of the index itself.
    #[builder(into, default = IMAGE_INDEX.to_string())]
    pub media_type: String,

    /// The type of artifact the index represents.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// The manifests the index lists.
    #[builder(default)]
    pub manifests: Vec<Descriptor>,

    /// Arbitrary annotations attached to the index.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Index {
    /// Serialize the index to its canonical JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serialize index")
    }

    /// Parse an index from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("parse index")
    }

    /// The descriptor addressing this index, including its artifact type.
    pub fn descriptor(&self) -> Result<Descriptor> {
        let bytes = self.to_bytes()?;
        let mut descriptor = Descriptor::for_content(&self.media_type, &bytes);
        descriptor.artifact_type = self.artifact_type.clone();
        Ok(descriptor)
    }
}

/// The descriptors directly referenced by a piece of content.
///
/// Manifests reference their config and layers; indexes reference their
/// manifests; plain blobs reference nothing. Subjects are deliberately not
/// successors: they point backwards in the graph, and following them would
/// make copies attempt to transfer content the graph does not contain.
pub fn successors(media_type: &str, content: &[u8]) -> Result<Vec<Descriptor>> {
    if is_image_index(media_type) {
        let index = Index::from_bytes(content)?;
        Ok(index.manifests)
    } else if is_image_manifest(media_type) {
        let manifest = Manifest::from_bytes(content)?;
        let mut successors = vec![manifest.config];
        successors.extend(manifest.layers);
        Ok(successors)
    } else {
        Ok(Vec::new())
    }
}

/// The role a component artifact plays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The artifact is a component source.
    Source,

    /// The artifact is a component resource.
    Resource,
}

/// One entry of the `software.ocm.artifact` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// The full identity of the artifact within its component version.
    pub identity: Identity,

    /// The role the artifact plays.
    pub kind: ArtifactKind,
}

/// Parse the artifact annotation of a descriptor.
/// A missing annotation is an empty list; an unparseable one is fatal.
pub fn artifact_entries(descriptor: &Descriptor) -> Result<Vec<ArtifactEntry>> {
    match descriptor.annotations.get(ANNOTATION_ARTIFACT) {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw).context("parse artifact annotation"),
    }
}

/// Extract the OCI platform fields from an identity.
///
/// Only the well-known attribute names participate; everything else travels
/// exclusively through the artifact annotation. Returns `None` when the
/// identity names neither an architecture nor an operating system.
pub fn platform_from_identity(identity: &Identity) -> Option<Platform> {
    let architecture = identity.get(IDENTITY_ARCHITECTURE);
    let os = identity.get(IDENTITY_OS);
    if architecture.is_none() && os.is_none() {
        return None;
    }

    let os_features = identity
        .get(IDENTITY_OS_FEATURES)
        .map(|features| {
            features
                .split(',')
                .map(|feature| feature.trim().to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Platform::builder()
        .architecture(architecture.cloned().unwrap_or_default())
        .os(os.cloned().unwrap_or_default())
        .maybe_variant(identity.get(IDENTITY_VARIANT).cloned())
        .maybe_os_version(identity.get(IDENTITY_OS_VERSION).cloned())
        .os_features(os_features)
        .build()
        .pipe(Some)
}

/// Mark a descriptor as carrying the artifact with the provided identity.
///
/// The well-known platform attributes are mirrored onto the descriptor's
/// platform field; the full identity is appended to the artifact annotation,
/// preserving any entries already present.
pub fn adopt_descriptor(
    descriptor: &mut Descriptor,
    identity: Identity,
    kind: ArtifactKind,
) -> Result<()> {
    if let Some(platform) = platform_from_identity(&identity) {
        debug!(%platform, digest = %descriptor.digest, "identity maps onto a platform");
        descriptor.platform = Some(platform);
    }

    let mut entries = artifact_entries(descriptor)?;
    let entry = ArtifactEntry { identity, kind };
    if entries.contains(&entry) {
        return Ok(());
    }
    entries.push(entry);

    let encoded = serde_json::to_string(&entries).context("serialize artifact annotation")?;
    descriptor
        .annotations
        .insert(ANNOTATION_ARTIFACT.to_string(), encoded);
    Ok(())
}

/// Find the artifact entry of the requested kind whose identity is a
/// superset of the provided identity, if any.
pub fn matches_identity(
    descriptor: &Descriptor,
    identity: &Identity,
    kind: ArtifactKind,
) -> Result<bool> {
    let entries = artifact_entries(descriptor)?;
    Ok(entries
        .iter()
        .any(|entry| entry.kind == kind && identity.is_subset_of(&entry.identity)))
}

/// The annotation value naming a component version:
/// `component-descriptors/<name>:<version>`.
pub fn component_version_annotation(name: &str, version: &str) -> String {
    format!("{}/{name}:{version}", crate::DESCRIPTOR_PATH_PREFIX)
}

/// Parse a `software.ocm.componentversion` annotation value back into its
/// component name and version.
pub fn parse_component_version_annotation(value: &str) -> Result<(String, String)> {
    let rest = match value.strip_prefix(crate::DESCRIPTOR_PATH_PREFIX) {
        Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
        None => value,
    };
    match rest.rsplit_once(':') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok((name.to_string(), version.to_string()))
        }
        _ => bail!("invalid component version annotation: {value}"),
    }
}
