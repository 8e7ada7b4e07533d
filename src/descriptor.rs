//! The component descriptor model and its persisted encoding.
//!
//! A component descriptor names a software component, its provider, and the
//! resources, sources, and component references that make up one immutable
//! version of it. Descriptors serialize as YAML; at rest they are wrapped in
//! a single-entry tar so stores treat them as opaque layers.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use bon::Builder;
use color_eyre::{
    eyre::{ensure, eyre, Context},
    Result,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::io::AsyncReadExt;
use tokio_tar::{Archive, Header};

use crate::Digest;

/// The schema generation this library reads and writes.
pub const SCHEMA_VERSION: &str = "v2";

/// The single file inside an encoded descriptor archive.
pub const DESCRIPTOR_FILENAME: &str = "component-descriptor.yaml";

/// The encoding suffix describing the persisted descriptor format.
pub const ENCODING_SUFFIX: &str = "+yaml+tar";

/// Normalisation algorithm for digests computed over an OCI artifact's
/// top-level descriptor.
pub const OCI_ARTIFACT_DIGEST: &str = "ociArtifactDigest/v1";

/// Normalisation algorithm for digests computed over raw blob bytes.
pub const GENERIC_BLOB_DIGEST: &str = "genericBlobDigest/v1";

/// Canonical access type for content stored alongside its component version.
pub const ACCESS_LOCAL_BLOB: &str = "localBlob/v1";

/// Canonical access type for a tag- or digest-pinned OCI artifact.
pub const ACCESS_OCI_ARTIFACT: &str = "ociArtifact/v1";

/// Canonical access type for a single layer inside an OCI artifact.
pub const ACCESS_OCI_LAYER: &str = "ociBlob/v1";

/// A set of identity attributes.
///
/// Identities are ordered maps so that serialisation (and therefore any
/// digest computed over it) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(BTreeMap<String, String>);

impl Identity {
    /// Create an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute by name.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    /// Set an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Report whether the identity has no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Report whether every attribute of this identity is present in `base`
    /// with an equal value.
    ///
    /// This is the partial order used to look up artifacts by identities
    /// that omit attributes: `{name: a} ⊑ {name: a, os: linux}`.
    pub fn is_subset_of(&self, base: &Identity) -> bool {
        self.0
            .iter()
            .all(|(key, value)| base.0.get(key) == Some(value))
    }
}

impl FromIterator<(String, String)> for Identity {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Identity {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// A component descriptor: the structured record describing one immutable
/// version of a software component.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    /// Schema metadata.
    #[builder(default)]
    pub meta: Meta,

    /// The component this descriptor describes.
    pub component: Component,

    /// Signatures over normalised forms of the descriptor.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
}

impl ComponentDescriptor {
    /// Check the internal invariants of the descriptor: the coordinate is
    /// complete, and element identities are unique within their kind.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.component.name.is_empty(),
            "component name cannot be empty"
        );
        ensure!(
            !self.component.version.is_empty(),
            "component version cannot be empty"
        );

        let mut resources = HashSet::new();
        for resource in &self.component.resources {
            let identity = resource.identity();
            ensure!(
                resources.insert(identity.clone()),
                "duplicate resource identity: {identity}"
            );
        }
        let mut sources = HashSet::new();
        for source in &self.component.sources {
            let identity = source.identity();
            ensure!(
                sources.insert(identity.clone()),
                "duplicate source identity: {identity}"
            );
        }
        Ok(())
    }
}

/// Schema metadata for a component descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// The descriptor schema generation, e.g. "v2".
    pub schema_version: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// The component section of a descriptor.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// The component name: a DNS-like path such as `acme.org/billing/api`.
    #[builder(into)]
    pub name: String,

    /// The component version: a loose semver string.
    #[builder(into)]
    pub version: String,

    /// The entity providing the component.
    #[builder(into)]
    pub provider: String,

    /// Arbitrary labels attached to the component.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,

    /// Repositories this component version has passed through.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repository_contexts: Vec<serde_json::Value>,

    /// Binary artifacts delivered with the component.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,

    /// Source locations the component was built from.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    /// Other component versions this component depends on.
    #[builder(default)]
    #[serde(
        rename = "componentReferences",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub references: Vec<ComponentReference>,
}

/// A named label with an arbitrary value.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    /// The label name.
    #[builder(into)]
    pub name: String,

    /// The label value; any YAML/JSON value is allowed.
    #[builder(into)]
    pub value: serde_json::Value,
}

/// A binary artifact delivered with a component version.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// The resource name.
    #[builder(into)]
    pub name: String,

    /// The resource version.
    #[builder(into)]
    pub version: String,

    /// Additional identity attributes distinguishing resources that share
    /// a name and version.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Identity::is_empty")]
    pub extra_identity: Identity,

    /// The type of content the resource holds, e.g. `ociImage` or `blob`.
    #[builder(into)]
    #[serde(rename = "type")]
    pub kind: String,

    /// Arbitrary labels attached to the resource.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,

    /// Whether the resource is built with the component or referenced
    /// externally.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    /// Where and how the resource content is stored.
    pub access: Access,

    /// The authoritative digest of the resource content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestSpec>,

    /// The size of the resource content in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    /// When the resource was created.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
}

impl Resource {
    /// The full identity of the resource within its component version:
    /// name and version plus every extra identity attribute.
    pub fn identity(&self) -> Identity {
        let mut identity = self.extra_identity.clone();
        identity.insert("name", &self.name);
        identity.insert("version", &self.version);
        identity
    }
}

/// A source location a component version was built from.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// The source name.
    #[builder(into)]
    pub name: String,

    /// The source version.
    #[builder(into)]
    pub version: String,

    /// Additional identity attributes.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Identity::is_empty")]
    pub extra_identity: Identity,

    /// The type of the source, e.g. `git`.
    #[builder(into)]
    #[serde(rename = "type")]
    pub kind: String,

    /// Arbitrary labels attached to the source.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,

    /// Where and how the source is stored.
    pub access: Access,
}

impl Source {
    /// The full identity of the source within its component version.
    pub fn identity(&self) -> Identity {
        let mut identity = self.extra_identity.clone();
        identity.insert("name", &self.name);
        identity.insert("version", &self.version);
        identity
    }
}

/// A reference from one component version to another.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    /// The local name of the reference.
    #[builder(into)]
    pub name: String,

    /// The name of the referenced component.
    #[builder(into)]
    pub component_name: String,

    /// The version of the referenced component.
    #[builder(into)]
    pub version: String,

    /// Additional identity attributes.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Identity::is_empty")]
    pub extra_identity: Identity,

    /// Arbitrary labels attached to the reference.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// A signature over a normalised form of the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// The signature name.
    #[builder(into)]
    pub name: String,

    /// The digest the signature covers.
    pub digest: DigestSpec,

    /// The signature itself.
    pub signature: SignatureSpec,
}

/// The value portion of a [`Signature`].
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSpec {
    /// The signing algorithm.
    #[builder(into)]
    pub algorithm: String,

    /// The encoded signature value.
    #[builder(into)]
    pub value: String,

    /// The media type of the encoded signature value.
    #[builder(into)]
    pub media_type: String,
}

/// A digest over some normalised form of content.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestSpec {
    /// The hash algorithm, spelled the descriptor way (e.g. "SHA-256").
    #[builder(into)]
    pub hash_algorithm: String,

    /// How the content was normalised before hashing.
    #[builder(into)]
    pub normalisation_algorithm: String,

    /// The hex-encoded hash value.
    #[builder(into)]
    pub value: String,
}

impl DigestSpec {
    /// A digest over an OCI artifact, normalised as its top-level descriptor
    /// digest.
    pub fn oci_artifact(digest: &Digest) -> Self {
        Self {
            hash_algorithm: digest.algorithm.descriptor_name().to_string(),
            normalisation_algorithm: OCI_ARTIFACT_DIGEST.to_string(),
            value: digest.as_hex(),
        }
    }

    /// A digest over raw blob bytes.
    pub fn generic_blob(digest: &Digest) -> Self {
        Self {
            hash_algorithm: digest.algorithm.descriptor_name().to_string(),
            normalisation_algorithm: GENERIC_BLOB_DIGEST.to_string(),
            value: digest.as_hex(),
        }
    }
}

/// Where and how a piece of component content is stored.
///
/// Access specifications are polymorphic: the serialized form is a map with
/// a `type` attribute selecting the shape of the rest. Unknown types are
/// preserved untouched in the [`Access::Other`] variant so that descriptors
/// using access methods this library does not understand still round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// Content stored alongside the component version itself.
    LocalBlob(LocalBlobAccess),

    /// A tag- or digest-pinned OCI artifact in some registry.
    OciArtifact(OciArtifactAccess),

    /// A specific layer inside an OCI artifact.
    OciLayer(OciLayerAccess),

    /// An access method this library does not understand.
    Other(RawAccess),
}

impl Access {
    /// The type string naming the access method.
    pub fn kind(&self) -> &str {
        match self {
            Access::LocalBlob(_) => ACCESS_LOCAL_BLOB,
            Access::OciArtifact(_) => ACCESS_OCI_ARTIFACT,
            Access::OciLayer(_) => ACCESS_OCI_LAYER,
            Access::Other(raw) => &raw.kind,
        }
    }

    /// Convert the access to its serialized value form.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let (kind, mut value) = match self {
            Access::LocalBlob(access) => (
                ACCESS_LOCAL_BLOB,
                serde_json::to_value(access).context("serialize local blob access")?,
            ),
            Access::OciArtifact(access) => (
                ACCESS_OCI_ARTIFACT,
                serde_json::to_value(access).context("serialize artifact access")?,
            ),
            Access::OciLayer(access) => (
                ACCESS_OCI_LAYER,
                serde_json::to_value(access).context("serialize layer access")?,
            ),
            Access::Other(raw) => (raw.kind.as_str(), raw.value.clone()),
        };
        value
            .as_object_mut()
            .ok_or_else(|| eyre!("access must serialize to a map"))?
            .insert("type".to_string(), kind.into());
        Ok(value)
    }

    /// Parse an access from its serialized value form using the built-in
    /// access types. Unknown types land in [`Access::Other`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        AccessScheme::default().parse(value)
    }
}

impl Serialize for Access {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Access {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Access::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Access to content stored alongside its component version.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBlobAccess {
    /// A digest addressing the staged content within the component's store.
    #[builder(into)]
    pub local_reference: String,

    /// The media type of the content.
    #[builder(into)]
    pub media_type: String,

    /// The name the content was originally referenced by, if any.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_name: Option<String>,

    /// A globally resolvable access to the same content, if one exists.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_access: Option<Box<Access>>,
}

/// Access to a tag- or digest-pinned OCI artifact.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciArtifactAccess {
    /// The full reference of the artifact, e.g. `ghcr.io/acme/tool:v1`.
    #[builder(into)]
    pub image_reference: String,
}

/// Access to a specific layer inside an OCI artifact.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciLayerAccess {
    /// The reference of the artifact containing the layer.
    #[builder(into)]
    pub reference: String,

    /// The digest of the layer blob.
    #[builder(into)]
    pub digest: Digest,

    /// The media type of the layer blob.
    #[builder(into)]
    pub media_type: String,

    /// The size of the layer blob in bytes.
    pub size: i64,
}

/// An access specification of a type this library does not understand,
/// preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAccess {
    /// The type string of the access method.
    pub kind: String,

    /// The serialized access specification, minus the type attribute.
    pub value: serde_json::Value,
}

type AccessParser = Arc<dyn Fn(serde_json::Value) -> Result<Access> + Send + Sync>;

/// A registry of access types.
///
/// The scheme maps type strings (including historical aliases) to parsers
/// producing [`Access`] values. The default scheme knows the built-in types;
/// additional types can be registered per repository, with no process-global
/// state involved.
#[derive(Clone)]
pub struct AccessScheme {
    parsers: HashMap<String, AccessParser>,
}

impl std::fmt::Debug for AccessScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds = self.parsers.keys().collect::<Vec<_>>();
        kinds.sort();
        f.debug_struct("AccessScheme").field("kinds", &kinds).finish()
    }
}

impl Default for AccessScheme {
    fn default() -> Self {
        let mut scheme = Self {
            parsers: HashMap::new(),
        };

        // Alias sets are registered in fixed order; when two aliases name
        // the same type the later registration wins, which keeps conversion
        // deterministic.
        for alias in [ACCESS_LOCAL_BLOB, "localBlob"] {
            scheme.register(alias, |value| {
                serde_json::from_value::<LocalBlobAccess>(value)
                    .context("parse local blob access")
                    .map(Access::LocalBlob)
            });
        }
        for alias in [
            ACCESS_OCI_ARTIFACT,
            "ociArtifact",
            "ociRegistry/v1",
            "ociRegistry",
            "ociImage/v1",
            "ociImage",
        ] {
            scheme.register(alias, |value| {
                serde_json::from_value::<OciArtifactAccess>(value)
                    .context("parse artifact access")
                    .map(Access::OciArtifact)
            });
        }
        for alias in [ACCESS_OCI_LAYER, "ociBlob"] {
            scheme.register(alias, |value| {
                serde_json::from_value::<OciLayerAccess>(value)
                    .context("parse layer access")
                    .map(Access::OciLayer)
            });
        }

        scheme
    }
}

impl AccessScheme {
    /// Register a parser for an access type string.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        parser: impl Fn(serde_json::Value) -> Result<Access> + Send + Sync + 'static,
    ) {
        self.parsers.insert(kind.into(), Arc::new(parser));
    }

    /// Parse an access from its serialized value form.
    /// Unknown types are preserved in [`Access::Other`].
    pub fn parse(&self, mut value: serde_json::Value) -> Result<Access> {
        let object = value
            .as_object_mut()
            .ok_or_else(|| eyre!("access must be a map"))?;
        let kind = object
            .remove("type")
            .and_then(|kind| kind.as_str().map(String::from))
            .ok_or_else(|| eyre!("access has no 'type' attribute"))?;
        ensure!(!kind.is_empty(), "access type cannot be empty");

        match self.parsers.get(&kind) {
            Some(parser) => parser(value),
            None => Ok(Access::Other(RawAccess { kind, value })),
        }
    }

    /// Canonicalise an access: serialize it and parse it back through the
    /// scheme. This resolves [`Access::Other`] values whose type was
    /// registered after the access was first parsed.
    pub fn resolve(&self, access: &Access) -> Result<Access> {
        access.to_value().and_then(|value| self.parse(value))
    }
}

/// Encode a descriptor into its persisted form: a single-entry tar holding
/// `component-descriptor.yaml`.
///
/// The encoding is deterministic; publishing the same descriptor twice
/// yields byte-identical archives and therefore identical digests.
pub async fn encode(descriptor: &ComponentDescriptor) -> Result<Vec<u8>> {
    let yaml = serde_yaml::to_string(descriptor).context("serialize descriptor")?;

    let mut archive = tokio_tar::Builder::new(Vec::new());
    let mut header = Header::new_gnu();
    header.set_size(yaml.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    archive
        .append_data(&mut header, DESCRIPTOR_FILENAME, yaml.as_bytes())
        .await
        .context("write descriptor entry")?;
    archive.into_inner().await.context("finish archive")
}

/// Decode a descriptor from its persisted form.
///
/// The archive must contain exactly one `component-descriptor.yaml` entry;
/// all other entries are ignored.
pub async fn decode(bytes: &[u8]) -> Result<ComponentDescriptor> {
    use futures_lite::StreamExt;

    let mut archive = Archive::new(bytes);
    let mut entries = archive.entries().context("read archive entries")?;
    let mut found = None;
    while let Some(entry) = entries.next().await {
        let mut entry = entry.context("read archive entry")?;
        let path = entry.path().context("read entry path")?;
        if path.as_ref() != Path::new(DESCRIPTOR_FILENAME) {
            continue;
        }
        ensure!(
            found.is_none(),
            "archive contains multiple '{DESCRIPTOR_FILENAME}' entries"
        );

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .await
            .context("read descriptor entry")?;
        found = Some(content);
    }

    let content =
        found.ok_or_else(|| eyre!("archive contains no '{DESCRIPTOR_FILENAME}' entry"))?;
    serde_yaml::from_str(&content).context("parse descriptor yaml")
}
