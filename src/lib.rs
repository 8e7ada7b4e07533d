#![deny(clippy::uninlined_format_args)]
#![deny(clippy::unwrap_used)]
#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

use std::{
    collections::HashSet,
    str::FromStr,
    sync::{LazyLock, Mutex},
};

use bon::Builder;
use color_eyre::{
    eyre::{ensure, eyre, Context},
    Result, Section, SectionExt,
};
use derive_more::derive::{Debug, Display};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};
use tap::Pipe;
use tracing::warn;

pub mod copy;
pub mod descriptor;
pub mod layout;
pub mod oci;
pub mod repository;
pub mod resolver;
pub mod staging;
pub mod store;

/// Users can set this environment variable to specify the default registry base.
/// If not set, the default is [`DEFAULT_BASE`].
pub const DEFAULT_BASE_VAR: &str = "STEVEDORE_DEFAULT_BASE";

/// The default registry base.
pub const DEFAULT_BASE: &str = "docker.io";

/// The repository prefix under which component descriptors are stored.
///
/// The prefix is historical: it is both a path segment of every canonical
/// component reference and part of the `software.ocm.componentversion`
/// annotation value.
pub const DESCRIPTOR_PATH_PREFIX: &str = "component-descriptors";

/// The registry base.
pub fn default_base() -> String {
    std::env::var(DEFAULT_BASE_VAR).unwrap_or(DEFAULT_BASE.to_string())
}

/// Authentication method for a registry.
#[derive(Debug, Clone, Default, Display)]
pub enum Authentication {
    /// No authentication
    #[default]
    #[display("none")]
    None,

    /// Basic authentication
    #[display("basic:{username}")]
    Basic {
        /// The username
        username: String,

        /// The password
        #[debug(skip)]
        password: String,
    },
}

impl Authentication {
    /// Create an instance for basic authentication
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Digest algorithms supported by the library.
///
/// The registry is closed: a digest naming any other algorithm fails to
/// parse. The canonical algorithm is [`Algorithm::Sha256`], used whenever a
/// digest must be computed and no algorithm was requested.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString)]
pub enum Algorithm {
    /// The SHA-256 algorithm.
    #[default]
    #[strum(serialize = "sha256")]
    Sha256,

    /// The SHA-384 algorithm.
    #[strum(serialize = "sha384")]
    Sha384,

    /// The SHA-512 algorithm.
    #[strum(serialize = "sha512")]
    Sha512,
}

impl Algorithm {
    /// The size of a hash produced by this algorithm, in bytes.
    pub fn hash_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 32,
            Algorithm::Sha384 => 48,
            Algorithm::Sha512 => 64,
        }
    }

    /// The spelling used for this algorithm in component descriptor digest fields.
    pub fn descriptor_name(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha384 => "SHA-384",
            Algorithm::Sha512 => "SHA-512",
        }
    }

    /// Hash the provided content with this algorithm.
    pub fn hash(&self, content: impl AsRef<[u8]>) -> Vec<u8> {
        use sha2::Digest as _;
        match self {
            Algorithm::Sha256 => sha2::Sha256::digest(content.as_ref()).to_vec(),
            Algorithm::Sha384 => sha2::Sha384::digest(content.as_ref()).to_vec(),
            Algorithm::Sha512 => sha2::Sha512::digest(content.as_ref()).to_vec(),
        }
    }

    /// Look up an algorithm by its descriptor spelling (e.g. "SHA-256").
    pub fn from_descriptor_name(s: &str) -> Option<Self> {
        Self::iter().find(|algorithm| algorithm.descriptor_name() == s)
    }

    /// Report whether the provided string names a known algorithm.
    pub fn is_known(s: &str) -> bool {
        Self::iter().any(|algorithm| algorithm.as_ref() == s)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Create a [`Digest`] from a hex string at compile time.
/// ```
/// let digest = stevedore::digest!("a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4");
/// assert_eq!(digest.algorithm, stevedore::Algorithm::Sha256);
/// assert_eq!(digest.as_hex(), "a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4");
/// ```
///
/// The hash length must match the algorithm; providing a value of a different
/// length results in a compile-time error.
/// ```compile_fail
/// let digest = stevedore::digest!("a3ed95caeb02");
/// ```
#[macro_export]
macro_rules! digest {
    ($hex:expr) => {{
        $crate::digest!($crate::Algorithm::Sha256, $hex, 32)
    }};
    ($algorithm:expr, $hex:expr, $size:expr) => {{
        const HASH: [u8; $size] = hex_magic::hex!($hex);
        static_assertions::const_assert_ne!(HASH.len(), 0);
        $crate::Digest {
            algorithm: $algorithm,
            hash: HASH.to_vec(),
        }
    }};
}

/// A content-addressable digest in the format `algorithm:hash`.
///
/// The `FromStr` implementation parses the format used in OCI artifacts,
/// which is `algorithm:hex`; the algorithm must be in the supported registry
/// and the hash must have the length that algorithm produces.
///
/// ```
/// # use std::str::FromStr;
/// let digest = stevedore::Digest::from_str("sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4").expect("parse digest");
/// assert_eq!(digest.algorithm, stevedore::Algorithm::Sha256);
/// assert_eq!(digest.as_hex(), "a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{}", self.to_string())]
pub struct Digest {
    /// The hashing algorithm used.
    pub algorithm: Algorithm,

    /// The raw hash bytes.
    pub hash: Vec<u8>,
}

impl Digest {
    /// Returns the hash as a hex string.
    pub fn as_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Compute the digest of the provided content with the canonical algorithm.
    pub fn from_content(content: impl AsRef<[u8]>) -> Self {
        let algorithm = Algorithm::default();
        Self {
            algorithm,
            hash: algorithm.hash(content),
        }
    }

    /// Report whether the provided content hashes to this digest.
    pub fn verifies(&self, content: impl AsRef<[u8]>) -> bool {
        self.algorithm.hash(content) == self.hash
    }
}

impl FromStr for Digest {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input_section = || s.to_string().header("Input:");
        let (algorithm, hex) = s.split_once(':').ok_or_else(|| {
            eyre!("invalid digest format: missing algorithm separator ':'")
                .with_section(input_section)
        })?;

        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|_| eyre!("unknown digest algorithm: {algorithm}"))
            .with_section(input_section)?;
        let hash = hex::decode(hex)
            .map_err(|e| eyre!("invalid hex string: {e}"))
            .with_section(input_section)?;
        ensure!(
            hash.len() == algorithm.hash_len(),
            "digest length {} does not match algorithm {algorithm} (expected {})",
            hash.len(),
            algorithm.hash_len(),
        );

        Ok(Self { algorithm, hash })
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.as_hex())
    }
}

impl From<&Digest> for Digest {
    fn from(digest: &Digest) -> Self {
        digest.clone()
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w][\w.-]{0,127}$").expect("compile tag pattern")
});

static REGISTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._-]*[a-zA-Z0-9])?(:[0-9]+)?$")
        .expect("compile registry pattern")
});

static REPOSITORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*)*$",
    )
    .expect("compile repository pattern")
});

/// URL schemes accepted in front of a reference.
const SCHEMES: &[&str] = &["oci", "http", "https"];

/// An artifact reference, parsed leniently.
///
/// Compared to strict OCI references, three extensions apply:
/// the registry may be missing entirely, a tag and a digest may coexist
/// (`repo:tag@digest`), and the reference may carry a URL scheme prefix
/// (`oci://`, `http://`, `https://`).
///
/// ```
/// # use std::str::FromStr;
/// let reference = stevedore::Reference::from_str("ghcr.io/fossas/stevedore:v1.0.0").expect("parse");
/// assert_eq!(reference.registry.as_deref(), Some("ghcr.io"));
/// assert_eq!(reference.repository, "fossas/stevedore");
/// assert_eq!(reference.tag.as_deref(), Some("v1.0.0"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize)]
pub struct Reference {
    /// URL scheme, one of `oci`, `http`, or `https`.
    #[builder(into)]
    pub scheme: Option<String>,

    /// Registry host, possibly with a port (e.g. "ghcr.io", "localhost:5000").
    #[builder(into)]
    pub registry: Option<String>,

    /// Repository path. Empty only for bare digest references.
    #[builder(into, default)]
    pub repository: String,

    /// Named tag, if any.
    #[builder(into)]
    pub tag: Option<String>,

    /// Content digest, if any. May coexist with a tag.
    #[builder(into)]
    pub digest: Option<Digest>,
}

impl Reference {
    /// The most precise version selector carried by the reference:
    /// the digest when present, otherwise the tag.
    pub fn selector(&self) -> Option<String> {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => Some(digest.to_string()),
            (None, Some(tag)) => Some(tag.clone()),
            (None, None) => None,
        }
    }

    /// Clone the reference with the provided tag, dropping any digest.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            digest: None,
            ..self.clone()
        }
    }

    /// The `(registry, repository)` pair identifying the repository
    /// independently of any version selector.
    pub fn repository_key(&self) -> (String, String) {
        (
            self.registry.clone().unwrap_or_default(),
            self.repository.clone(),
        )
    }

    fn validate(&self) -> Result<()> {
        if let Some(scheme) = &self.scheme {
            ensure!(
                SCHEMES.contains(&scheme.as_str()),
                "unsupported reference scheme: {scheme}"
            );
        }
        if let Some(registry) = &self.registry {
            ensure!(
                REGISTRY_PATTERN.is_match(registry),
                "invalid registry: {registry}"
            );
        }
        if self.repository.is_empty() {
            ensure!(
                self.digest.is_some() && self.registry.is_none(),
                "reference has no repository"
            );
        } else {
            ensure!(
                REPOSITORY_PATTERN.is_match(&self.repository),
                "invalid repository: {}",
                self.repository
            );
        }
        if let Some(tag) = &self.tag {
            ensure!(TAG_PATTERN.is_match(tag), "invalid tag: {tag}");
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input_section = || s.to_string().header("Input:");

        let mut rest = s;
        let mut scheme = None;
        if let Some((prefix, tail)) = rest.split_once("://") {
            ensure!(
                SCHEMES.contains(&prefix),
                "unsupported reference scheme: {prefix}"
            );
            scheme = Some(prefix.to_string());
            rest = tail;
        }

        let (registry, path) = match rest.split_once('/') {
            Some((registry, path)) => (Some(registry.to_string()), path),
            None => (None, rest),
        };

        let mut repository = String::new();
        let mut tag = None;
        let mut digest = None;
        if let Some((left, raw)) = path.split_once('@') {
            digest = Digest::from_str(raw)
                .context("parse digest")
                .with_section(input_section)?
                .pipe(Some);
            match left.split_once(':') {
                Some((repo, t)) if !t.contains(':') => {
                    repository = repo.to_string();
                    tag = Some(t.to_string());
                }
                Some(_) => {
                    return Err(eyre!("invalid reference: multiple ':' separators"))
                        .with_section(input_section);
                }
                None => repository = left.to_string(),
            }
        } else if let Some((prefix, _)) = path.split_once(':') {
            // A path that opens with a known digest algorithm and has no
            // registry is a bare digest, not a `repo:tag` pair.
            if registry.is_none() && Algorithm::is_known(prefix) {
                digest = Digest::from_str(path)
                    .context("parse bare digest")
                    .with_section(input_section)?
                    .pipe(Some);
            } else {
                match path.split_once(':') {
                    Some((repo, t)) if !t.contains(':') => {
                        repository = repo.to_string();
                        tag = Some(t.to_string());
                    }
                    _ => {
                        return Err(eyre!("invalid reference: multiple ':' separators"))
                            .with_section(input_section);
                    }
                }
            }
        } else {
            repository = path.to_string();
        }

        let reference = Reference {
            scheme,
            registry,
            repository,
            tag,
            digest,
        };
        reference
            .validate()
            .context("validate reference")
            .with_section(input_section)?;
        Ok(reference)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}://")?;
        }
        if self.repository.is_empty() {
            if let Some(digest) = &self.digest {
                return write!(f, "{digest}");
            }
        }
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl From<&Reference> for Reference {
    fn from(reference: &Reference) -> Self {
        reference.clone()
    }
}

/// The substring substituted for `+` when mapping versions to tags.
const BUILD_SEPARATOR: &str = ".build-";

static SUBSTITUTED_VERSIONS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Map a version string to an OCI-tag-legal string.
///
/// OCI tags cannot contain `+`, which semver build metadata requires;
/// the last `+` is replaced with the literal `.build-`. A warning is logged
/// once per distinct input that required substitution. The substitution never
/// fails; inputs that are illegal as tags for other reasons are surfaced by
/// tag validation downstream.
///
/// ```
/// assert_eq!(stevedore::oci_tag("1.2.3+build.7"), "1.2.3.build-build.7");
/// assert_eq!(stevedore::oci_tag("1.2.3"), "1.2.3");
/// ```
pub fn oci_tag(version: &str) -> String {
    match version.rfind('+') {
        None => version.to_string(),
        Some(at) => {
            if let Ok(mut seen) = SUBSTITUTED_VERSIONS.lock() {
                if seen.insert(version.to_string()) {
                    warn!(
                        %version,
                        "version contains '+', which is not a legal tag character; \
                         substituting '{BUILD_SEPARATOR}'"
                    );
                }
            }
            format!("{}{BUILD_SEPARATOR}{}", &version[..at], &version[at + 1..])
        }
    }
}

/// Undo the substitution applied by [`oci_tag`].
///
/// The mapping is lossy: a version that legitimately contained `.build-`
/// comes back with a `+` instead. Listing is the only consumer, where the
/// ambiguity is acceptable.
pub fn version_from_tag(tag: &str) -> String {
    match tag.rfind(BUILD_SEPARATOR) {
        None => tag.to_string(),
        Some(at) => format!("{}+{}", &tag[..at], &tag[at + BUILD_SEPARATOR.len()..]),
    }
}

/// Parse a version string leniently.
///
/// Accepts an optional leading `v`/`V`. Returns `None` for strings that do
/// not parse as semver even after stripping the prefix.
pub fn parse_loose_version(s: &str) -> Option<semver::Version> {
    let core = s
        .strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s);
    semver::Version::parse(core).ok()
}
