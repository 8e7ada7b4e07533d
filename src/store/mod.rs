//! Content stores: the minimal interface the engine needs over anywhere
//! artifacts can live, whether a remote registry, process memory, or a
//! layout archive on disk.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{oci::Descriptor, Digest};

pub mod memory;
pub mod registry;

/// Errors produced by stores.
///
/// The engine branches on these kinds; everything else in the library wraps
/// them in reports with operation context, leaving the kind discoverable
/// through the error chain (see [`is_not_found`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A manifest, layer, tag, or referrer does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reference syntax or tag/digest validation failed.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A digest could not be parsed, or content arrived with a size that
    /// contradicts its descriptor.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Content does not hash to its declared digest.
    #[error(r#"content digest mismatch: expected "{expected}" ≠ actual "{actual}""#)]
    DigestMismatch {
        /// The digest the content was declared to have.
        expected: String,

        /// The digest the content actually has.
        actual: String,
    },

    /// The operation is outside the supported subset of this store.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A transport or protocol failure in the underlying store.
    /// Never retried by this library; stores own their retry policy.
    #[error("store error: {0}")]
    Transport(String),

    /// An I/O failure in the underlying store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Report whether the error chain of a report bottoms out in
/// [`Error::NotFound`].
pub fn is_not_found(report: &color_eyre::Report) -> bool {
    report
        .chain()
        .any(|error| matches!(error.downcast_ref::<Error>(), Some(Error::NotFound(_))))
}

/// Verify content against its descriptor: the size must match and the bytes
/// must hash to the declared digest.
pub fn verify(descriptor: &Descriptor, content: &[u8]) -> Result<(), Error> {
    if content.len() as i64 != descriptor.size {
        return Err(Error::InvalidDigest(format!(
            "declared size {} does not match content size {}",
            descriptor.size,
            content.len(),
        )));
    }
    let actual = Digest {
        algorithm: descriptor.digest.algorithm,
        hash: descriptor.digest.algorithm.hash(content),
    };
    if actual != descriptor.digest {
        return Err(Error::DigestMismatch {
            expected: descriptor.digest.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// A content store.
///
/// Implementations must be safe for concurrent use; the engine shares one
/// store across tasks freely. Content pushed with [`Store::push`] is
/// verified against its descriptor while being written.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync {
    /// Fetch the content addressed by the descriptor.
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error>;

    /// Report whether the content addressed by the descriptor exists.
    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error>;

    /// Push content addressed by the descriptor,
    /// verifying it against the descriptor as it is written.
    async fn push(&self, descriptor: &Descriptor, content: Bytes) -> Result<(), Error>;

    /// Resolve a reference (a tag, a digest, or a full artifact reference)
    /// to the descriptor it names.
    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error>;

    /// Associate a reference with previously pushed content.
    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error>;

    /// The tag listing capability of this store, when it has one.
    /// Probed at runtime; the default is no support.
    fn tags(&self) -> Option<&dyn TagLister> {
        None
    }

    /// The referrer listing capability of this store, when it has one.
    /// Probed at runtime; the default is no support.
    fn referrers(&self) -> Option<&dyn ReferrerLister> {
        None
    }
}

/// Tag enumeration, supported by some stores.
#[async_trait]
pub trait TagLister: Send + Sync {
    /// List all tags in the provided repository.
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, Error>;
}

/// Referrer enumeration, supported by some stores.
#[async_trait]
pub trait ReferrerLister: Send + Sync {
    /// List descriptors of manifests that declare the provided descriptor as
    /// their subject, filtered to the provided artifact type when set.
    async fn list_referrers(
        &self,
        subject: &Descriptor,
        artifact_type: Option<&str>,
    ) -> Result<Vec<Descriptor>, Error>;
}
