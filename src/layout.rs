//! OCI image layouts packaged as single tar streams, optionally gzipped.
//!
//! The layout is the portable interchange format for resources: a writer
//! streams a copy graph into `blobs/<alg>/<hex>` entries followed by
//! `index.json` and `oci-layout`, and a reader turns the same bytes back
//! into a resolvable store.

use std::collections::{HashMap, HashSet};

use async_compression::tokio::{bufread::GzipDecoder, write::GzipEncoder};
use async_trait::async_trait;
use bytes::Bytes;
use color_eyre::{
    eyre::{ensure, eyre, Context},
    Result,
};
use futures_lite::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_tar::Header;
use tracing::{debug, warn};

use crate::{
    oci::{self, Descriptor, Index},
    store::{memory::Memory, verify, Error, ReferrerLister, Store, TagLister},
    Digest,
};

/// The tar entry holding the layout index.
pub const INDEX_FILENAME: &str = "index.json";

/// The tar entry marking the archive as an OCI layout.
pub const LAYOUT_FILENAME: &str = "oci-layout";

/// The content of the `oci-layout` marker entry.
pub const LAYOUT_CONTENT: &[u8] = br#"{"imageLayoutVersion":"1.0.0"}"#;

/// The gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// The media type assigned to blobs the layout index gives no type for.
const UNTYPED_BLOB: &str = "application/octet-stream";

fn blob_path(digest: &Digest) -> String {
    format!("blobs/{}/{}", digest.algorithm, digest.as_hex())
}

fn entry_header(size: usize) -> Header {
    let mut header = Header::new_gnu();
    header.set_size(size as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    header
}

/// A write-only sink that streams pushed content into an OCI layout tar.
///
/// Pushes and tags may race freely; a single lock serializes the actual tar
/// section emissions, trading fan-out for strictly sequential writes to the
/// underlying stream. Reading back is not supported: close the writer and
/// hand the produced bytes to [`Reader`].
#[derive(Debug)]
pub struct Writer {
    state: tokio::sync::Mutex<State>,
    media_type: &'static str,
    gzip: bool,
}

struct State {
    archive: Option<tokio_tar::Builder<Vec<u8>>>,
    written: HashMap<Digest, Descriptor>,
    tags: Vec<(String, Descriptor)>,
    finished: Option<(Descriptor, Bytes)>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("archive", &self.archive.as_ref().map(|_| "Builder<Vec<u8>>"))
            .field("written", &self.written)
            .field("tags", &self.tags)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Writer {
    /// Create a writer producing a plain tar layout.
    pub fn tar() -> Self {
        Self::create(oci::OCI_LAYOUT_TAR, false)
    }

    /// Create a writer producing a gzipped tar layout.
    pub fn tar_gzip() -> Self {
        Self::create(oci::OCI_LAYOUT_TAR_GZIP, true)
    }

    fn create(media_type: &'static str, gzip: bool) -> Self {
        Self {
            state: tokio::sync::Mutex::new(State {
                archive: Some(tokio_tar::Builder::new(Vec::new())),
                written: HashMap::new(),
                tags: Vec::new(),
                finished: None,
            }),
            media_type,
            gzip,
        }
    }

    /// The media type of the layout this writer produces.
    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    /// Seal the layout: emit `index.json` and `oci-layout`, terminate the
    /// tar stream, and return the finished bytes with their descriptor.
    ///
    /// The index is computed in two passes: named tags become entries
    /// carrying the ref name annotation, then every tagged descriptor not
    /// surfaced by a name is added once more without one, so no manifest is
    /// omitted. Closing twice returns the same bytes.
    pub async fn close(&self) -> Result<(Descriptor, Bytes)> {
        let mut state = self.state.lock().await;
        if let Some(finished) = &state.finished {
            return Ok(finished.clone());
        }
        let mut archive = state
            .archive
            .take()
            .ok_or_else(|| eyre!("layout writer already closed"))?;

        let mut manifests = Vec::new();
        let mut surfaced = HashSet::new();
        for (reference, descriptor) in &state.tags {
            if *reference == descriptor.digest.to_string() {
                continue;
            }
            let mut entry = descriptor.clone();
            entry
                .annotations
                .insert(oci::ANNOTATION_REF_NAME.to_string(), reference.clone());
            surfaced.insert(descriptor.digest.clone());
            manifests.push(entry);
        }
        for (_, descriptor) in &state.tags {
            if surfaced.insert(descriptor.digest.clone()) {
                manifests.push(descriptor.clone());
            }
        }

        let index = Index::builder().manifests(manifests).build();
        let index = index.to_bytes()?;
        archive
            .append_data(&mut entry_header(index.len()), INDEX_FILENAME, index.as_slice())
            .await
            .context("write index entry")?;
        archive
            .append_data(
                &mut entry_header(LAYOUT_CONTENT.len()),
                LAYOUT_FILENAME,
                LAYOUT_CONTENT,
            )
            .await
            .context("write layout marker entry")?;
        let tar = archive.into_inner().await.context("finish layout tar")?;

        let bytes = if self.gzip {
            let mut encoder = GzipEncoder::new(Vec::new());
            encoder.write_all(&tar).await.context("compress layout")?;
            encoder.shutdown().await.context("finish compression")?;
            encoder.into_inner()
        } else {
            tar
        };

        let descriptor = Descriptor::for_content(self.media_type, &bytes);
        let finished = (descriptor, Bytes::from(bytes));
        state.finished = Some(finished.clone());
        Ok(finished)
    }
}

#[async_trait]
impl Store for Writer {
    async fn fetch(&self, _: &Descriptor) -> Result<Bytes, Error> {
        Err(Error::Unsupported(
            "fetch from a write-only layout sink".to_string(),
        ))
    }

    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        let state = self.state.lock().await;
        Ok(state.written.contains_key(&descriptor.digest))
    }

    async fn push(&self, descriptor: &Descriptor, content: Bytes) -> Result<(), Error> {
        verify(descriptor, &content)?;

        let mut state = self.state.lock().await;
        if state.written.contains_key(&descriptor.digest) {
            return Ok(());
        }
        let archive = state
            .archive
            .as_mut()
            .ok_or_else(|| Error::Unsupported("layout writer already closed".to_string()))?;
        archive
            .append_data(
                &mut entry_header(content.len()),
                blob_path(&descriptor.digest),
                content.as_ref(),
            )
            .await?;

        state
            .written
            .insert(descriptor.digest.clone(), descriptor.clone());
        // Manifests and indexes self-tag by digest so the closing index
        // lists them even when nothing names them.
        if oci::is_taggable(&descriptor.media_type) {
            let self_tag = descriptor.digest.to_string();
            state.tags.push((self_tag, descriptor.clone()));
        }
        debug!(digest = %descriptor.digest, "wrote layout blob");
        Ok(())
    }

    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        let state = self.state.lock().await;
        if let Some((_, descriptor)) = state.tags.iter().find(|(tag, _)| tag == reference) {
            return Ok(descriptor.clone());
        }
        if let Ok(digest) = reference.parse::<Digest>() {
            if let Some(descriptor) = state.written.get(&digest) {
                return Ok(descriptor.clone());
            }
        }
        Err(Error::NotFound(reference.to_string()))
    }

    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if !state.written.contains_key(&descriptor.digest) {
            return Err(Error::NotFound(format!(
                "cannot tag content that has not been pushed: {}",
                descriptor.digest
            )));
        }
        let pair = (reference.to_string(), descriptor.clone());
        if !state.tags.contains(&pair) {
            state.tags.push(pair);
        }
        Ok(())
    }
}

/// A read-only store over a decoded OCI layout tar.
///
/// Detects gzip from the magic bytes, verifies every blob against its path
/// digest while loading, and exposes the decoded index for callers that
/// need to enumerate top-level manifests. Writing is not supported.
#[derive(Debug)]
pub struct Reader {
    store: Memory,
    index: Index,
}

impl Reader {
    /// Read a layout from the provided stream.
    pub async fn read(input: impl AsyncRead + Unpin + Send) -> Result<Self> {
        let mut input = input;
        let mut magic = [0u8; 2];
        input
            .read_exact(&mut magic)
            .await
            .context("read layout header")?;
        let chained = std::io::Cursor::new(magic.to_vec()).chain(input);

        if magic == GZIP_MAGIC {
            let decoder = GzipDecoder::new(BufReader::new(chained));
            Self::read_tar(decoder).await
        } else {
            Self::read_tar(chained).await
        }
    }

    async fn read_tar(input: impl AsyncRead + Unpin + Send) -> Result<Self> {
        let mut archive = tokio_tar::Archive::new(input);
        let mut entries = archive.entries().context("read layout entries")?;

        let mut raw = HashMap::new();
        let mut index = None;
        while let Some(entry) = entries.next().await {
            let mut entry = entry.context("read layout entry")?;
            let path = entry.path().context("read entry path")?.into_owned();

            let mut content = Vec::with_capacity(entry.header().size().unwrap_or(0) as usize);
            entry
                .read_to_end(&mut content)
                .await
                .with_context(|| format!("read entry {}", path.display()))?;

            let mut components = path.components().map(|c| c.as_os_str().to_string_lossy());
            match components.next().as_deref() {
                Some("blobs") => {
                    let algorithm = components.next().unwrap_or_default();
                    let hex = components.next().unwrap_or_default();
                    let digest = format!("{algorithm}:{hex}")
                        .parse::<Digest>()
                        .with_context(|| format!("parse blob path {}", path.display()))?;
                    raw.insert(digest, Bytes::from(content));
                }
                Some(INDEX_FILENAME) => {
                    index = Some(Index::from_bytes(&content).context("parse layout index")?);
                }
                Some(LAYOUT_FILENAME) => {
                    // The marker only declares the layout version; any 1.x
                    // layout reads the same.
                }
                _ => debug!(path = %path.display(), "ignoring unrecognized layout entry"),
            }
        }
        let index = index.ok_or_else(|| eyre!("layout has no {INDEX_FILENAME}"))?;

        let store = Memory::new();
        let mut queue = index.manifests.clone();
        let mut visited = HashSet::new();
        while let Some(descriptor) = queue.pop() {
            if !visited.insert(descriptor.digest.clone()) {
                continue;
            }
            let content = match raw.remove(&descriptor.digest) {
                Some(content) => content,
                None => {
                    // Sparse layouts legitimately omit foreign content;
                    // only reachability from the index matters here.
                    warn!(digest = %descriptor.digest, "layout references a blob it does not contain");
                    continue;
                }
            };
            queue.extend(
                oci::successors(&descriptor.media_type, &content)
                    .with_context(|| format!("read successors of {}", descriptor.digest))?,
            );
            store.push(&descriptor, content).await.context("stage blob")?;
        }

        // Whatever the index graph does not reach is still content;
        // it stays addressable by digest, just without a media type.
        for (digest, content) in raw {
            let descriptor = Descriptor::builder()
                .media_type(UNTYPED_BLOB)
                .digest(digest)
                .size(content.len() as i64)
                .build();
            store.push(&descriptor, content).await.context("stage blob")?;
        }

        for descriptor in &index.manifests {
            if let Some(reference) = descriptor.annotations.get(oci::ANNOTATION_REF_NAME) {
                store
                    .tag(descriptor, reference)
                    .await
                    .with_context(|| format!("record layout tag {reference}"))?;
            }
        }

        ensure!(
            !index.manifests.is_empty(),
            "layout index lists no manifests"
        );
        Ok(Self { store, index })
    }

    /// The decoded layout index.
    pub fn index(&self) -> &Index {
        &self.index
    }
}

#[async_trait]
impl Store for Reader {
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error> {
        self.store.fetch(descriptor).await
    }

    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        self.store.exists(descriptor).await
    }

    async fn push(&self, _: &Descriptor, _: Bytes) -> Result<(), Error> {
        Err(Error::Unsupported(
            "push into a read-only layout".to_string(),
        ))
    }

    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        self.store.resolve(reference).await
    }

    async fn tag(&self, _: &Descriptor, _: &str) -> Result<(), Error> {
        Err(Error::Unsupported(
            "tag inside a read-only layout".to_string(),
        ))
    }

    fn tags(&self) -> Option<&dyn TagLister> {
        self.store.tags()
    }

    fn referrers(&self) -> Option<&dyn ReferrerLister> {
        self.store.referrers()
    }
}
