//! Copying artifact graphs between stores, and searching within them.
//!
//! Copies are successor-first: a manifest is never visible in the target
//! before every blob it references, so a reader that can resolve the root
//! can always walk the whole graph.

use std::{collections::HashSet, pin::Pin, sync::Arc};

use color_eyre::{eyre::Context, Result, Section, SectionExt};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, warn};

use crate::{
    oci::{self, Descriptor},
    store::{Error, Store},
    Digest,
};

/// The default bound on concurrent store operations during copies and
/// searches.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Observer invoked around individual descriptor copies.
pub type Hook = Arc<dyn Fn(&Descriptor) + Send + Sync>;

/// Predicate deciding whether a descriptor should be skipped entirely.
pub type SkipPredicate = Arc<dyn Fn(&Descriptor) -> bool + Send + Sync>;

/// Options governing graph copies and searches.
#[derive(Clone)]
pub struct CopyOptions {
    /// The bound on concurrent store operations.
    pub concurrency: usize,

    /// Invoked before a descriptor's content is pushed.
    pub pre_copy: Option<Hook>,

    /// Invoked after a descriptor's content was pushed.
    pub post_copy: Option<Hook>,

    /// Descriptors matching this predicate are not copied;
    /// their subgraphs are not entered.
    pub skip: Option<SkipPredicate>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            pre_copy: None,
            post_copy: None,
            skip: None,
        }
    }
}

impl std::fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOptions")
            .field("concurrency", &self.concurrency)
            .field("pre_copy", &self.pre_copy.is_some())
            .field("post_copy", &self.post_copy.is_some())
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

impl CopyOptions {
    /// Create options with the provided concurrency bound.
    pub fn concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..Self::default()
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Copy the graph rooted at a descriptor from one store into another.
///
/// Content already present in the target is not transferred again.
pub async fn graph(
    source: Arc<dyn Store>,
    target: Arc<dyn Store>,
    root: Descriptor,
    options: CopyOptions,
) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    copy_node(source, target, root, Arc::new(options), semaphore).await
}

fn copy_node(
    source: Arc<dyn Store>,
    target: Arc<dyn Store>,
    descriptor: Descriptor,
    options: Arc<CopyOptions>,
    semaphore: Arc<Semaphore>,
) -> BoxFuture<Result<()>> {
    Box::pin(async move {
        if let Some(skip) = &options.skip {
            if skip(&descriptor) {
                debug!(digest = %descriptor.digest, "skip: copy predicate");
                return Ok(());
            }
        }
        if target
            .exists(&descriptor)
            .await
            .context("check target for existing content")?
        {
            debug!(digest = %descriptor.digest, "skip: already present in target");
            return Ok(());
        }

        let content = {
            let _permit = semaphore.acquire().await.context("acquire copy permit")?;
            source
                .fetch(&descriptor)
                .await
                .with_context(|| format!("fetch {}", descriptor.digest))?
        };
        let children = oci::successors(&descriptor.media_type, &content)
            .with_context(|| format!("read successors of {}", descriptor.digest))?;

        let mut tasks = JoinSet::new();
        for child in children {
            tasks.spawn(copy_node(
                source.clone(),
                target.clone(),
                child,
                options.clone(),
                semaphore.clone(),
            ));
        }
        while let Some(joined) = tasks.join_next().await {
            joined.context("join copy task")??;
        }

        if let Some(pre_copy) = &options.pre_copy {
            pre_copy(&descriptor);
        }
        target
            .push(&descriptor, content)
            .await
            .with_context(|| format!("push {}", descriptor.digest))?;
        if let Some(post_copy) = &options.post_copy {
            post_copy(&descriptor);
        }
        Ok(())
    })
}

/// Search the graph rooted at a descriptor for the descriptor carrying the
/// provided digest.
///
/// Branches fan out concurrently, bounded by the options' concurrency;
/// the first branch to find the digest wins and the rest are abandoned.
/// Branch errors surface only when no branch succeeds, joined onto a
/// not-found error.
pub async fn find_digest(
    store: Arc<dyn Store>,
    root: Descriptor,
    digest: Digest,
    options: CopyOptions,
) -> Result<Descriptor> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    search_node(store, root, Arc::new(digest), semaphore).await
}

fn search_node(
    store: Arc<dyn Store>,
    descriptor: Descriptor,
    digest: Arc<Digest>,
    semaphore: Arc<Semaphore>,
) -> BoxFuture<Result<Descriptor>> {
    Box::pin(async move {
        if descriptor.digest == *digest {
            return Ok(descriptor);
        }
        if !oci::is_taggable(&descriptor.media_type) {
            return Err(Error::NotFound(digest.to_string()))
                .with_context(|| format!("descend into {}", descriptor.digest));
        }

        let content = {
            let _permit = semaphore
                .acquire()
                .await
                .context("acquire search permit")?;
            store
                .fetch(&descriptor)
                .await
                .with_context(|| format!("fetch {}", descriptor.digest))?
        };
        let children = oci::successors(&descriptor.media_type, &content)
            .with_context(|| format!("read successors of {}", descriptor.digest))?;
        if let Some(hit) = children.iter().find(|child| child.digest == *digest) {
            return Ok(hit.clone());
        }

        let mut tasks = JoinSet::new();
        for child in children {
            if !oci::is_taggable(&child.media_type) {
                continue;
            }
            tasks.spawn(search_node(
                store.clone(),
                child,
                digest.clone(),
                semaphore.clone(),
            ));
        }
        if tasks.is_empty() {
            return Err(Error::NotFound(digest.to_string()))
                .with_context(|| format!("no branch below {} matches", descriptor.digest));
        }

        let mut branch_errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.context("join search task")? {
                Ok(found) => {
                    tasks.abort_all();
                    return Ok(found);
                }
                Err(error) => branch_errors.push(error),
            }
        }

        let mut report = color_eyre::Report::new(Error::NotFound(digest.to_string()));
        for error in branch_errors {
            report = report.section(format!("{error:#}").header("Branch:"));
        }
        Err(report)
    })
}

/// Compute the subset of candidates not referenced as a successor of any
/// other candidate.
///
/// A single candidate is its own top level. For larger sets, successor
/// lookups fan out concurrently and individual lookup failures are
/// swallowed: the selection is best-effort by design.
pub async fn top_level(
    store: Arc<dyn Store>,
    candidates: Vec<Descriptor>,
    options: &CopyOptions,
) -> Vec<Descriptor> {
    if candidates.len() <= 1 {
        return candidates;
    }

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for candidate in candidates.clone() {
        let store = store.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Vec::new(),
            };
            let content = match store.fetch(&candidate).await {
                Ok(content) => content,
                Err(error) => {
                    warn!(digest = %candidate.digest, %error, "skipping candidate successors");
                    return Vec::new();
                }
            };
            match oci::successors(&candidate.media_type, &content) {
                Ok(children) => children,
                Err(error) => {
                    warn!(digest = %candidate.digest, %error, "skipping unreadable candidate");
                    Vec::new()
                }
            }
        });
    }

    let mut referenced = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(children) = joined {
            referenced.extend(children.into_iter().map(|child| child.digest));
        }
    }

    candidates
        .into_iter()
        .filter(|candidate| !referenced.contains(&candidate.digest))
        .collect()
}
