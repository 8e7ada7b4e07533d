use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use stevedore::{
    descriptor::{
        Access, Component, ComponentDescriptor, Identity, Label, LocalBlobAccess,
        OciArtifactAccess, Resource,
    },
    layout,
    oci::{self, Descriptor, Manifest},
    repository::{LocalResourceMode, Repository},
    resolver::{Resolver, StoreResolver},
    store::{memory::Memory, Error, ReferrerLister, Store, TagLister},
    Digest, Reference,
};

fn component(name: &str, version: &str) -> ComponentDescriptor {
    ComponentDescriptor::builder()
        .component(
            Component::builder()
                .name(name)
                .version(version)
                .provider("acme.org")
                .build(),
        )
        .build()
}

fn repository(store: &Memory) -> Repository {
    Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store.clone()))))
        .creator("stevedore tests")
        .build()
}

fn local_blob_resource(name: &str, version: &str, extra: Identity, content: &[u8]) -> Resource {
    Resource::builder()
        .name(name)
        .version(version)
        .extra_identity(extra)
        .kind("blob")
        .access(Access::LocalBlob(
            LocalBlobAccess::builder()
                .local_reference(Digest::from_content(content).to_string())
                .media_type("application/octet-stream")
                .build(),
        ))
        .build()
}

/// Build a layout archive holding a single image whose only layer is the
/// provided content, tagged with the provided reference.
async fn single_image_layout(tag: &str, content: &'static [u8]) -> Bytes {
    let writer = layout::Writer::tar();
    let layer = Descriptor::for_content(oci::IMAGE_LAYER, content);
    writer
        .push(&layer, Bytes::from_static(content))
        .await
        .expect("push layer");
    writer
        .push(
            &oci::empty_descriptor(),
            Bytes::from_static(oci::EMPTY_JSON_CONTENT),
        )
        .await
        .expect("push config");
    let manifest = Manifest::builder()
        .config(oci::empty_descriptor())
        .layers(vec![layer])
        .build();
    let descriptor = manifest.descriptor().expect("descriptor");
    writer
        .push(
            &descriptor,
            Bytes::from(manifest.to_bytes().expect("bytes")),
        )
        .await
        .expect("push manifest");
    writer.tag(&descriptor, tag).await.expect("tag");
    writer.close().await.expect("close").1
}

#[test_log::test(tokio::test)]
async fn component_versions_roundtrip() {
    let store = Memory::new();
    let repository = repository(&store);

    let mut descriptor = component("test/c", "v1.0.0");
    descriptor.component.labels.push(
        Label::builder()
            .name("foo")
            .value(serde_json::json!("bar"))
            .build(),
    );

    repository
        .add_component_version(&descriptor)
        .await
        .expect("publish");
    let retrieved = repository
        .get_component_version("test/c", "v1.0.0")
        .await
        .expect("retrieve");

    pretty_assertions::assert_eq!(retrieved, descriptor);
    pretty_assertions::assert_eq!(
        retrieved.component.labels,
        vec![Label::builder()
            .name("foo")
            .value(serde_json::json!("bar"))
            .build()]
    );
}

#[test_log::test(tokio::test)]
async fn local_resources_roundtrip_with_platform_mapping() {
    let store = Memory::new();
    let repository = repository(&store);

    let mut resource = local_blob_resource(
        "layer",
        "1",
        Identity::from([("architecture", "amd64"), ("os", "linux")]),
        b"hello",
    );
    repository
        .add_local_resource("test/c", "v1.0.0", &mut resource, Bytes::from_static(b"hello"))
        .await
        .expect("stage resource");

    // The rewritten access points at the staged artifact.
    assert!(
        matches!(&resource.access, Access::LocalBlob(local) if local.global_access.is_some()),
        "access must carry a nested global access, found {:?}",
        resource.access,
    );
    let digest = resource.digest.clone().expect("digest set");
    pretty_assertions::assert_eq!(digest.hash_algorithm, "SHA-256");
    pretty_assertions::assert_eq!(digest.normalisation_algorithm, "ociArtifactDigest/v1");

    let mut descriptor = component("test/c", "v1.0.0");
    descriptor.component.resources.push(resource);
    repository
        .add_component_version(&descriptor)
        .await
        .expect("publish");

    // Retrieval through a subset of the identity returns the bytes.
    let blob = repository
        .get_local_resource(
            "test/c",
            "v1.0.0",
            &Identity::from([("name", "layer"), ("version", "1")]),
        )
        .await
        .expect("retrieve resource");
    pretty_assertions::assert_eq!(blob.bytes.as_ref(), b"hello");

    // The staged descriptor carries the identity's platform fields.
    let resolver = StoreResolver::new(Arc::new(store.clone()));
    let reference = resolver
        .component_reference("test/c", "v1.0.0")
        .expect("reference");
    let top = store
        .resolve(&reference.to_string())
        .await
        .expect("resolve component");
    let manifest = Manifest::from_bytes(&store.fetch(&top).await.expect("fetch manifest"))
        .expect("parse manifest");
    let staged = &manifest.layers[1];
    let platform = staged.platform.as_ref().expect("platform set");
    pretty_assertions::assert_eq!(platform.architecture, "amd64");
    pretty_assertions::assert_eq!(platform.os, "linux");
}

#[test_log::test(tokio::test)]
async fn ambiguous_identities_are_rejected() {
    let store = Memory::new();
    let repository = repository(&store);

    let mut descriptor = component("test/c", "v1.0.0");
    let mut a = local_blob_resource("a", "1", Identity::new(), b"first");
    let mut b = local_blob_resource("b", "1", Identity::new(), b"second");
    repository
        .add_local_resource("test/c", "v1.0.0", &mut a, Bytes::from_static(b"first"))
        .await
        .expect("stage a");
    repository
        .add_local_resource("test/c", "v1.0.0", &mut b, Bytes::from_static(b"second"))
        .await
        .expect("stage b");
    descriptor.component.resources.push(a);
    descriptor.component.resources.push(b);
    repository
        .add_component_version(&descriptor)
        .await
        .expect("publish");

    // `{version: 1}` matches both resources.
    let report = repository
        .get_local_resource("test/c", "v1.0.0", &Identity::from([("version", "1")]))
        .await
        .expect_err("ambiguous identity must fail");
    assert!(report.to_string().contains("matches 2 resources"), "{report}");
}

#[test_log::test(tokio::test)]
async fn concurrent_staging_seals_every_resource() {
    let store = Memory::new();
    let repository = Arc::new(repository(&store));

    let mut tasks = tokio::task::JoinSet::new();
    for index in 0..4u8 {
        let repository = repository.clone();
        tasks.spawn(async move {
            let body = format!("content-{index}").into_bytes();
            let mut resource =
                local_blob_resource(&format!("res-{index}"), "1", Identity::new(), &body);
            repository
                .add_local_resource("test/c", "v1.0.0", &mut resource, Bytes::from(body))
                .await
                .expect("stage resource");
            resource
        });
    }
    let mut resources = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        resources.push(joined.expect("join staging task"));
    }

    let mut descriptor = component("test/c", "v1.0.0");
    resources.sort_by(|a, b| a.name.cmp(&b.name));
    descriptor.component.resources = resources;
    repository
        .add_component_version(&descriptor)
        .await
        .expect("publish");

    let resolver = StoreResolver::new(Arc::new(store.clone()));
    let reference = resolver
        .component_reference("test/c", "v1.0.0")
        .expect("reference");
    let top = store
        .resolve(&reference.to_string())
        .await
        .expect("resolve component");
    let manifest = Manifest::from_bytes(&store.fetch(&top).await.expect("fetch manifest"))
        .expect("parse manifest");

    let mut staged_names = manifest.layers[1..]
        .iter()
        .flat_map(|layer| oci::artifact_entries(layer).expect("parse artifact annotation"))
        .filter_map(|entry| entry.identity.get("name").cloned())
        .collect::<Vec<_>>();
    staged_names.sort();
    pretty_assertions::assert_eq!(staged_names, vec!["res-0", "res-1", "res-2", "res-3"]);

    // Every staged resource reads back through its identity.
    for index in 0..4u8 {
        let blob = repository
            .get_local_resource(
                "test/c",
                "v1.0.0",
                &Identity::from([("name", format!("res-{index}").as_str())]),
            )
            .await
            .expect("retrieve resource");
        pretty_assertions::assert_eq!(blob.bytes.as_ref(), format!("content-{index}").as_bytes());
    }
}

#[test_log::test(tokio::test)]
async fn listing_merges_sorts_and_deduplicates() {
    let store = Memory::new();
    let repository = repository(&store);

    for version in ["v1.0.0", "v1.1.0", "v2.0.0-rc1"] {
        repository
            .add_component_version(&component("test/c", version))
            .await
            .expect("publish");
    }
    // Retag v1.1.0 with a different descriptor body: the tag moves to a new
    // digest, and the version must still list exactly once.
    let mut retagged = component("test/c", "v1.1.0");
    retagged.component.provider = "acme.org/retagged".to_string();
    repository
        .add_component_version(&retagged)
        .await
        .expect("republish");

    let versions = repository
        .list_component_versions("test/c")
        .await
        .expect("list versions");
    pretty_assertions::assert_eq!(versions, vec!["v2.0.0-rc1", "v1.1.0", "v1.0.0"]);
}

/// Hides a capability of the wrapped store so listing paths can be
/// exercised in isolation.
#[derive(Debug, Clone)]
struct Capabilities {
    inner: Memory,
    with_tags: bool,
    with_referrers: bool,
}

#[async_trait]
impl Store for Capabilities {
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error> {
        self.inner.fetch(descriptor).await
    }
    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        self.inner.exists(descriptor).await
    }
    async fn push(&self, descriptor: &Descriptor, content: Bytes) -> Result<(), Error> {
        self.inner.push(descriptor, content).await
    }
    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        self.inner.resolve(reference).await
    }
    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error> {
        self.inner.tag(descriptor, reference).await
    }
    fn tags(&self) -> Option<&dyn TagLister> {
        self.with_tags.then_some(&self.inner as &dyn TagLister)
    }
    fn referrers(&self) -> Option<&dyn ReferrerLister> {
        self.with_referrers.then_some(&self.inner as &dyn ReferrerLister)
    }
}

#[test_log::test(tokio::test)]
async fn listing_works_through_referrers_alone() {
    let inner = Memory::new();
    let store = Capabilities {
        inner,
        with_tags: false,
        with_referrers: true,
    };
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store))))
        .build();

    for version in ["v1.0.0", "v1.1.0"] {
        repository
            .add_component_version(&component("test/c", version))
            .await
            .expect("publish");
    }
    let versions = repository
        .list_component_versions("test/c")
        .await
        .expect("list versions");
    pretty_assertions::assert_eq!(versions, vec!["v1.1.0", "v1.0.0"]);
}

#[test_log::test(tokio::test)]
async fn listing_requires_some_capability() {
    let store = Capabilities {
        inner: Memory::new(),
        with_tags: false,
        with_referrers: false,
    };
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store))))
        .build();

    let report = repository
        .list_component_versions("test/c")
        .await
        .expect_err("must fail");
    assert!(
        report
            .to_string()
            .contains("supports neither tag listing nor referrer listing"),
        "{report}"
    );
}

#[test_log::test(tokio::test)]
async fn uploaded_resources_download_as_layouts() {
    let store = Memory::new();
    let repository = repository(&store);

    let layout_blob = single_image_layout("myimage:v1.0.0", b"foobar").await;
    let mut resource = Resource::builder()
        .name("image")
        .version("1.0.0")
        .kind("ociImage")
        .access(Access::OciArtifact(
            OciArtifactAccess::builder()
                .image_reference("myimage:v1.0.0")
                .build(),
        ))
        .build();

    let target: Reference = "ghcr.io/test:v1.0.0".parse().expect("parse target");
    repository
        .upload_resource(&target, &mut resource, layout_blob)
        .await
        .expect("upload");

    assert!(
        matches!(&resource.access, Access::OciArtifact(access) if access.image_reference == target.to_string()),
        "access must be rewritten to the target",
    );
    let declared = resource.digest.clone().expect("digest recorded");

    let blob = repository
        .download_resource(&resource)
        .await
        .expect("download");
    pretty_assertions::assert_eq!(blob.media_type, oci::OCI_LAYOUT_TAR_GZIP);

    // The downloaded layout holds the original layer bytes.
    let reader = layout::Reader::read(blob.bytes.as_ref())
        .await
        .expect("read downloaded layout");
    let top = reader
        .resolve(&target.to_string())
        .await
        .expect("resolve target tag");
    pretty_assertions::assert_eq!(top.digest.as_hex(), declared.value);
    let manifest = Manifest::from_bytes(&reader.fetch(&top).await.expect("fetch manifest"))
        .expect("parse manifest");
    let layer = reader
        .fetch(&manifest.layers[0])
        .await
        .expect("fetch layer");
    pretty_assertions::assert_eq!(layer.as_ref(), b"foobar");
}

#[test_log::test(tokio::test)]
async fn digest_mismatches_are_fatal_on_download() {
    let store = Memory::new();
    let repository = repository(&store);

    let layout_blob = single_image_layout("myimage:v1.0.0", b"foobar").await;
    let mut resource = Resource::builder()
        .name("image")
        .version("1.0.0")
        .kind("ociImage")
        .access(Access::OciArtifact(
            OciArtifactAccess::builder()
                .image_reference("myimage:v1.0.0")
                .build(),
        ))
        .build();
    let target: Reference = "ghcr.io/test:v1.0.0".parse().expect("parse target");
    repository
        .upload_resource(&target, &mut resource, layout_blob)
        .await
        .expect("upload");

    if let Some(digest) = &mut resource.digest {
        digest.value = "deadbeef".to_string();
    }
    let report = repository
        .download_resource(&resource)
        .await
        .expect_err("mismatch must be fatal");
    let message = format!("{report:#}");
    assert!(message.contains(r#"expected "sha256:deadbeef""#), "{message}");
}

/// A store whose pushes never complete, standing in for a stalled remote.
#[derive(Debug, Clone)]
struct Stalled {
    inner: Memory,
}

#[async_trait]
impl Store for Stalled {
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error> {
        self.inner.fetch(descriptor).await
    }
    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        self.inner.exists(descriptor).await
    }
    async fn push(&self, _: &Descriptor, _: Bytes) -> Result<(), Error> {
        std::future::pending::<()>().await;
        unreachable!("pending never resolves")
    }
    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        self.inner.resolve(reference).await
    }
    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error> {
        self.inner.tag(descriptor, reference).await
    }
}

#[test_log::test(tokio::test)]
async fn abandoned_publishes_leave_no_tag() {
    let inner = Memory::new();
    let store = Stalled {
        inner: inner.clone(),
    };
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store))))
        .build();

    let cv = component("test/c", "v1.0.0");
    let publish = repository.add_component_version(&cv);
    let result = tokio::time::timeout(Duration::from_millis(100), publish).await;
    assert!(result.is_err(), "publish against a stalled store must hang");

    assert!(
        inner.tagged().is_empty(),
        "an abandoned publish must not leave a tag behind"
    );
}

#[test_log::test(tokio::test)]
async fn layer_mode_rewrites_access_directly() {
    let store = Memory::new();
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store))))
        .mode(LocalResourceMode::OciLayer)
        .build();

    let mut resource = local_blob_resource("layer", "1", Identity::new(), b"hello");
    repository
        .add_local_resource("test/c", "v1.0.0", &mut resource, Bytes::from_static(b"hello"))
        .await
        .expect("stage resource");
    assert!(
        matches!(&resource.access, Access::OciLayer(_)),
        "layer mode must rewrite to a layer access, found {:?}",
        resource.access,
    );
}

#[test_log::test(tokio::test)]
async fn layout_resources_roundtrip_as_layouts() {
    let store = Memory::new();
    let repository = repository(&store);

    let layout_blob = single_image_layout("myimage:v1.0.0", b"foobar").await;
    let mut resource = Resource::builder()
        .name("image")
        .version("1.0.0")
        .kind("ociImage")
        .access(Access::LocalBlob(
            LocalBlobAccess::builder()
                .local_reference(Digest::from_content(&layout_blob).to_string())
                .media_type(oci::OCI_LAYOUT_TAR)
                .build(),
        ))
        .build();
    repository
        .add_local_resource("test/c", "v1.0.0", &mut resource, layout_blob)
        .await
        .expect("stage layout resource");

    let mut descriptor = component("test/c", "v1.0.0");
    descriptor.component.resources.push(resource);
    repository
        .add_component_version(&descriptor)
        .await
        .expect("publish");

    let blob = repository
        .get_local_resource("test/c", "v1.0.0", &Identity::from([("name", "image")]))
        .await
        .expect("retrieve layout resource");
    pretty_assertions::assert_eq!(blob.media_type, oci::OCI_LAYOUT_TAR_GZIP);

    // The extracted layout carries the full graph: index, manifest, layer.
    let reader = layout::Reader::read(blob.bytes.as_ref())
        .await
        .expect("read extracted layout");
    let index_entry = reader
        .index()
        .manifests
        .iter()
        .find(|entry| oci::is_image_index(&entry.media_type))
        .cloned()
        .expect("extracted layout lists the staged index");
    let inner = stevedore::oci::Index::from_bytes(
        &reader.fetch(&index_entry).await.expect("fetch inner index"),
    )
    .expect("parse inner index");
    let manifest = Manifest::from_bytes(
        &reader
            .fetch(&inner.manifests[0])
            .await
            .expect("fetch inner manifest"),
    )
    .expect("parse inner manifest");
    let layer = reader
        .fetch(&manifest.layers[0])
        .await
        .expect("fetch inner layer");
    pretty_assertions::assert_eq!(layer.as_ref(), b"foobar");
}

/// Rejects component manifests until opened, standing in for a registry
/// that fails mid-publish.
#[derive(Debug)]
struct Gated {
    inner: Memory,
    open: std::sync::atomic::AtomicBool,
}

impl Gated {
    fn new(inner: Memory) -> Self {
        Self {
            inner,
            open: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn open(&self) {
        self.open.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for Gated {
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Bytes, Error> {
        self.inner.fetch(descriptor).await
    }
    async fn exists(&self, descriptor: &Descriptor) -> Result<bool, Error> {
        self.inner.exists(descriptor).await
    }
    async fn push(&self, descriptor: &Descriptor, content: Bytes) -> Result<(), Error> {
        let component_manifest =
            descriptor.artifact_type.as_deref() == Some(oci::COMPONENT_DESCRIPTOR_V2);
        if component_manifest && !self.open.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Transport("registry unavailable".to_string()));
        }
        self.inner.push(descriptor, content).await
    }
    async fn resolve(&self, reference: &str) -> Result<Descriptor, Error> {
        self.inner.resolve(reference).await
    }
    async fn tag(&self, descriptor: &Descriptor, reference: &str) -> Result<(), Error> {
        self.inner.tag(descriptor, reference).await
    }
}

#[test_log::test(tokio::test)]
async fn failed_publishes_keep_the_staged_set_for_retry() {
    let gated = Arc::new(Gated::new(Memory::new()));
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(gated.clone())))
        .build();

    let mut resource = local_blob_resource("layer", "1", Identity::new(), b"hello");
    repository
        .add_local_resource("test/c", "v1.0.0", &mut resource, Bytes::from_static(b"hello"))
        .await
        .expect("stage resource");

    let mut descriptor = component("test/c", "v1.0.0");
    descriptor.component.resources.push(resource);
    let _ = repository
        .add_component_version(&descriptor)
        .await
        .expect_err("publish must fail while the store is gated");

    // Retrying after the store recovers seals the previously staged layers
    // without re-uploading anything.
    gated.open();
    repository
        .add_component_version(&descriptor)
        .await
        .expect("retry succeeds");
    let blob = repository
        .get_local_resource("test/c", "v1.0.0", &Identity::from([("name", "layer")]))
        .await
        .expect("staged resource was sealed by the retry");
    pretty_assertions::assert_eq!(blob.bytes.as_ref(), b"hello");
}

#[test_log::test(tokio::test)]
async fn upload_falls_back_to_bare_tags() {
    let store = Memory::new();
    let repository = repository(&store);

    // Some producers key their layouts by tag alone.
    let layout_blob = single_image_layout("v1.0.0", b"foobar").await;
    let mut resource = Resource::builder()
        .name("image")
        .version("1.0.0")
        .kind("ociImage")
        .access(Access::OciArtifact(
            OciArtifactAccess::builder()
                .image_reference("ghcr.io/acme/myimage:v1.0.0")
                .build(),
        ))
        .build();

    let target: Reference = "ghcr.io/test:v1.0.0".parse().expect("parse target");
    repository
        .upload_resource(&target, &mut resource, layout_blob)
        .await
        .expect("upload resolves through the bare tag");

    let blob = repository
        .download_resource(&resource)
        .await
        .expect("download");
    pretty_assertions::assert_eq!(blob.media_type, oci::OCI_LAYOUT_TAR_GZIP);
}

#[test_log::test(tokio::test)]
async fn layer_mode_resources_download_their_staged_artifact() {
    let store = Memory::new();
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store))))
        .mode(LocalResourceMode::OciLayer)
        .build();

    let mut resource = local_blob_resource("layer", "1", Identity::new(), b"hello");
    repository
        .add_local_resource("test/c", "v1.0.0", &mut resource, Bytes::from_static(b"hello"))
        .await
        .expect("stage resource");
    let mut descriptor = component("test/c", "v1.0.0");
    descriptor.component.resources.push(resource.clone());
    repository
        .add_component_version(&descriptor)
        .await
        .expect("publish");

    // The rewritten access names the staged wrapping manifest; downloading
    // returns exactly that artifact, digest-checked.
    let blob = repository
        .download_resource(&resource)
        .await
        .expect("download staged artifact");
    let declared = resource.digest.expect("digest recorded");
    pretty_assertions::assert_eq!(blob.digest.as_hex(), declared.value);
    let manifest = Manifest::from_bytes(&blob.bytes).expect("staged artifact is a manifest");
    pretty_assertions::assert_eq!(manifest.layers.len(), 1);
}

#[test_log::test(tokio::test)]
async fn registered_access_types_resolve_through_the_scheme() {
    use stevedore::descriptor::AccessScheme;

    let mut scheme = AccessScheme::default();
    scheme.register("vaultBlob/v1", |value| {
        use color_eyre::eyre::Context;
        serde_json::from_value::<LocalBlobAccess>(value)
            .context("parse vault blob access")
            .map(Access::LocalBlob)
    });

    let store = Memory::new();
    let repository = Repository::builder()
        .resolver(Arc::new(StoreResolver::new(Arc::new(store))))
        .scheme(scheme)
        .build();

    let raw = serde_json::json!({
        "type": "vaultBlob/v1",
        "localReference": Digest::from_content(b"hello").to_string(),
        "mediaType": "application/octet-stream",
    });
    let mut resource = Resource::builder()
        .name("layer")
        .version("1")
        .kind("blob")
        .access(Access::from_value(raw).expect("parse raw access"))
        .build();

    // The default parser leaves the unknown type raw; the repository's
    // scheme recognises it at use time.
    assert!(matches!(&resource.access, Access::Other(_)));
    repository
        .add_local_resource("test/c", "v1.0.0", &mut resource, Bytes::from_static(b"hello"))
        .await
        .expect("stage through registered access type");
}
