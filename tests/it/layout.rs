use bytes::Bytes;
use futures_lite::StreamExt;
use stevedore::{
    layout::{Reader, Writer, INDEX_FILENAME, LAYOUT_FILENAME},
    oci::{empty_descriptor, Descriptor, Manifest, EMPTY_JSON_CONTENT, IMAGE_LAYER},
    store::Store,
};
use tokio::io::AsyncReadExt;

async fn populate(writer: &Writer) -> Descriptor {
    let layer = Descriptor::for_content(IMAGE_LAYER, b"foobar");
    writer
        .push(&layer, Bytes::from_static(b"foobar"))
        .await
        .expect("push layer");
    writer
        .push(&empty_descriptor(), Bytes::from_static(EMPTY_JSON_CONTENT))
        .await
        .expect("push config");

    let manifest = Manifest::builder()
        .config(empty_descriptor())
        .layers(vec![layer])
        .build();
    let descriptor = manifest.descriptor().expect("manifest descriptor");
    writer
        .push(
            &descriptor,
            Bytes::from(manifest.to_bytes().expect("manifest bytes")),
        )
        .await
        .expect("push manifest");
    writer
        .tag(&descriptor, "myimage:v1.0.0")
        .await
        .expect("tag manifest");
    descriptor
}

#[test_log::test(tokio::test)]
async fn closed_layouts_have_the_canonical_entry_structure() {
    let writer = Writer::tar();
    let _ = populate(&writer).await;
    let (_, bytes) = writer.close().await.expect("close");

    let mut archive = tokio_tar::Archive::new(bytes.as_ref());
    let mut entries = archive.entries().expect("read entries");
    let mut names = Vec::new();
    while let Some(entry) = entries.next().await {
        let mut entry = entry.expect("read entry");
        let name = entry.path().expect("entry path").display().to_string();
        let declared = entry.header().size().expect("entry size");

        let mut content = Vec::new();
        entry.read_to_end(&mut content).await.expect("read entry");
        assert_eq!(
            declared,
            content.len() as u64,
            "entry {name} declares a size that does not match its content"
        );

        if let Some(rest) = name.strip_prefix("blobs/") {
            let (algorithm, hex) = rest.split_once('/').expect("algorithm segment");
            let digest = format!("{algorithm}:{hex}")
                .parse::<stevedore::Digest>()
                .expect("blob path digests must parse");
            assert!(digest.verifies(&content), "blob {name} content mismatch");
        }
        names.push(name);
    }

    let index_count = names.iter().filter(|name| *name == INDEX_FILENAME).count();
    let layout_count = names.iter().filter(|name| *name == LAYOUT_FILENAME).count();
    assert_eq!(index_count, 1, "exactly one index entry");
    assert_eq!(layout_count, 1, "exactly one layout marker entry");

    // Every entry before the two trailing ones is a blob.
    let trailing = &names[names.len() - 2..];
    assert_eq!(trailing[0], INDEX_FILENAME);
    assert_eq!(trailing[1], LAYOUT_FILENAME);
    for name in &names[..names.len() - 2] {
        assert!(name.starts_with("blobs/"), "unexpected entry {name}");
    }
}

#[test_log::test(tokio::test)]
async fn gzip_layouts_read_back_transparently() {
    let writer = Writer::tar_gzip();
    let manifest = populate(&writer).await;
    let (descriptor, bytes) = writer.close().await.expect("close");
    assert!(descriptor.media_type.ends_with("+tar+gzip"));

    let reader = Reader::read(bytes.as_ref()).await.expect("read layout");
    let resolved = reader.resolve("myimage:v1.0.0").await.expect("resolve tag");
    assert_eq!(resolved.digest, manifest.digest);

    let inner = Manifest::from_bytes(&reader.fetch(&resolved).await.expect("fetch manifest"))
        .expect("parse manifest");
    let layer = reader
        .fetch(&inner.layers[0])
        .await
        .expect("fetch layer");
    assert_eq!(layer.as_ref(), b"foobar");
}

#[test_log::test(tokio::test)]
async fn corrupted_layouts_are_rejected() {
    let writer = Writer::tar();
    let _ = populate(&writer).await;
    let (_, bytes) = writer.close().await.expect("close");

    // Truncating the stream loses the index entry.
    let truncated = &bytes[..bytes.len() / 2];
    let _ = Reader::read(truncated).await.expect_err("must reject");
}
