use proptest::prelude::*;
use simple_test_case::test_case;
use stevedore::{Algorithm, Digest, Reference};

const HEX: &str = "a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";

fn digest() -> Digest {
    format!("sha256:{HEX}").parse().expect("parse digest")
}

#[test_case(
    "ghcr.io/acme/tool:latest",
    Reference::builder().registry("ghcr.io").repository("acme/tool").tag("latest").build();
    "registry_repo_tag"
)]
#[test_case(
    "hello-world:v1",
    Reference::builder().repository("hello-world").tag("v1").build();
    "repo_tag_without_registry"
)]
#[test_case(
    "oci://ghcr.io/acme/tool:v1",
    Reference::builder().scheme("oci").registry("ghcr.io").repository("acme/tool").tag("v1").build();
    "scheme_prefix"
)]
#[test]
fn parse(input: &str, expected: Reference) {
    let reference = input.parse::<Reference>().expect("parse reference");
    pretty_assertions::assert_eq!(reference, expected);
}

#[test]
fn parse_tag_and_digest_coexist() {
    let input = format!("hello-world:v1@sha256:{HEX}");
    let reference = input.parse::<Reference>().expect("parse reference");

    pretty_assertions::assert_eq!(reference.registry, None);
    pretty_assertions::assert_eq!(reference.repository, "hello-world");
    pretty_assertions::assert_eq!(reference.tag.as_deref(), Some("v1"));
    pretty_assertions::assert_eq!(reference.digest, Some(digest()));
    pretty_assertions::assert_eq!(reference.to_string(), input);
}

#[test]
fn parse_bare_digest() {
    let input = format!("sha256:{HEX}");
    let reference = input.parse::<Reference>().expect("parse reference");
    pretty_assertions::assert_eq!(reference.repository, "");
    pretty_assertions::assert_eq!(reference.digest, Some(digest()));
    pretty_assertions::assert_eq!(reference.to_string(), input);
}

#[test_case("reference:with:many:colons"; "multiple_colons")]
#[test_case("ftp://host/repo:tag"; "unknown_scheme")]
#[test_case("host/"; "empty_repository")]
#[test_case("ghcr.io/repo:tag with spaces"; "illegal_tag")]
#[test]
fn invalid_references(input: &str) {
    let _ = input.parse::<Reference>().expect_err("must error");
}

#[test]
fn digest_algorithms_are_a_closed_set() {
    assert!(Algorithm::is_known("sha256"));
    assert!(Algorithm::is_known("sha512"));
    assert!(!Algorithm::is_known("md5"));
    let _ = format!("md5:{HEX}")
        .parse::<stevedore::Digest>()
        .expect_err("unknown algorithms must not parse");
}

fn registry_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,8}(\\.[a-z]{2,4}){1,2}".prop_filter("no doubled dots", |s| !s.contains(".."))
}

fn repository_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,2}"
}

fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9._-]{0,16}"
}

fn digest_strategy() -> impl Strategy<Value = stevedore::Digest> {
    "[a-f0-9]{64}".prop_map(|hex| {
        format!("sha256:{hex}")
            .parse::<stevedore::Digest>()
            .expect("parse digest")
    })
}

fn reference_strategy() -> impl Strategy<Value = Reference> {
    (
        registry_strategy(),
        repository_strategy(),
        proptest::option::of(tag_strategy()),
        proptest::option::of(digest_strategy()),
    )
        .prop_map(|(registry, repository, tag, digest)| Reference {
            scheme: None,
            registry: Some(registry),
            repository,
            tag,
            digest,
        })
}

proptest! {
    // Property: parsing a formatted reference yields the original reference.
    #[test]
    fn roundtrip_parse_format(reference in reference_strategy()) {
        let formatted = reference.to_string();
        let parsed = formatted.parse::<Reference>().expect("parse formatted reference");
        prop_assert_eq!(reference, parsed);
    }
}
