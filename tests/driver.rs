// ==============================================================================
// Library Integration Tests: Full Request -> Response Through the Driver
// ==============================================================================
//
// These tests build wire-level requests, run them through `PluginDriver` with
// the outline backend, and decode the written response the way a compiler
// would.

mod common;

use common::{file, file_with_messages, proto3_optional_field, request_bytes, simple_request};
use pretty_assertions::assert_eq;
use prost_types::Edition;
use protoc_plugin::outline::OutlineGenerator;
use protoc_plugin::{Features, GenerationResponse, OutputFile, PluginDriver, decode_response};

fn run(bytes: &[u8]) -> GenerationResponse {
    let mut out = Vec::new();
    PluginDriver::new(&OutlineGenerator)
        .run(bytes, &mut out)
        .expect("in-memory channels do not fail");
    decode_response(&out).expect("driver writes a well-formed response")
}

fn full(name: &str, content: &str) -> OutputFile {
    OutputFile {
        name: name.to_string(),
        insertion_point: None,
        content: content.to_string(),
    }
}

// ==============================================================================
// Success Paths
// ==============================================================================

#[test]
fn test_single_message_end_to_end() {
    let response = run(&simple_request(""));
    assert_eq!(response.error(), None);
    assert_eq!(
        response.files(),
        [full("a.out", "<generated for message M in package p>\n")]
    );
    assert_eq!(response.supported_features, Features::PROTO3_OPTIONAL);
}

#[test]
fn test_only_requested_files_are_generated() {
    let dep = file_with_messages("dep.proto", "q", &["Shared"]);
    let mut a = file_with_messages("a.proto", "p", &["M"]);
    a.dependency.push("dep.proto".into());
    let response = run(&request_bytes(&["a.proto"], "", vec![dep, a]));

    let names: Vec<_> = response.files().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["a.out"]);
}

#[test]
fn test_files_follow_request_order() {
    let files = vec![
        file_with_messages("a.proto", "p", &["A"]),
        file_with_messages("b.proto", "p", &["B"]),
    ];
    let response = run(&request_bytes(&["b.proto", "a.proto"], "suffix=txt", files));
    let names: Vec<_> = response.files().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["b.txt", "a.txt"]);
}

#[test]
fn test_generation_is_byte_identical_across_runs() {
    let bytes = simple_request("fields,markers");
    let mut first = Vec::new();
    let mut second = Vec::new();
    PluginDriver::new(&OutlineGenerator)
        .run(bytes.as_slice(), &mut first)
        .expect("first run");
    PluginDriver::new(&OutlineGenerator)
        .run(bytes.as_slice(), &mut second)
        .expect("second run");
    assert_eq!(first, second);
}

#[test]
fn test_second_pass_inserts_into_first_pass_markers() {
    let first = run(&simple_request("markers"));
    assert_eq!(
        first.files(),
        [full(
            "a.out",
            "<generated for message M in package p>\n\
             // @@protoc_insertion_point(message_scope:p.M)\n\
             // @@protoc_insertion_point(module_scope)\n"
        )]
    );

    let second = run(&simple_request("insert_into=module_scope"));
    let files = second.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "a.out");
    assert_eq!(files[0].insertion_point.as_deref(), Some("module_scope"));
}

#[test]
fn test_proto3_optional_is_supported() {
    let mut a = file_with_messages("a.proto", "p", &["M"]);
    a.syntax = Some("proto3".into());
    a.message_type[0].field.push(proto3_optional_field("count", 1));
    let response = run(&request_bytes(&["a.proto"], "", vec![a]));
    assert_eq!(response.error(), None);
}

// ==============================================================================
// Failure Paths
// ==============================================================================

#[test]
fn test_editions_file_is_unsupported() {
    let mut a = file_with_messages("a.proto", "p", &["M"]);
    a.syntax = Some("editions".into());
    a.edition = Some(Edition::Edition2023 as i32);
    let response = run(&request_bytes(&["a.proto"], "", vec![a]));

    let error = response.error().expect("failure response");
    assert!(!error.is_empty());
    assert!(error.contains("editions"), "got {error}");
    assert!(response.files().is_empty());
    assert_eq!(response.supported_features, Features::PROTO3_OPTIONAL);
}

#[test]
fn test_missing_dependency_is_reported() {
    let b = file("b.proto", "p", &["c.proto"]);
    let response = run(&request_bytes(&["b.proto"], "", vec![b]));
    insta::assert_snapshot!(
        response.error().expect("failure response"),
        @"malformed descriptor: b.proto depends on c.proto, which is not in the descriptor set"
    );
}

#[test]
fn test_unknown_option_is_reported() {
    let response = run(&simple_request("colour=blue"));
    insta::assert_snapshot!(response.error().expect("failure response"), @"unknown option: colour");
    assert!(response.files().is_empty());
}

#[test]
fn test_duplicate_output_is_reported() {
    // Both inputs map to `a.out`, so the second full open collides.
    let files = vec![
        file_with_messages("a.proto", "p", &["A"]),
        file_with_messages("a", "p", &["B"]),
    ];
    let response = run(&request_bytes(&["a.proto", "a"], "", files));
    insta::assert_snapshot!(
        response.error().expect("failure response"),
        @"tried to write the same file twice: a.out"
    );
    assert!(response.files().is_empty());
}

#[test]
fn test_garbage_input_is_reported() {
    let response = run(b"\x0a\xff\xff\xff\xff\xff\xff\xff\xff\xff\xff");
    let error = response.error().expect("failure response");
    assert!(error.starts_with("malformed request:"), "got {error}");
}

#[test]
fn test_empty_input_is_an_empty_request() {
    // An empty message is a valid encoding of a request with nothing to do.
    let response = run(b"");
    assert_eq!(response.error(), None);
    assert!(response.files().is_empty());
}
