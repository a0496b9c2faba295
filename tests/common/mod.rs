// ==============================================================================
// Shared Test Helpers
// ==============================================================================
//
// Builders for wire-level requests, so tests can describe a compiler request in
// a few lines and feed its bytes to the driver or the binary.
//
// Each test file that imports this module compiles its own copy, so not every
// function is used in every binary. Suppress the resulting dead_code warnings.
#![allow(dead_code)]

use prost::Message as _;
use prost_types::compiler::CodeGeneratorRequest;
use prost_types::field_descriptor_proto::Type;
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

/// A schema file with the given package and dependencies and no types.
pub fn file(name: &str, package: &str, deps: &[&str]) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        dependency: deps.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}

/// A schema file declaring one message per name.
pub fn file_with_messages(name: &str, package: &str, messages: &[&str]) -> FileDescriptorProto {
    let mut f = file(name, package, &[]);
    f.message_type = messages.iter().map(|m| message(m)).collect();
    f
}

pub fn message(name: &str) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

/// A proto3 `optional int32` field.
pub fn proto3_optional_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        r#type: Some(Type::Int32 as i32),
        proto3_optional: Some(true),
        ..Default::default()
    }
}

/// Encode a request for `to_generate` over `files`.
pub fn request_bytes(
    to_generate: &[&str],
    parameter: &str,
    files: Vec<FileDescriptorProto>,
) -> Vec<u8> {
    CodeGeneratorRequest {
        file_to_generate: to_generate.iter().map(|f| f.to_string()).collect(),
        parameter: (!parameter.is_empty()).then(|| parameter.to_string()),
        proto_file: files,
        ..Default::default()
    }
    .encode_to_vec()
}

/// The canonical single-file request: `a.proto` in package `p` with message `M`.
pub fn simple_request(parameter: &str) -> Vec<u8> {
    request_bytes(&["a.proto"], parameter, vec![file_with_messages("a.proto", "p", &["M"])])
}
