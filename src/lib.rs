//! Protocol Buffers compiler plugin protocol: everything between "the compiler
//! spawned us" and "the compiler read our answer".
//!
//! A plugin is a separate executable. The compiler writes one serialized
//! `CodeGeneratorRequest` to its stdin and reads one `CodeGeneratorResponse`
//! from its stdout. This crate provides the pieces of that exchange:
//!
//! - [`descriptor`]: the frozen, name-keyed graph of schema files and types.
//! - [`envelope`]: decoding requests and encoding responses.
//! - [`context`]: the [`GeneratorContext`] backends write their files into,
//!   including insertions into files produced by other plugin passes.
//! - [`generator`]: the [`CodeGenerator`] trait each backend implements.
//! - [`driver`]: [`PluginDriver`], which runs one backend against one request
//!   and always answers with a well-formed response.
//! - [`outline`]: a small reference backend, shipped as `protoc-gen-outline`.
//!
//! # Writing a plugin
//!
//! ```no_run
//! use protoc_plugin::{CodeGenerator, DescriptorSet, GeneratorContext, SchemaFile};
//!
//! struct Hello;
//!
//! impl CodeGenerator for Hello {
//!     fn generate_file(
//!         &self,
//!         file: &SchemaFile,
//!         _descriptors: &DescriptorSet,
//!         _parameter: &str,
//!         context: &mut GeneratorContext,
//!     ) -> protoc_plugin::Result<()> {
//!         let mut out = context.open_full(&format!("{}.txt", file.name))?;
//!         out.line(&format!("hello from {}", file.name));
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> std::io::Result<()> {
//!     protoc_plugin::plugin_main(&Hello)
//! }
//! ```
//!
//! # Error handling
//!
//! The wire protocol reports failure as a single string. Internally every
//! failure is a [`PluginError`], whose `Display` output becomes that string.
//! Nothing a backend returns or panics with escapes the driver as anything
//! other than an error response.

pub mod context;
pub mod descriptor;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod generator;
pub mod outline;

// Re-export the small number of public API at the crate root.
pub use context::{GeneratorContext, OutputFile, WriteHandle};
pub use descriptor::{DescriptorSet, SchemaFile, TypeDecl, TypeKind};
pub use driver::{PluginDriver, plugin_main};
pub use envelope::{
    GenerationRequest, GenerationResponse, Outcome, decode_request, decode_response, encode_request,
    encode_response,
};
pub use error::{PluginError, Result};
pub use generator::{CodeGenerator, Features, parse_generator_parameter};

// Wire messages, so backends build against the same version the driver decodes.
pub use prost_types;
