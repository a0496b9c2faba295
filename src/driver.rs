// ==============================================================================
// Plugin Driver: Read One Request, Generate Once, Write One Response
// ==============================================================================
//
// The driver is a three-state machine:
//
//   Reading    -- consume stdin to EOF and decode the request
//   Generating -- gate on features, then call the backend exactly once
//   Responding -- encode and flush the response
//
// Any failure before or during generation becomes an error *inside* the
// response. The process still exits 0, so the compiler can tell "the plugin
// ran and reported an error" apart from "the plugin crashed". Only failures on
// the channels themselves (stdin unreadable, stdout closed) surface as
// `io::Error` to the caller.

use std::any::Any;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::context::{GeneratorContext, OutputFile};
use crate::descriptor::Syntax;
use crate::envelope::{GenerationRequest, GenerationResponse, decode_request, encode_response};
use crate::error::{PluginError, Result};
use crate::generator::{CodeGenerator, Features};

/// Where the driver is in its single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Reading,
    Generating,
    Responding,
}

/// Runs one backend against one request.
pub struct PluginDriver<'g, G: ?Sized> {
    generator: &'g G,
    state: State,
}

impl<'g, G: CodeGenerator + ?Sized> PluginDriver<'g, G> {
    pub fn new(generator: &'g G) -> Self {
        PluginDriver {
            generator,
            state: State::Reading,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Read a request from `input`, generate, and write the response to
    /// `output`.
    ///
    /// Returns `Err` only when a channel fails: an unreadable input (other
    /// than an early close, which is reported in the response) or an output
    /// that cannot be written.
    pub fn run<R: Read, W: Write>(&mut self, mut input: R, mut output: W) -> io::Result<()> {
        self.state = State::Reading;
        let mut bytes = Vec::new();
        let response = match input.read_to_end(&mut bytes) {
            Ok(_) => self.respond(&bytes),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                let err = PluginError::TruncatedInput(e.to_string());
                self.state = State::Responding;
                self.failure(&err)
            }
            Err(e) => return Err(e),
        };

        debug_assert_eq!(self.state, State::Responding);
        output.write_all(&encode_response(&response))?;
        output.flush()
    }

    /// Turn raw request bytes into a response. Never fails: every error ends
    /// up in the response.
    pub fn respond(&mut self, bytes: &[u8]) -> GenerationResponse {
        self.state = State::Reading;
        debug!(bytes = bytes.len(), "decoding request");
        let request = match decode_request(bytes) {
            Ok(request) => request,
            Err(err) => {
                self.state = State::Responding;
                return self.failure(&classify_decode_error(err, bytes));
            }
        };

        self.state = State::Generating;
        let result = self.generate(&request);

        self.state = State::Responding;
        match result {
            Ok(files) => {
                debug!(files = files.len(), "generation succeeded");
                let features = self.generator.supported_features();
                let mut response = GenerationResponse::success(features, files);
                response.edition_range = self.edition_range();
                response
            }
            Err(err) => self.failure(&err),
        }
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Vec<OutputFile>> {
        debug!(
            files = ?request.files_to_generate,
            parameter = %request.parameter,
            "generating"
        );
        self.check_features(request)?;

        let mut context = GeneratorContext::new(
            request.files_to_generate.clone(),
            request.compiler_version.clone(),
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.generator.generate(
                &request.descriptors,
                &request.files_to_generate,
                &request.parameter,
                &mut context,
            )
        }));

        match outcome {
            Ok(Ok(())) => Ok(context.finish()),
            // Dropping `context` discards whatever was buffered.
            Ok(Err(err)) => Err(err),
            Err(payload) => Err(PluginError::Generator(format!(
                "generator panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Refuse requests that need a capability the backend does not advertise,
    /// or an edition outside its declared range.
    fn check_features(&self, request: &GenerationRequest) -> Result<()> {
        let supported = self.generator.supported_features();
        let descriptors = &request.descriptors;

        for name in &request.files_to_generate {
            let required = descriptors.required_features(std::slice::from_ref(name));
            let missing = required.difference(supported);
            if !missing.is_empty() {
                return Err(PluginError::UnsupportedFeature(format!(
                    "{name}: is a file using {}, but the plugin does not support {}",
                    missing.names().join(" and "),
                    if missing.names().len() > 1 { "them" } else { "it" },
                )));
            }
        }

        if let Some((min, max)) = self.edition_range() {
            for name in &request.files_to_generate {
                let Some(file) = descriptors.file_by_name(name) else {
                    continue;
                };
                if let Syntax::Editions(edition) = file.syntax
                    && !(min..=max).contains(&edition)
                {
                    return Err(PluginError::UnsupportedFeature(format!(
                        "{name}: is a file using edition {edition}, which is outside the range \
                         {min}..={max} supported by the plugin"
                    )));
                }
            }
        }
        Ok(())
    }

    fn edition_range(&self) -> Option<(i32, i32)> {
        if !self.generator.supported_features().contains(Features::SUPPORTS_EDITIONS) {
            return None;
        }
        let min = self.generator.minimum_edition()? as i32;
        let max = self.generator.maximum_edition()? as i32;
        Some((min, max))
    }

    fn failure(&self, err: &PluginError) -> GenerationResponse {
        warn!(error = %err, "responding with error");
        let features = self.generator.supported_features();
        let mut response = GenerationResponse::failure(features, err.to_string());
        response.edition_range = self.edition_range();
        response
    }
}

/// Decode errors caused by input ending mid-message are reported as
/// truncation rather than malformation.
fn classify_decode_error(err: PluginError, bytes: &[u8]) -> PluginError {
    match err {
        PluginError::MalformedRequest(message) if ends_mid_field(bytes) => {
            PluginError::TruncatedInput(message)
        }
        other => other,
    }
}

/// Whether `bytes` stops partway through a top-level field. A channel that
/// closes early leaves exactly this shape: every field before the cut is
/// whole, the last one is not.
fn ends_mid_field(mut bytes: &[u8]) -> bool {
    while !bytes.is_empty() {
        let key = match take_varint(&mut bytes) {
            Varint::Value(key) => key,
            Varint::CutShort => return true,
            Varint::Overlong => return false,
        };
        let needed = match key & 0x7 {
            0 => match take_varint(&mut bytes) {
                Varint::Value(_) => 0,
                Varint::CutShort => return true,
                Varint::Overlong => return false,
            },
            1 => 8,
            2 => match take_varint(&mut bytes) {
                Varint::Value(len) => len,
                Varint::CutShort => return true,
                Varint::Overlong => return false,
            },
            5 => 4,
            // Groups and undefined wire types: malformed, not cut short.
            _ => return false,
        };
        match usize::try_from(needed) {
            Ok(needed) if needed <= bytes.len() => bytes = &bytes[needed..],
            _ => return true,
        }
    }
    false
}

enum Varint {
    Value(u64),
    CutShort,
    Overlong,
}

fn take_varint(bytes: &mut &[u8]) -> Varint {
    let data = *bytes;
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate() {
        // The tenth byte may only carry the top bit of a u64.
        if i == 9 && byte > 1 {
            return Varint::Overlong;
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            *bytes = &data[i + 1..];
            return Varint::Value(value);
        }
    }
    Varint::CutShort
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Serve one request on stdin/stdout with `generator`.
///
/// This is the whole body of a plugin binary's `main`, apart from argument
/// handling and logging setup.
pub fn plugin_main<G: CodeGenerator + ?Sized>(generator: &G) -> io::Result<()> {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    PluginDriver::new(generator).run(stdin, stdout)
}
