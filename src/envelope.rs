// ==============================================================================
// Request/Response Envelope
// ==============================================================================
//
// Conversion between the `plugin.proto` wire messages and the plugin's own
// model. Decoding is lenient where the protocol asks for it: unknown fields are
// skipped by prost, a missing parameter is the empty string, and a missing
// compiler version means "no constraint". It is strict where generation would
// otherwise run on bad data: the descriptor set must validate.

use prost::Message as _;
use prost_types::compiler::{
    CodeGeneratorRequest, CodeGeneratorResponse, Version, code_generator_response,
};

use crate::context::OutputFile;
use crate::descriptor::DescriptorSet;
use crate::error::{PluginError, Result};
use crate::generator::Features;

// ==============================================================================
// Request
// ==============================================================================

/// Version of the compiler front end that produced a request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompilerVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    /// Pre-release suffix (`"rc1"`), empty for final releases.
    pub suffix: String,
}

impl std::fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.suffix.is_empty() {
            write!(f, "-{}", self.suffix)?;
        }
        Ok(())
    }
}

/// One decoded plugin request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub files_to_generate: Vec<String>,
    /// Opaque to the envelope; the backend interprets it.
    pub parameter: String,
    pub descriptors: DescriptorSet,
    pub compiler_version: Option<CompilerVersion>,
}

/// Decode a serialized `CodeGeneratorRequest`.
pub fn decode_request(bytes: &[u8]) -> Result<GenerationRequest> {
    let raw = CodeGeneratorRequest::decode(bytes)
        .map_err(|e| PluginError::MalformedRequest(e.to_string()))?;
    GenerationRequest::try_from(raw)
}

/// Serialize a request the way a compiler front end would.
pub fn encode_request(request: &GenerationRequest) -> Vec<u8> {
    CodeGeneratorRequest::from(request).encode_to_vec()
}

impl TryFrom<CodeGeneratorRequest> for GenerationRequest {
    type Error = PluginError;

    fn try_from(raw: CodeGeneratorRequest) -> Result<Self> {
        let descriptors = DescriptorSet::from_protos(&raw.proto_file, &raw.file_to_generate)?;
        Ok(GenerationRequest {
            files_to_generate: raw.file_to_generate,
            parameter: raw.parameter.unwrap_or_default(),
            descriptors,
            compiler_version: raw.compiler_version.map(|v| CompilerVersion {
                major: v.major.unwrap_or(0),
                minor: v.minor.unwrap_or(0),
                patch: v.patch.unwrap_or(0),
                suffix: v.suffix.unwrap_or_default(),
            }),
        })
    }
}

impl From<&GenerationRequest> for CodeGeneratorRequest {
    fn from(request: &GenerationRequest) -> Self {
        CodeGeneratorRequest {
            file_to_generate: request.files_to_generate.clone(),
            parameter: (!request.parameter.is_empty()).then(|| request.parameter.clone()),
            compiler_version: request.compiler_version.as_ref().map(|v| Version {
                major: Some(v.major),
                minor: Some(v.minor),
                patch: Some(v.patch),
                suffix: Some(v.suffix.clone()),
            }),
            proto_file: request.descriptors.to_protos(),
            ..Default::default()
        }
    }
}

// ==============================================================================
// Response
// ==============================================================================

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Vec<OutputFile>),
    /// A human-readable message. No files accompany a failure.
    Failure(String),
}

/// One plugin response. Feature bits are advertised on success and failure
/// alike.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub supported_features: Features,
    /// Inclusive `(minimum, maximum)` edition range, sent when the backend
    /// supports editions.
    pub edition_range: Option<(i32, i32)>,
    pub outcome: Outcome,
}

impl GenerationResponse {
    pub fn success(supported_features: Features, files: Vec<OutputFile>) -> Self {
        GenerationResponse {
            supported_features,
            edition_range: None,
            outcome: Outcome::Success(files),
        }
    }

    pub fn failure(supported_features: Features, error: impl Into<String>) -> Self {
        GenerationResponse {
            supported_features,
            edition_range: None,
            outcome: Outcome::Failure(error.into()),
        }
    }

    /// Files of a successful response; empty for a failure.
    pub fn files(&self) -> &[OutputFile] {
        match &self.outcome {
            Outcome::Success(files) => files,
            Outcome::Failure(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(message) => Some(message),
        }
    }
}

/// Serialize a response for the compiler.
pub fn encode_response(response: &GenerationResponse) -> Vec<u8> {
    let mut raw = CodeGeneratorResponse {
        supported_features: Some(response.supported_features.bits()),
        ..Default::default()
    };
    if let Some((min, max)) = response.edition_range {
        raw.minimum_edition = Some(min);
        raw.maximum_edition = Some(max);
    }
    match &response.outcome {
        Outcome::Success(files) => {
            raw.file = files
                .iter()
                .map(|f| code_generator_response::File {
                    name: Some(f.name.clone()),
                    insertion_point: f.insertion_point.clone(),
                    content: Some(f.content.clone()),
                    ..Default::default()
                })
                .collect();
        }
        Outcome::Failure(message) => raw.error = Some(message.clone()),
    }
    raw.encode_to_vec()
}

/// Decode a response as the compiler would. A non-empty `error` makes the
/// response a failure, and any files sent alongside it are dropped.
pub fn decode_response(bytes: &[u8]) -> Result<GenerationResponse> {
    let raw = CodeGeneratorResponse::decode(bytes)
        .map_err(|e| PluginError::MalformedRequest(format!("response: {e}")))?;
    let supported_features = Features::from_bits(raw.supported_features.unwrap_or(0));
    let edition_range = raw.minimum_edition.zip(raw.maximum_edition);

    let outcome = match raw.error {
        Some(message) if !message.is_empty() => Outcome::Failure(message),
        _ => {
            let files = raw
                .file
                .into_iter()
                .map(|f| {
                    let name = f.name.unwrap_or_default();
                    OutputFile {
                        name,
                        insertion_point: f.insertion_point.filter(|p| !p.is_empty()),
                        content: f.content.unwrap_or_default(),
                    }
                })
                .collect();
            Outcome::Success(files)
        }
    };

    Ok(GenerationResponse {
        supported_features,
        edition_range,
        outcome,
    })
}
