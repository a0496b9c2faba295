use miette::Diagnostic;
use thiserror::Error;

/// Everything that can go wrong between reading a request and writing its
/// response.
///
/// The wire protocol carries only a free-text error string, so every variant
/// is ultimately flattened to its `Display` output in
/// `CodeGeneratorResponse.error`. The variants exist for callers embedding the
/// library (and for tests) that want to match on the failure class.
#[derive(Debug, Error, Diagnostic)]
pub enum PluginError {
    /// The request envelope could not be decoded.
    #[error("malformed request: {0}")]
    #[diagnostic(code(protoc_plugin::malformed_request))]
    MalformedRequest(String),

    /// The input channel closed before a complete request was read.
    #[error("truncated input: {0}")]
    #[diagnostic(
        code(protoc_plugin::truncated_input),
        help("the compiler closed the plugin's stdin before the request was complete")
    )]
    TruncatedInput(String),

    /// The descriptor graph is missing required data or a reference does not
    /// resolve within the set.
    #[error("malformed descriptor: {0}")]
    #[diagnostic(code(protoc_plugin::malformed_descriptor))]
    MalformedDescriptor(String),

    /// A full output file was opened twice in one invocation.
    #[error("tried to write the same file twice: {0}")]
    #[diagnostic(
        code(protoc_plugin::duplicate_file),
        help("use an insertion point to add content to a file that was already opened")
    )]
    DuplicateFile(String),

    /// The request needs a capability the backend does not advertise.
    #[error("{0}")]
    #[diagnostic(code(protoc_plugin::unsupported_feature))]
    UnsupportedFeature(String),

    /// A backend-reported semantic failure.
    #[error("{0}")]
    #[diagnostic(code(protoc_plugin::generator))]
    Generator(String),

    #[error(transparent)]
    #[diagnostic(code(protoc_plugin::io))]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Shorthand for backends reporting a semantic failure.
    pub fn generator(message: impl Into<String>) -> Self {
        PluginError::Generator(message.into())
    }
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;
