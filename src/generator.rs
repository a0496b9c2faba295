// ==============================================================================
// Generator Contract: What Every Backend Implements
// ==============================================================================
//
// A backend is one type implementing `CodeGenerator`. Which backend runs is
// decided by which plugin binary the compiler spawns, so there is no runtime
// registry here; the driver is generic over the trait.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use prost_types::Edition;
use prost_types::compiler::code_generator_response::Feature;

use crate::context::GeneratorContext;
use crate::descriptor::{DescriptorSet, SchemaFile};
use crate::error::{PluginError, Result};

// ==============================================================================
// Feature Bitmask
// ==============================================================================

/// Optional protocol capabilities a backend advertises in every response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Features(u64);

impl Features {
    pub const NONE: Features = Features(Feature::None as u64);
    /// Understands `optional` on proto3 fields (synthetic oneofs).
    pub const PROTO3_OPTIONAL: Features = Features(Feature::Proto3Optional as u64);
    /// Understands editions syntax.
    pub const SUPPORTS_EDITIONS: Features = Features(Feature::SupportsEditions as u64);

    const NAMED: [(Features, &'static str); 2] = [
        (Features::PROTO3_OPTIONAL, "proto3 optional"),
        (Features::SUPPORTS_EDITIONS, "editions"),
    ];

    pub const fn from_bits(bits: u64) -> Self {
        Features(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits set in `self` but not in `other`.
    #[must_use]
    pub const fn difference(self, other: Features) -> Features {
        Features(self.0 & !other.0)
    }

    /// Human-readable names of the set bits; unknown bits are shown as hex.
    pub fn names(self) -> Vec<String> {
        let mut rest = self.0;
        let mut out = Vec::new();
        for (flag, name) in Self::NAMED {
            if self.contains(flag) && !flag.is_empty() {
                out.push(name.to_string());
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            out.push(format!("{rest:#x}"));
        }
        out
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl BitOrAssign for Features {
    fn bitor_assign(&mut self, rhs: Features) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Features(NONE)");
        }
        write!(f, "Features({})", self.names().join(" | "))
    }
}

// ==============================================================================
// CodeGenerator
// ==============================================================================

/// The capability every target-language backend provides.
///
/// Output must depend only on the descriptors, the requested file list and the
/// parameter string: build systems cache generated code by input hash, so two
/// runs over the same inputs have to produce byte-identical files.
///
/// Parameter parsing belongs to the backend. Each backend documents whether an
/// unrecognized option is rejected or ignored.
pub trait CodeGenerator {
    /// Capabilities advertised to the compiler. Requests that need a bit not
    /// set here are refused before [`generate`](Self::generate) runs.
    fn supported_features(&self) -> Features {
        Features::NONE
    }

    /// Oldest edition this backend accepts. Only consulted when
    /// [`Features::SUPPORTS_EDITIONS`] is advertised.
    fn minimum_edition(&self) -> Option<Edition> {
        None
    }

    /// Newest edition this backend accepts. Only consulted when
    /// [`Features::SUPPORTS_EDITIONS`] is advertised.
    fn maximum_edition(&self) -> Option<Edition> {
        None
    }

    /// Generate output for a single requested file.
    fn generate_file(
        &self,
        file: &SchemaFile,
        descriptors: &DescriptorSet,
        parameter: &str,
        context: &mut GeneratorContext,
    ) -> Result<()>;

    /// Generate output for every requested file, in request order.
    ///
    /// Called exactly once per plugin invocation. Override this instead of
    /// [`generate_file`](Self::generate_file) when output spans several input
    /// files.
    fn generate(
        &self,
        descriptors: &DescriptorSet,
        files_to_generate: &[String],
        parameter: &str,
        context: &mut GeneratorContext,
    ) -> Result<()> {
        for name in files_to_generate {
            let file = descriptors.file_by_name(name).ok_or_else(|| {
                PluginError::MalformedDescriptor(format!("no descriptor for requested file {name}"))
            })?;
            self.generate_file(file, descriptors, parameter, context)?;
        }
        Ok(())
    }
}

// ==============================================================================
// Parameter Helper
// ==============================================================================

/// Split a conventional `key=value,flag,key2=value2` parameter string.
///
/// A segment without `=` yields an empty value. Empty segments are skipped, so
/// trailing commas are harmless. Only the first `=` separates key from value.
pub fn parse_generator_parameter(parameter: &str) -> Vec<(String, String)> {
    parameter
        .split(',')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (segment.to_string(), String::new()),
        })
        .collect()
}
