// ==============================================================================
// Descriptor Model: Frozen Arena of Schema Files and Their Declared Types
// ==============================================================================
//
// A `DescriptorSet` is built once from the wire descriptors the compiler sends
// and is read-only afterwards. Files and types live in two `IndexMap` arenas
// keyed by stable names (file name, fully-qualified type name), so lookups are
// hash lookups and iteration follows declaration order. Cross-references
// (dependencies, nested types, field types) are stored as name keys rather
// than pointers, which keeps the whole set `Send + Sync` and trivially
// shareable between worker threads.
//
// Construction runs in two passes: first every file and type is registered,
// then every name reference is checked against the arenas. The compiler front
// end already rejects import cycles, so no cycle detection happens here.

use std::collections::HashSet;

use indexmap::IndexMap;
use prost::Message as _;

use crate::error::{PluginError, Result};
use crate::generator::Features;
pub use prost_types::field_descriptor_proto::{Label as FieldLabel, Type as FieldType};

// ==============================================================================
// Model Types
// ==============================================================================

/// Source syntax of a schema file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
    /// Editions syntax; carries the raw edition number (see [`prost_types::Edition`]).
    Editions(i32),
}

impl Syntax {
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
            Syntax::Editions(_) => "editions",
        }
    }
}

/// One parsed schema file.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFile {
    pub name: String,
    /// Dotted package path; empty when the file declares no package.
    pub package: String,
    pub syntax: Syntax,
    pub dependencies: Vec<String>,
    /// Full names of the top-level types: messages, then enums, then services.
    pub types: Vec<String>,
}

/// A declared message, enum, or service.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    /// `package.Outer.Inner`, without a leading dot.
    pub full_name: String,
    pub name: String,
    /// Name of the file that declares this type.
    pub file: String,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Message(MessageDecl),
    Enum(EnumDecl),
    Service(ServiceDecl),
}

impl TypeKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Message(_) => "message",
            TypeKind::Enum(_) => "enum",
            TypeKind::Service(_) => "service",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDecl {
    pub fields: Vec<FieldDecl>,
    pub oneofs: Vec<String>,
    /// Full names of nested messages, then nested enums.
    pub nested_types: Vec<String>,
    /// Synthesized `map<K, V>` entry message.
    pub map_entry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub number: i32,
    pub label: FieldLabel,
    pub field_type: FieldType,
    /// Referenced message or enum, as a full name without the leading dot.
    pub type_name: Option<String>,
    pub oneof_index: Option<i32>,
    pub json_name: Option<String>,
    pub proto3_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumDecl {
    pub values: Vec<EnumValueDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    pub name: String,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceDecl {
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

// ==============================================================================
// DescriptorSet
// ==============================================================================

/// The dependency closure of the files a compiler asked to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSet {
    files: IndexMap<String, SchemaFile>,
    types: IndexMap<String, TypeDecl>,
    files_to_generate: Vec<String>,
}

impl DescriptorSet {
    /// Decode a serialized `FileDescriptorSet` and validate it.
    pub fn decode(bytes: &[u8], files_to_generate: &[String]) -> Result<Self> {
        let set = prost_types::FileDescriptorSet::decode(bytes)
            .map_err(|e| PluginError::MalformedDescriptor(e.to_string()))?;
        Self::from_protos(&set.file, files_to_generate)
    }

    /// Build from already-decoded wire descriptors.
    pub fn from_protos(
        protos: &[prost_types::FileDescriptorProto],
        files_to_generate: &[String],
    ) -> Result<Self> {
        let mut builder = Builder::default();
        for proto in protos {
            builder.add_file(proto)?;
        }
        let set = DescriptorSet {
            files: builder.files,
            types: builder.types,
            files_to_generate: files_to_generate.to_vec(),
        };
        set.validate()?;
        Ok(set)
    }

    /// Convert back into wire descriptors, in file order.
    pub fn to_protos(&self) -> Vec<prost_types::FileDescriptorProto> {
        self.files.values().map(|f| self.file_to_proto(f)).collect()
    }

    /// Serialize as a `FileDescriptorSet`.
    pub fn encode(&self) -> Vec<u8> {
        prost_types::FileDescriptorSet {
            file: self.to_protos(),
        }
        .encode_to_vec()
    }

    pub fn file_by_name(&self, name: &str) -> Option<&SchemaFile> {
        self.files.get(name)
    }

    /// Look up a type by its full name; a leading `.` is accepted.
    pub fn type_by_full_name(&self, full_name: &str) -> Option<&TypeDecl> {
        self.types.get(full_name.strip_prefix('.').unwrap_or(full_name))
    }

    /// All files, dependencies before dependents when the compiler sent them
    /// that way.
    pub fn files(&self) -> impl Iterator<Item = &SchemaFile> {
        self.files.values()
    }

    /// All declared types, including nested ones. Nested types precede the
    /// message that declares them.
    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    /// Names of the files explicitly requested for generation.
    pub fn files_to_generate(&self) -> &[String] {
        &self.files_to_generate
    }

    /// Whether `name` was requested, as opposed to pulled in as a dependency.
    pub fn is_requested(&self, name: &str) -> bool {
        self.files_to_generate.iter().any(|f| f == name)
    }

    /// The top-level types of `file`, resolved.
    pub fn top_level_types<'a>(
        &'a self,
        file: &'a SchemaFile,
    ) -> impl Iterator<Item = &'a TypeDecl> {
        file.types.iter().filter_map(|n| self.types.get(n))
    }

    /// The nested types of a message, resolved.
    pub fn nested_types<'a>(
        &'a self,
        message: &'a MessageDecl,
    ) -> impl Iterator<Item = &'a TypeDecl> {
        message.nested_types.iter().filter_map(|n| self.types.get(n))
    }

    /// Transitive dependencies of `name`, each listed once, dependencies
    /// before their dependents. `name` itself is not included.
    pub fn dependency_closure(&self, name: &str) -> Vec<&SchemaFile> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        if let Some(file) = self.files.get(name) {
            seen.insert(file.name.as_str());
            for dep in &file.dependencies {
                self.visit_dependency(dep, &mut seen, &mut out);
            }
        }
        out
    }

    fn visit_dependency<'a>(
        &'a self,
        name: &str,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<&'a SchemaFile>,
    ) {
        let Some(file) = self.files.get(name) else {
            return;
        };
        if !seen.insert(file.name.as_str()) {
            return;
        }
        for dep in &file.dependencies {
            self.visit_dependency(dep, seen, out);
        }
        out.push(file);
    }

    /// Feature bits a backend must advertise to handle `files`.
    pub fn required_features(&self, files: &[String]) -> Features {
        let mut required = Features::NONE;
        for file in files.iter().filter_map(|n| self.files.get(n)) {
            match file.syntax {
                Syntax::Editions(_) => required |= Features::SUPPORTS_EDITIONS,
                Syntax::Proto3 => {
                    if self.any_proto3_optional(&file.types) {
                        required |= Features::PROTO3_OPTIONAL;
                    }
                }
                Syntax::Proto2 => {}
            }
        }
        required
    }

    /// Walks `names` and the messages nested under them.
    fn any_proto3_optional(&self, names: &[String]) -> bool {
        names.iter().filter_map(|n| self.types.get(n)).any(|t| match &t.kind {
            TypeKind::Message(m) => {
                m.fields.iter().any(|f| f.proto3_optional)
                    || self.any_proto3_optional(&m.nested_types)
            }
            TypeKind::Enum(_) | TypeKind::Service(_) => false,
        })
    }

    // --------------------------------------------------------------------------
    // Referential integrity
    // --------------------------------------------------------------------------

    fn validate(&self) -> Result<()> {
        for requested in &self.files_to_generate {
            if !self.files.contains_key(requested) {
                return Err(PluginError::MalformedDescriptor(format!(
                    "protoc asked plugin to generate a file but did not provide a descriptor \
                     for the file: {requested}"
                )));
            }
        }

        for file in self.files.values() {
            for dep in &file.dependencies {
                if !self.files.contains_key(dep) {
                    return Err(PluginError::MalformedDescriptor(format!(
                        "{} depends on {dep}, which is not in the descriptor set",
                        file.name
                    )));
                }
            }
        }

        for decl in self.types.values() {
            match &decl.kind {
                TypeKind::Message(message) => {
                    for field in &message.fields {
                        if let Some(target) = &field.type_name {
                            self.check_reference(&decl.full_name, &field.name, target)?;
                        }
                    }
                }
                TypeKind::Service(service) => {
                    for method in &service.methods {
                        let owner = &decl.full_name;
                        self.check_reference(owner, &method.name, &method.input_type)?;
                        self.check_reference(owner, &method.name, &method.output_type)?;
                    }
                }
                TypeKind::Enum(_) => {}
            }
        }
        Ok(())
    }

    fn check_reference(&self, owner: &str, member: &str, target: &str) -> Result<()> {
        if self.types.contains_key(target) {
            Ok(())
        } else {
            Err(PluginError::MalformedDescriptor(format!(
                "{owner}.{member} refers to undefined type {target}"
            )))
        }
    }

    // --------------------------------------------------------------------------
    // Back to wire form
    // --------------------------------------------------------------------------

    fn file_to_proto(&self, file: &SchemaFile) -> prost_types::FileDescriptorProto {
        let mut proto = prost_types::FileDescriptorProto {
            name: Some(file.name.clone()),
            package: (!file.package.is_empty()).then(|| file.package.clone()),
            dependency: file.dependencies.clone(),
            ..Default::default()
        };
        match file.syntax {
            Syntax::Proto2 => {}
            Syntax::Proto3 => proto.syntax = Some("proto3".into()),
            Syntax::Editions(edition) => {
                proto.syntax = Some("editions".into());
                proto.edition = Some(edition);
            }
        }
        for decl in self.top_level_types(file) {
            match &decl.kind {
                TypeKind::Message(m) => {
                    proto.message_type.push(self.message_to_proto(decl, m));
                }
                TypeKind::Enum(e) => proto.enum_type.push(enum_to_proto(decl, e)),
                TypeKind::Service(s) => proto.service.push(service_to_proto(decl, s)),
            }
        }
        proto
    }

    fn message_to_proto(
        &self,
        decl: &TypeDecl,
        message: &MessageDecl,
    ) -> prost_types::DescriptorProto {
        let mut proto = prost_types::DescriptorProto {
            name: Some(decl.name.clone()),
            field: message.fields.iter().map(field_to_proto).collect(),
            oneof_decl: message
                .oneofs
                .iter()
                .map(|name| prost_types::OneofDescriptorProto {
                    name: Some(name.clone()),
                    ..Default::default()
                })
                .collect(),
            options: message.map_entry.then(|| prost_types::MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        for nested in self.nested_types(message) {
            match &nested.kind {
                TypeKind::Message(m) => {
                    proto.nested_type.push(self.message_to_proto(nested, m));
                }
                TypeKind::Enum(e) => proto.enum_type.push(enum_to_proto(nested, e)),
                TypeKind::Service(_) => {}
            }
        }
        proto
    }
}

fn field_to_proto(field: &FieldDecl) -> prost_types::FieldDescriptorProto {
    prost_types::FieldDescriptorProto {
        name: Some(field.name.clone()),
        number: Some(field.number),
        label: Some(field.label as i32),
        r#type: Some(field.field_type as i32),
        type_name: field.type_name.as_ref().map(|n| format!(".{n}")),
        oneof_index: field.oneof_index,
        json_name: field.json_name.clone(),
        proto3_optional: field.proto3_optional.then_some(true),
        ..Default::default()
    }
}

fn enum_to_proto(decl: &TypeDecl, e: &EnumDecl) -> prost_types::EnumDescriptorProto {
    prost_types::EnumDescriptorProto {
        name: Some(decl.name.clone()),
        value: e
            .values
            .iter()
            .map(|v| prost_types::EnumValueDescriptorProto {
                name: Some(v.name.clone()),
                number: Some(v.number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn service_to_proto(decl: &TypeDecl, s: &ServiceDecl) -> prost_types::ServiceDescriptorProto {
    prost_types::ServiceDescriptorProto {
        name: Some(decl.name.clone()),
        method: s
            .methods
            .iter()
            .map(|m| prost_types::MethodDescriptorProto {
                name: Some(m.name.clone()),
                input_type: Some(format!(".{}", m.input_type)),
                output_type: Some(format!(".{}", m.output_type)),
                client_streaming: m.client_streaming.then_some(true),
                server_streaming: m.server_streaming.then_some(true),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

// ==============================================================================
// Builder: First Pass Over Wire Descriptors
// ==============================================================================

#[derive(Default)]
struct Builder {
    files: IndexMap<String, SchemaFile>,
    types: IndexMap<String, TypeDecl>,
}

impl Builder {
    fn add_file(&mut self, proto: &prost_types::FileDescriptorProto) -> Result<()> {
        let name = required(proto.name.as_deref(), || {
            "file descriptor without a name".to_string()
        })?;
        if self.files.contains_key(name) {
            return Err(PluginError::MalformedDescriptor(format!(
                "duplicate file in descriptor set: {name}"
            )));
        }
        let package = proto.package.clone().unwrap_or_default();
        let syntax = parse_syntax(name, proto)?;

        let mut types = Vec::new();
        for message in &proto.message_type {
            types.push(self.add_message(name, &package, message)?);
        }
        for e in &proto.enum_type {
            types.push(self.add_enum(name, &package, e)?);
        }
        for service in &proto.service {
            types.push(self.add_service(name, &package, service)?);
        }

        self.files.insert(
            name.to_string(),
            SchemaFile {
                name: name.to_string(),
                package,
                syntax,
                dependencies: proto.dependency.clone(),
                types,
            },
        );
        Ok(())
    }

    fn add_message(
        &mut self,
        file: &str,
        scope: &str,
        proto: &prost_types::DescriptorProto,
    ) -> Result<String> {
        let name =
            required(proto.name.as_deref(), || format!("message without a name in {file}"))?;
        let full_name = qualify(scope, name);

        let mut fields = Vec::with_capacity(proto.field.len());
        for field in &proto.field {
            fields.push(convert_field(&full_name, field)?);
        }

        let mut nested_types = Vec::new();
        for nested in &proto.nested_type {
            nested_types.push(self.add_message(file, &full_name, nested)?);
        }
        for nested in &proto.enum_type {
            nested_types.push(self.add_enum(file, &full_name, nested)?);
        }

        let oneofs = proto
            .oneof_decl
            .iter()
            .map(|o| {
                required(o.name.as_deref(), || format!("oneof without a name in {full_name}"))
                    .map(str::to_string)
            })
            .collect::<Result<Vec<_>>>()?;

        let message = MessageDecl {
            fields,
            oneofs,
            nested_types,
            map_entry: proto
                .options
                .as_ref()
                .and_then(|o| o.map_entry)
                .unwrap_or(false),
        };
        self.insert(file, name, full_name, TypeKind::Message(message))
    }

    fn add_enum(
        &mut self,
        file: &str,
        scope: &str,
        proto: &prost_types::EnumDescriptorProto,
    ) -> Result<String> {
        let name = required(proto.name.as_deref(), || format!("enum without a name in {file}"))?;
        let full_name = qualify(scope, name);
        let values = proto
            .value
            .iter()
            .map(|v| {
                let value_name = required(v.name.as_deref(), || {
                    format!("enum value without a name in {full_name}")
                })?;
                let number = v.number.ok_or_else(|| {
                    PluginError::MalformedDescriptor(format!(
                        "enum value {full_name}.{value_name} has no number"
                    ))
                })?;
                Ok(EnumValueDecl {
                    name: value_name.to_string(),
                    number,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.insert(file, name, full_name, TypeKind::Enum(EnumDecl { values }))
    }

    fn add_service(
        &mut self,
        file: &str,
        scope: &str,
        proto: &prost_types::ServiceDescriptorProto,
    ) -> Result<String> {
        let name =
            required(proto.name.as_deref(), || format!("service without a name in {file}"))?;
        let full_name = qualify(scope, name);
        let methods = proto
            .method
            .iter()
            .map(|m| {
                let method = required(m.name.as_deref(), || {
                    format!("method without a name in {full_name}")
                })?;
                let input = required(m.input_type.as_deref(), || {
                    format!("method {full_name}.{method} has no input type")
                })?;
                let output = required(m.output_type.as_deref(), || {
                    format!("method {full_name}.{method} has no output type")
                })?;
                Ok(MethodDecl {
                    name: method.to_string(),
                    input_type: strip_leading_dot(input),
                    output_type: strip_leading_dot(output),
                    client_streaming: m.client_streaming.unwrap_or(false),
                    server_streaming: m.server_streaming.unwrap_or(false),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.insert(file, name, full_name, TypeKind::Service(ServiceDecl { methods }))
    }

    fn insert(
        &mut self,
        file: &str,
        name: &str,
        full_name: String,
        kind: TypeKind,
    ) -> Result<String> {
        if self.types.contains_key(&full_name) {
            return Err(PluginError::MalformedDescriptor(format!(
                "{full_name} is declared more than once"
            )));
        }
        self.types.insert(
            full_name.clone(),
            TypeDecl {
                full_name: full_name.clone(),
                name: name.to_string(),
                file: file.to_string(),
                kind,
            },
        );
        Ok(full_name)
    }
}

fn convert_field(owner: &str, proto: &prost_types::FieldDescriptorProto) -> Result<FieldDecl> {
    let name = required(proto.name.as_deref(), || format!("field without a name in {owner}"))?;
    let malformed =
        |what: &str| PluginError::MalformedDescriptor(format!("field {owner}.{name} {what}"));

    let number = proto.number.ok_or_else(|| malformed("has no number"))?;
    let field_type = proto.r#type.ok_or_else(|| malformed("has no type")).and_then(|t| {
        FieldType::try_from(t).map_err(|_| malformed(&format!("has unknown type {t}")))
    })?;
    let label = match proto.label {
        None => FieldLabel::Optional,
        Some(l) => {
            FieldLabel::try_from(l).map_err(|_| malformed(&format!("has unknown label {l}")))?
        }
    };

    let type_name = proto.type_name.as_deref().map(strip_leading_dot);
    let needs_reference =
        matches!(field_type, FieldType::Message | FieldType::Enum | FieldType::Group);
    if needs_reference && type_name.is_none() {
        return Err(malformed("has a message or enum type but no type name"));
    }

    Ok(FieldDecl {
        name: name.to_string(),
        number,
        label,
        field_type,
        type_name,
        oneof_index: proto.oneof_index,
        json_name: proto.json_name.clone(),
        proto3_optional: proto.proto3_optional.unwrap_or(false),
    })
}

fn parse_syntax(file: &str, proto: &prost_types::FileDescriptorProto) -> Result<Syntax> {
    match proto.syntax.as_deref() {
        None | Some("") | Some("proto2") => Ok(Syntax::Proto2),
        Some("proto3") => Ok(Syntax::Proto3),
        Some("editions") => {
            let edition = proto.edition.ok_or_else(|| {
                PluginError::MalformedDescriptor(format!(
                    "{file} uses editions syntax but has no edition"
                ))
            })?;
            Ok(Syntax::Editions(edition))
        }
        Some(other) => Err(PluginError::MalformedDescriptor(format!(
            "{file} has unrecognized syntax \"{other}\""
        ))),
    }
}

fn required(value: Option<&str>, what: impl FnOnce() -> String) -> Result<&str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PluginError::MalformedDescriptor(what())),
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn strip_leading_dot(name: &str) -> String {
    name.strip_prefix('.').unwrap_or(name).to_string()
}
