// ==============================================================================
// Outline Backend: A Reference `CodeGenerator`
// ==============================================================================
//
// Emits, for every requested `.proto` file, a plain outline of the types it
// declares. It exists to exercise the full plugin contract end to end (options
// parsing, full files, insertion points, feature advertisement) without
// committing to any real target language.
//
// Options (comma-separated, see `parse_generator_parameter`):
//
//   suffix=EXT        output extension, default `out` (`a.proto` -> `a.out`)
//   markers           emit `@@protoc_insertion_point` markers for later passes
//   insert_into=TAG   write into marker TAG of the output file instead of
//                     creating it (for a second pass)
//   format=text|json  output format, default `text`
//   fields            list message fields under each message
//
// Unknown options are rejected with an error naming the option, so a typo in a
// build configuration never silently changes the output.

use serde_json::{Value, json};

use crate::context::GeneratorContext;
use crate::descriptor::{
    DescriptorSet, FieldDecl, FieldLabel, FieldType, SchemaFile, TypeDecl, TypeKind,
};
use crate::error::{PluginError, Result};
use crate::generator::{CodeGenerator, Features, parse_generator_parameter};

// ==============================================================================
// Options
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Parsed parameter string of the outline backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineOptions {
    pub suffix: String,
    pub markers: bool,
    pub insert_into: Option<String>,
    pub format: Format,
    pub fields: bool,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        OutlineOptions {
            suffix: "out".to_string(),
            markers: false,
            insert_into: None,
            format: Format::Text,
            fields: false,
        }
    }
}

impl OutlineOptions {
    pub fn parse(parameter: &str) -> Result<Self> {
        let mut options = OutlineOptions::default();
        for (key, value) in parse_generator_parameter(parameter) {
            match key.as_str() {
                "suffix" => {
                    if value.is_empty() || value.contains('/') {
                        return Err(PluginError::generator(format!(
                            "invalid value for suffix: \"{value}\""
                        )));
                    }
                    options.suffix = value;
                }
                "markers" => options.markers = parse_flag(&key, &value)?,
                "fields" => options.fields = parse_flag(&key, &value)?,
                "insert_into" => {
                    if value.is_empty() {
                        return Err(PluginError::generator(
                            "insert_into requires an insertion point name",
                        ));
                    }
                    options.insert_into = Some(value);
                }
                "format" => {
                    options.format = match value.as_str() {
                        "text" => Format::Text,
                        "json" => Format::Json,
                        other => {
                            return Err(PluginError::generator(format!(
                                "unknown format \"{other}\" (expected text or json)"
                            )));
                        }
                    }
                }
                _ => return Err(PluginError::generator(format!("unknown option: {key}"))),
            }
        }
        if options.markers && options.format == Format::Json {
            return Err(PluginError::generator("markers cannot be used with format=json"));
        }
        Ok(options)
    }

    /// Output name for a schema file: its extension swapped for the suffix.
    pub fn output_name(&self, file: &str) -> String {
        let stem = file.strip_suffix(".proto").unwrap_or(file);
        format!("{stem}.{}", self.suffix)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "" | "true" => Ok(true),
        "false" => Ok(false),
        other => Err(PluginError::generator(format!(
            "invalid value for {key}: \"{other}\" (expected true or false)"
        ))),
    }
}

// ==============================================================================
// Generator
// ==============================================================================

/// The outline backend. Stateless; all configuration comes from the
/// parameter string.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineGenerator;

impl CodeGenerator for OutlineGenerator {
    fn supported_features(&self) -> Features {
        Features::PROTO3_OPTIONAL
    }

    fn generate(
        &self,
        descriptors: &DescriptorSet,
        files_to_generate: &[String],
        parameter: &str,
        context: &mut GeneratorContext,
    ) -> Result<()> {
        // Validate options once, before anything is written.
        let options = OutlineOptions::parse(parameter)?;
        for name in files_to_generate {
            let file = descriptors.file_by_name(name).ok_or_else(|| {
                PluginError::MalformedDescriptor(format!("no descriptor for requested file {name}"))
            })?;
            emit(&options, file, descriptors, context)?;
        }
        Ok(())
    }

    fn generate_file(
        &self,
        file: &SchemaFile,
        descriptors: &DescriptorSet,
        parameter: &str,
        context: &mut GeneratorContext,
    ) -> Result<()> {
        let options = OutlineOptions::parse(parameter)?;
        emit(&options, file, descriptors, context)
    }
}

fn emit(
    options: &OutlineOptions,
    file: &SchemaFile,
    descriptors: &DescriptorSet,
    context: &mut GeneratorContext,
) -> Result<()> {
    let content = match options.format {
        Format::Text => render_text(options, file, descriptors),
        Format::Json => render_json(options, file, descriptors)?,
    };

    let output = options.output_name(&file.name);
    let mut handle = match &options.insert_into {
        Some(tag) => context.open_insertion(&output, tag)?,
        None => context.open_full(&output)?,
    };
    handle.push_str(&content);
    Ok(())
}

// ==============================================================================
// Text Rendering
// ==============================================================================

/// Render the text outline for one file.
pub fn render_text(
    options: &OutlineOptions,
    file: &SchemaFile,
    descriptors: &DescriptorSet,
) -> String {
    let mut out = String::new();
    for decl in descriptors.top_level_types(file) {
        render_decl(&mut out, options, file, descriptors, decl);
    }
    if options.markers {
        marker(&mut out, "module_scope");
    }
    out
}

fn render_decl(
    out: &mut String,
    options: &OutlineOptions,
    file: &SchemaFile,
    descriptors: &DescriptorSet,
    decl: &TypeDecl,
) {
    push_line(
        out,
        &format!(
            "<generated for {} {} in package {}>",
            decl.kind.keyword(),
            relative_name(file, decl),
            package_label(file)
        ),
    );

    match &decl.kind {
        TypeKind::Message(message) => {
            if options.fields {
                for field in &message.fields {
                    push_line(out, &format!("  {}", describe_field(field)));
                }
            }
            if options.markers {
                marker(out, &format!("message_scope:{}", decl.full_name));
            }
            for nested in descriptors.nested_types(message) {
                if let TypeKind::Message(m) = &nested.kind
                    && m.map_entry
                {
                    continue;
                }
                render_decl(out, options, file, descriptors, nested);
            }
        }
        TypeKind::Enum(e) => {
            if options.fields {
                for value in &e.values {
                    push_line(out, &format!("  {} = {}", value.name, value.number));
                }
            }
        }
        TypeKind::Service(s) => {
            if options.fields {
                for m in &s.methods {
                    let stream = |on: bool| if on { "stream " } else { "" };
                    push_line(
                        out,
                        &format!(
                            "  rpc {}({}{}) returns ({}{})",
                            m.name,
                            stream(m.client_streaming),
                            m.input_type,
                            stream(m.server_streaming),
                            m.output_type
                        ),
                    );
                }
            }
        }
    }
}

fn marker(out: &mut String, tag: &str) {
    push_line(out, &format!("// @@protoc_insertion_point({tag})"));
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Type name relative to the file's package (`Outer.Inner`).
fn relative_name<'a>(file: &SchemaFile, decl: &'a TypeDecl) -> &'a str {
    if file.package.is_empty() {
        return &decl.full_name;
    }
    decl.full_name
        .strip_prefix(&file.package)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(&decl.full_name)
}

fn package_label(file: &SchemaFile) -> &str {
    if file.package.is_empty() { "<root>" } else { &file.package }
}

fn describe_field(field: &FieldDecl) -> String {
    let label = match field.label {
        FieldLabel::Repeated => "repeated ",
        FieldLabel::Required => "required ",
        FieldLabel::Optional if field.proto3_optional => "optional ",
        FieldLabel::Optional => "",
    };
    format!("{label}{} {} = {}", field_type_name(field), field.name, field.number)
}

fn field_type_name(field: &FieldDecl) -> String {
    if let Some(name) = &field.type_name {
        return name.clone();
    }
    match field.field_type {
        FieldType::Double => "double",
        FieldType::Float => "float",
        FieldType::Int64 => "int64",
        FieldType::Uint64 => "uint64",
        FieldType::Int32 => "int32",
        FieldType::Fixed64 => "fixed64",
        FieldType::Fixed32 => "fixed32",
        FieldType::Bool => "bool",
        FieldType::String => "string",
        FieldType::Group => "group",
        FieldType::Message => "message",
        FieldType::Bytes => "bytes",
        FieldType::Uint32 => "uint32",
        FieldType::Enum => "enum",
        FieldType::Sfixed32 => "sfixed32",
        FieldType::Sfixed64 => "sfixed64",
        FieldType::Sint32 => "sint32",
        FieldType::Sint64 => "sint64",
    }
    .to_string()
}

// ==============================================================================
// JSON Rendering
// ==============================================================================

/// Render the JSON outline for one file.
pub fn render_json(
    options: &OutlineOptions,
    file: &SchemaFile,
    descriptors: &DescriptorSet,
) -> Result<String> {
    let types: Vec<Value> = descriptors
        .top_level_types(file)
        .map(|decl| decl_to_json(options, descriptors, decl))
        .collect();
    let dependencies: Vec<&str> = descriptors
        .dependency_closure(&file.name)
        .into_iter()
        .map(|f| f.name.as_str())
        .collect();
    let value = json!({
        "file": file.name,
        "package": file.package,
        "syntax": file.syntax.as_str(),
        "dependencies": dependencies,
        "types": types,
    });
    let mut text = serde_json::to_string_pretty(&value).map_err(|e| {
        PluginError::generator(format!("serialize outline for {}: {e}", file.name))
    })?;
    text.push('\n');
    Ok(text)
}

fn decl_to_json(options: &OutlineOptions, descriptors: &DescriptorSet, decl: &TypeDecl) -> Value {
    let mut value = json!({
        "kind": decl.kind.keyword(),
        "name": decl.full_name,
    });
    match &decl.kind {
        TypeKind::Message(message) => {
            if options.fields {
                value["fields"] = message
                    .fields
                    .iter()
                    .map(|f| Value::String(describe_field(f)))
                    .collect();
            }
            let nested: Vec<Value> = descriptors
                .nested_types(message)
                .filter(|n| !matches!(&n.kind, TypeKind::Message(m) if m.map_entry))
                .map(|n| decl_to_json(options, descriptors, n))
                .collect();
            if !nested.is_empty() {
                value["nested"] = Value::Array(nested);
            }
        }
        TypeKind::Enum(e) => {
            if options.fields {
                value["values"] = e
                    .values
                    .iter()
                    .map(|v| json!({ "name": v.name, "number": v.number }))
                    .collect();
            }
        }
        TypeKind::Service(s) => {
            if options.fields {
                value["methods"] = s
                    .methods
                    .iter()
                    .map(|m| {
                        json!({ "name": m.name, "input": m.input_type, "output": m.output_type })
                    })
                    .collect();
            }
        }
    }
    value
}
