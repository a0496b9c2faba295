// ==============================================================================
// Generator Context: Recording Output Files in Emission Order
// ==============================================================================
//
// Backends never touch the filesystem. They open named outputs on the context
// and write text into them; the driver turns the recorded files into the
// response. Two kinds of output exist:
//
//   - full files, which create or replace a file on disk, and
//   - insertions, which the compiler splices into an
//     `@@protoc_insertion_point(TAG)` marker of a file produced by this or an
//     earlier plugin pass.
//
// The context does not merge insertions into their targets. It records each
// `(name, tag, content)` triple in the order its handle was first opened, and
// the compiler performs the splice when it writes files to disk.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::envelope::CompilerVersion;
use crate::error::{PluginError, Result};

/// One entry of the response's file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    /// `None` for a full file; the marker tag for an insertion.
    pub insertion_point: Option<String>,
    pub content: String,
}

impl OutputFile {
    pub fn is_insertion(&self) -> bool {
        self.insertion_point.is_some()
    }
}

/// Collects everything a backend emits during one invocation.
///
/// Taking `&mut self` for every write makes the context the single ordering
/// point for output: a backend that renders files on several threads hands
/// the finished text back and writes it here in a fixed order.
#[derive(Debug, Default)]
pub struct GeneratorContext {
    parsed_files: Vec<String>,
    compiler_version: Option<CompilerVersion>,
    files: Vec<OutputFile>,
    full_files: HashSet<String>,
    insertions: HashMap<(String, String), usize>,
}

impl GeneratorContext {
    pub fn new(parsed_files: Vec<String>, compiler_version: Option<CompilerVersion>) -> Self {
        GeneratorContext {
            parsed_files,
            compiler_version,
            ..Default::default()
        }
    }

    /// The files the compiler asked to generate, in request order.
    pub fn parsed_files(&self) -> &[String] {
        &self.parsed_files
    }

    /// Version of the compiler that sent the request, if it said.
    pub fn compiler_version(&self) -> Option<&CompilerVersion> {
        self.compiler_version.as_ref()
    }

    /// Open a full output file. Each name may be opened this way once per
    /// invocation.
    pub fn open_full(&mut self, name: &str) -> Result<WriteHandle<'_>> {
        check_name(name)?;
        if !self.full_files.insert(name.to_string()) {
            return Err(PluginError::DuplicateFile(name.to_string()));
        }
        let index = self.files.len();
        self.files.push(OutputFile {
            name: name.to_string(),
            insertion_point: None,
            content: String::new(),
        });
        Ok(WriteHandle {
            file: &mut self.files[index],
        })
    }

    /// Open an insertion into marker `tag` of file `name`.
    ///
    /// The target does not have to exist in this invocation; it may come from
    /// an earlier plugin pass. Reopening the same `(name, tag)` continues the
    /// earlier entry, so content is concatenated in the order written.
    pub fn open_insertion(&mut self, name: &str, tag: &str) -> Result<WriteHandle<'_>> {
        check_name(name)?;
        if tag.is_empty() {
            return Err(PluginError::generator(format!(
                "empty insertion point requested for {name}"
            )));
        }
        let key = (name.to_string(), tag.to_string());
        let index = match self.insertions.get(&key) {
            Some(&index) => index,
            None => {
                self.files.push(OutputFile {
                    name: name.to_string(),
                    insertion_point: Some(tag.to_string()),
                    content: String::new(),
                });
                let index = self.files.len() - 1;
                self.insertions.insert(key, index);
                index
            }
        };
        Ok(WriteHandle {
            file: &mut self.files[index],
        })
    }

    /// Number of outputs opened so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Consume the context, yielding outputs in the order they were first
    /// opened.
    pub fn finish(self) -> Vec<OutputFile> {
        self.files
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PluginError::generator("output file name must not be empty"));
    }
    Ok(())
}

/// Write access to one recorded output.
pub struct WriteHandle<'a> {
    file: &'a mut OutputFile,
}

impl WriteHandle<'_> {
    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn push_str(&mut self, text: &str) {
        self.file.content.push_str(text);
    }

    /// Append `line` followed by `\n`.
    pub fn line(&mut self, line: &str) {
        self.file.content.push_str(line);
        self.file.content.push('\n');
    }
}

impl fmt::Write for WriteHandle<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use super::*;
    use pretty_assertions::assert_eq;

    fn full(name: &str, content: &str) -> OutputFile {
        OutputFile {
            name: name.into(),
            insertion_point: None,
            content: content.into(),
        }
    }

    fn insertion(name: &str, tag: &str, content: &str) -> OutputFile {
        OutputFile {
            name: name.into(),
            insertion_point: Some(tag.into()),
            content: content.into(),
        }
    }

    #[test]
    fn test_duplicate_full_file_fails() {
        let mut ctx = GeneratorContext::default();
        ctx.open_full("a.out").expect("first open succeeds");
        let err = ctx.open_full("a.out").err().expect("second open fails");
        assert!(matches!(err, PluginError::DuplicateFile(ref n) if n == "a.out"));
    }

    #[test]
    fn test_full_file_and_insertions_coexist() {
        let mut ctx = GeneratorContext::default();
        ctx.open_full("a.out").expect("full").push_str("body");
        for _ in 0..3 {
            ctx.open_insertion("a.out", "includes").expect("insertion");
        }
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_insertions_concatenate_in_order() {
        let mut ctx = GeneratorContext::default();
        ctx.open_insertion("a.out", "includes").expect("insertion").push_str("X");
        ctx.open_insertion("a.out", "includes").expect("insertion").push_str("Y");
        assert_eq!(ctx.finish(), vec![insertion("a.out", "includes", "XY")]);
    }

    #[test]
    fn test_finish_preserves_first_open_order() {
        let mut ctx = GeneratorContext::default();
        ctx.open_insertion("z.out", "top").expect("insertion").line("1");
        ctx.open_full("b.out").expect("full").line("b");
        ctx.open_full("a.out").expect("full").line("a");
        ctx.open_insertion("z.out", "top").expect("insertion").line("2");
        ctx.open_insertion("a.out", "end").expect("insertion").line("e");

        assert_eq!(
            ctx.finish(),
            vec![
                insertion("z.out", "top", "1\n2\n"),
                full("b.out", "b\n"),
                full("a.out", "a\n"),
                insertion("a.out", "end", "e\n"),
            ]
        );
    }

    #[test]
    fn test_fmt_write() {
        let mut ctx = GeneratorContext::default();
        {
            let mut out = ctx.open_full("a.out").expect("full");
            write!(out, "{}-{}", 1, 2).expect("write to String is infallible");
            assert_eq!(out.name(), "a.out");
        }
        assert_eq!(ctx.finish(), vec![full("a.out", "1-2")]);
    }

    #[test]
    fn test_empty_names_rejected() {
        let mut ctx = GeneratorContext::default();
        assert!(ctx.open_full("").is_err());
        assert!(ctx.open_insertion("a.out", "").is_err());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_exposes_request_metadata() {
        let version = CompilerVersion {
            major: 27,
            minor: 1,
            patch: 0,
            suffix: String::new(),
        };
        let ctx = GeneratorContext::new(vec!["a.proto".into()], Some(version.clone()));
        assert_eq!(ctx.parsed_files(), ["a.proto".to_string()]);
        assert_eq!(ctx.compiler_version(), Some(&version));
    }
}
