//! Structured output: tag trees and the serialized emission hub
//!
//! Every unit the monitor emits is a tag tree with attribute strings; the
//! renderer turns a tree into ASCII tables, an indented tree view, or XML,
//! per session configuration. The [`OutputHub`] serializes emission: one
//! lock acquisition covers one whole tree, so multi-line events never
//! interleave across callbacks, shell commands, and GC reports.

pub mod render;

pub use render::OutputFormat;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;

// =============================================================================
// TAG TREE
// =============================================================================

/// Attribute value with a type tag, so the renderer can format numerics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Int(i64),
    /// Rendered as lowercase hex, the way id attributes travel on the wire.
    Hex(u64),
    /// A microsecond figure.
    Micros(u64),
}

impl AttrValue {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            AttrValue::Text(s) => s.clone(),
            AttrValue::Int(v) => v.to_string(),
            AttrValue::Hex(v) => format!("{v:x}"),
            AttrValue::Micros(v) => v.to_string(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(v as i64)
    }
}

/// One node of an output tree: a name, ordered attributes, child tags.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    name: &'static str,
    attrs: Vec<(&'static str, AttrValue)>,
    children: Vec<Tag>,
}

impl Tag {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Tag { name, attrs: Vec::new(), children: Vec::new() }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add one attribute; insertion order is the render order.
    pub fn put(&mut self, key: &'static str, value: impl Into<AttrValue>) -> &mut Self {
        self.attrs.push((key, value.into()));
        self
    }

    /// Append an empty child and return a reference to it for filling in.
    pub fn child(&mut self, name: &'static str) -> &mut Tag {
        self.children.push(Tag::new(name));
        self.children.last_mut().unwrap()
    }

    pub fn add(&mut self, tag: Tag) {
        self.children.push(tag);
    }

    #[must_use]
    pub fn attrs(&self) -> &[(&'static str, AttrValue)] {
        &self.attrs
    }

    #[must_use]
    pub fn children(&self) -> &[Tag] {
        &self.children
    }

    /// Attribute lookup, mostly for tests.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

// =============================================================================
// OUTPUT HUB
// =============================================================================

enum Primary {
    Stdout,
    LogFile(File),
    /// Swallow everything; used by tests that only inspect returned tags.
    Null,
}

struct HubInner {
    format: OutputFormat,
    primary: Primary,
    primary_failed: bool,
    shell: Option<TcpStream>,
    shell_failed: bool,
    redirects: HashMap<PathBuf, File>,
}

/// Serialized sink for every emitted tag tree.
pub struct OutputHub {
    inner: Mutex<HubInner>,
}

impl Default for OutputHub {
    fn default() -> Self {
        Self::new(OutputFormat::Xml)
    }
}

impl OutputHub {
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        OutputHub {
            inner: Mutex::new(HubInner {
                format,
                primary: Primary::Stdout,
                primary_failed: false,
                shell: None,
                shell_failed: false,
                redirects: HashMap::new(),
            }),
        }
    }

    /// A hub that drops everything. Tests of the pure event paths use this.
    #[must_use]
    pub fn sink() -> Self {
        let hub = Self::new(OutputFormat::Tree);
        hub.inner.lock().unwrap().primary = Primary::Null;
        hub
    }

    pub fn set_format(&self, format: OutputFormat) {
        self.inner.lock().unwrap().format = format;
    }

    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.inner.lock().unwrap().format
    }

    /// Route primary output to an append-mode log file.
    pub fn set_log_file(&self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut inner = self.inner.lock().unwrap();
        inner.primary = Primary::LogFile(file);
        inner.primary_failed = false;
        Ok(())
    }

    /// Route primary output back to stdout.
    pub fn clear_log_file(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.primary = Primary::Stdout;
        inner.primary_failed = false;
    }

    /// Attach the current shell client. At most one client at a time; the
    /// caller keeps its own handle for prompts and reading.
    pub fn attach_shell(&self, stream: TcpStream) {
        let mut inner = self.inner.lock().unwrap();
        inner.shell = Some(stream);
        inner.shell_failed = false;
    }

    pub fn detach_shell(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shell = None;
        inner.shell_failed = false;
    }

    /// True once a write to the shell client failed; the shell thread tears
    /// the connection down and resumes listening.
    #[must_use]
    pub fn shell_failed(&self) -> bool {
        self.inner.lock().unwrap().shell_failed
    }

    /// Emit one tag tree to the primary sink and the shell client, if any.
    /// The whole tree is written under one lock acquisition.
    pub fn emit(&self, tag: &Tag) {
        let mut inner = self.inner.lock().unwrap();
        let text = render::render(tag, inner.format);
        inner.write_all(&text);
    }

    /// Emit to a category redirect file instead of the regular sinks.
    pub fn emit_to_file(&self, path: &Path, tag: &Tag) {
        let mut inner = self.inner.lock().unwrap();
        let text = render::render(tag, inner.format);
        if !inner.redirects.contains_key(path) {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    inner.redirects.insert(path.to_path_buf(), file);
                }
                Err(err) => {
                    warn!("cannot open trace target {}: {err}", path.display());
                    return;
                }
            }
        }
        if let Some(file) = inner.redirects.get_mut(path) {
            if let Err(err) = file.write_all(text.as_bytes()) {
                warn!("write to trace target {} failed: {err}", path.display());
                inner.redirects.remove(path);
            }
        }
    }

}

impl HubInner {
    fn write_all(&mut self, text: &str) {
        match &mut self.primary {
            Primary::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(text.as_bytes());
            }
            Primary::LogFile(file) => {
                if let Err(err) = file.write_all(text.as_bytes()) {
                    if !self.primary_failed {
                        warn!("log file write failed: {err}");
                        self.primary_failed = true;
                    }
                }
            }
            Primary::Null => {}
        }
        self.write_shell(text);
    }

    fn write_shell(&mut self, text: &str) {
        if let Some(stream) = &mut self.shell {
            if stream.write_all(text.as_bytes()).is_err() || stream.flush().is_err() {
                self.shell = None;
                self.shell_failed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_builder() {
        let mut root = Tag::new("Trace");
        root.put("Type", "Method").put("NrCalls", 3u64);
        root.child("Traces").put("Type", "Callstack");
        assert_eq!(root.name(), "Trace");
        assert_eq!(root.get("Type"), Some(&AttrValue::Text("Method".into())));
        assert_eq!(root.get("NrCalls"), Some(&AttrValue::Int(3)));
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].name(), "Traces");
    }

    #[test]
    fn test_attr_value_rendering() {
        assert_eq!(AttrValue::Hex(255).render(), "ff");
        assert_eq!(AttrValue::Int(-7).render(), "-7");
        assert_eq!(AttrValue::Micros(1500).render(), "1500");
        assert_eq!(AttrValue::Text("x".into()).render(), "x");
    }

    #[test]
    fn test_sink_hub_swallows_output() {
        let hub = OutputHub::sink();
        let mut tag = Tag::new("Trace");
        tag.put("Type", "Message");
        hub.emit(&tag);
        assert!(!hub.shell_failed());
    }
}
