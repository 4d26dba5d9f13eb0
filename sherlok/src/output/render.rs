//! Tag tree renderers: ASCII tables, indented tree view, XML
//!
//! The core emits tag trees; these functions turn one tree into the text a
//! session sees. The format is fixed per session before the first event.

use std::fmt::Write as _;

use super::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned tables for lists, one line per trace.
    Ascii,
    /// Indented `name key=value` lines.
    Tree,
    #[default]
    Xml,
}

impl OutputFormat {
    /// Parse a format option token (`ascii`, `tree`, `xml`).
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "ascii" => Some(OutputFormat::Ascii),
            "tree" => Some(OutputFormat::Tree),
            "xml" => Some(OutputFormat::Xml),
            _ => None,
        }
    }
}

/// Render one tree in the given format. The result always ends in a newline.
#[must_use]
pub fn render(tag: &Tag, format: OutputFormat) -> String {
    let mut out = String::new();
    match format {
        OutputFormat::Xml => render_xml(tag, 0, &mut out),
        OutputFormat::Tree => render_tree(tag, 0, &mut out),
        OutputFormat::Ascii => render_ascii(tag, &mut out),
    }
    out
}

// =============================================================================
// XML
// =============================================================================

fn render_xml(tag: &Tag, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    let _ = write!(out, "{pad}<{}", tag.name());
    for (key, value) in tag.attrs() {
        let _ = write!(out, " {key}=\"{}\"", escape_xml(&value.render()));
    }
    if tag.children().is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    for child in tag.children() {
        render_xml(child, depth + 1, out);
    }
    let _ = writeln!(out, "{pad}</{}>", tag.name());
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

// =============================================================================
// TREE
// =============================================================================

fn render_tree(tag: &Tag, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    let _ = write!(out, "{pad}{}", tag.name());
    for (key, value) in tag.attrs() {
        let _ = write!(out, " {key}={}", value.render());
    }
    out.push('\n');
    for child in tag.children() {
        render_tree(child, depth + 1, out);
    }
}

// =============================================================================
// ASCII
// =============================================================================

fn render_ascii(tag: &Tag, out: &mut String) {
    // Header line for the node itself.
    let _ = write!(out, "{}", tag.name());
    for (key, value) in tag.attrs() {
        let _ = write!(out, " {key}={}", value.render());
    }
    out.push('\n');

    if tag.children().is_empty() {
        return;
    }

    // A run of children sharing one name and attribute shape becomes a
    // table; anything else recurses as its own block.
    if uniform_children(tag) {
        render_table(tag.children(), out);
    } else {
        for child in tag.children() {
            render_ascii(child, out);
        }
    }
}

fn uniform_children(tag: &Tag) -> bool {
    let children = tag.children();
    if children.len() < 2 {
        return false;
    }
    let first = &children[0];
    let keys: Vec<&str> = first.attrs().iter().map(|(k, _)| *k).collect();
    children.iter().all(|c| {
        c.name() == first.name()
            && c.children().is_empty()
            && c.attrs().iter().map(|(k, _)| *k).eq(keys.iter().copied())
    })
}

fn render_table(rows: &[Tag], out: &mut String) {
    let keys: Vec<&str> = rows[0].attrs().iter().map(|(k, _)| *k).collect();
    let mut widths: Vec<usize> = keys.iter().map(|k| k.len()).collect();
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.attrs().iter().map(|(_, v)| v.render()).collect())
        .collect();
    for row in &rendered {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.len());
        }
    }

    for (idx, key) in keys.iter().enumerate() {
        let _ = write!(out, "{key:<width$}  ", width = widths[idx]);
    }
    out.push('\n');
    for (idx, _) in keys.iter().enumerate() {
        let _ = write!(out, "{:-<width$}  ", "", width = widths[idx]);
    }
    out.push('\n');
    for row in &rendered {
        for (idx, cell) in row.iter().enumerate() {
            let _ = write!(out, "{cell:<width$}  ", width = widths[idx]);
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list() -> Tag {
        let mut list = Tag::new("List");
        list.put("Type", "Class");
        list.child("Class").put("ClassName", "java/lang/String").put("Size", 1024u64);
        list.child("Class").put("ClassName", "java/util/HashMap").put("Size", 64u64);
        list
    }

    #[test]
    fn test_xml_shape_and_escaping() {
        let mut tag = Tag::new("Trace");
        tag.put("Info", "a<b & \"c\"");
        let xml = render(&tag, OutputFormat::Xml);
        assert_eq!(xml, "<Trace Info=\"a&lt;b &amp; &quot;c&quot;\"/>\n");
    }

    #[test]
    fn test_xml_nests_children() {
        let xml = render(&sample_list(), OutputFormat::Xml);
        assert!(xml.starts_with("<List Type=\"Class\">\n"));
        assert!(xml.contains("  <Class ClassName=\"java/lang/String\" Size=\"1024\"/>\n"));
        assert!(xml.ends_with("</List>\n"));
    }

    #[test]
    fn test_tree_indents() {
        let text = render(&sample_list(), OutputFormat::Tree);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "List Type=Class");
        assert!(lines[1].starts_with("  Class ClassName=java/lang/String"));
    }

    #[test]
    fn test_ascii_uniform_children_become_table() {
        let text = render(&sample_list(), OutputFormat::Ascii);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "List Type=Class");
        assert!(lines[1].contains("ClassName"));
        assert!(lines[1].contains("Size"));
        assert!(lines[2].starts_with("-"));
        assert!(lines[3].contains("java/lang/String"));
        // Columns align: "Size" values share a start offset.
        let size_col = lines[1].find("Size").unwrap();
        assert_eq!(lines[3].find("1024").unwrap(), size_col);
        assert_eq!(lines[4].find("64").unwrap(), size_col);
    }

    #[test]
    fn test_ascii_single_child_recurses() {
        let mut tag = Tag::new("Traces");
        tag.put("Type", "Trigger");
        tag.child("Trace").put("MethodName", "run").put("Depth", 1u64);
        let text = render(&tag, OutputFormat::Ascii);
        assert!(text.contains("Traces Type=Trigger"));
        assert!(text.contains("Trace MethodName=run Depth=1"));
    }
}
