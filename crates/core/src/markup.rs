//! Output node tree shared by the ebook importer and the rich-document
//! renderer, with an escaping XHTML serializer.

use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Elements serialized as self-closing when they have no children.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
    /// Raw data section carried through from the source document.
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_children(mut self, children: Vec<MarkupNode>) -> Self {
        self.children = children;
        self
    }

    /// Set an attribute, replacing an existing value of the same name.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, child: MarkupNode) {
        self.children.push(child);
    }

    /// Serialized children without the element's own tags.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out);
        }
        out
    }
}

impl From<MarkupElement> for MarkupNode {
    fn from(el: MarkupElement) -> Self {
        MarkupNode::Element(el)
    }
}

impl MarkupNode {
    pub fn text(text: impl Into<String>) -> Self {
        MarkupNode::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&MarkupElement> {
        match self {
            MarkupNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    pub fn write_html(&self, out: &mut String) {
        match self {
            MarkupNode::Text(t) => escape_into(out, t, false),
            MarkupNode::CData(t) => {
                let _ = write!(out, "<![CDATA[{t}]]>");
            }
            MarkupNode::Comment(t) => {
                let _ = write!(out, "<!--{t}-->");
            }
            MarkupNode::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(out, value, true);
                    out.push('"');
                }
                if el.children.is_empty() && VOID_TAGS.contains(&el.tag.as_str()) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &el.children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }

    /// Every non-empty `id` attribute in this subtree, self included.
    pub fn collect_ids(&self, out: &mut BTreeSet<String>) {
        if let MarkupNode::Element(el) = self {
            if let Some(id) = el.attr("id").filter(|id| !id.is_empty()) {
                out.insert(id.to_string());
            }
            for child in &el.children {
                child.collect_ids(out);
            }
        }
    }

    /// Summed serialized (escaped) length of every `img` source in this subtree.
    pub fn image_source_len(&self) -> usize {
        match self {
            MarkupNode::Element(el) => {
                let own = if el.tag == "img" {
                    el.attr("src").map_or(0, |src| escaped_len(src, true))
                } else {
                    0
                };
                own + el
                    .children
                    .iter()
                    .map(MarkupNode::image_source_len)
                    .sum::<usize>()
            }
            _ => 0,
        }
    }

    /// Concatenated text of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        match self {
            MarkupNode::Text(t) | MarkupNode::CData(t) => out.push_str(t),
            MarkupNode::Comment(_) => {}
            MarkupNode::Element(el) => {
                for child in &el.children {
                    child.push_text(out);
                }
            }
        }
    }
}

/// Serialize a node list back to back.
pub fn to_html(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        node.write_html(&mut out);
    }
    out
}

/// Length `s` takes once written by [`escape_into`].
fn escaped_len(s: &str, attribute: bool) -> usize {
    s.chars()
        .map(|c| match c {
            '&' => "&amp;".len(),
            '<' | '>' => "&lt;".len(),
            '"' if attribute => "&quot;".len(),
            c => c.len_utf8(),
        })
        .sum()
}

fn escape_into(out: &mut String, s: &str, attribute: bool) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
