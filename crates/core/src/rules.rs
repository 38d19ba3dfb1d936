//! Tag-mapping rule engine.
//!
//! A [`RuleTable`] is a static map from a source tag name to a [`Rule`]. The
//! [`Engine`] walks a source tree recursively, looking every element up in the
//! table that is active at its position. Tables are plain `static` data and may
//! refer to each other cyclically (a paragraph table that allows nested
//! paragraphs, a section table reused for nested sections).

use crate::markup::{MarkupElement, MarkupNode};
use crate::xml::{XmlElement, XmlNode};

/// Where the children of a mapped element are looked up.
#[derive(Debug, Clone, Copy)]
pub enum ChildRules {
    /// Keep using the table the element itself was found in.
    Reuse,
    /// Switch to another table.
    Table(&'static RuleTable),
    /// No table: only text survives, child elements are dropped.
    TextOnly,
}

/// Elements whose output shape is built by hand rather than by the generic
/// map path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bespoke {
    Image,
    Anchor,
    Stanza,
}

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    Map {
        tag: &'static str,
        children: ChildRules,
        attrs: &'static [&'static str],
    },
    Bespoke(Bespoke),
}

/// Shorthand for a rule that copies no attributes besides `id`.
pub const fn map(tag: &'static str, children: ChildRules) -> Rule {
    Rule::Map {
        tag,
        children,
        attrs: &[],
    }
}

pub const fn map_with(
    tag: &'static str,
    children: ChildRules,
    attrs: &'static [&'static str],
) -> Rule {
    Rule::Map {
        tag,
        children,
        attrs,
    }
}

pub struct RuleTable {
    pub name: &'static str,
    pub entries: &'static [(&'static str, Rule)],
    /// Entries consulted when a tag is not found in `entries`.
    pub extends: Option<&'static RuleTable>,
}

impl RuleTable {
    pub fn lookup(&'static self, tag: &str) -> Option<&'static Rule> {
        self.entries
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, rule)| rule)
            .or_else(|| self.extends.and_then(|parent| parent.lookup(tag)))
    }
}

// Tables reference each other cyclically, so only the name is printed.
impl std::fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What happens to an element whose tag has no rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    /// The element and its whole subtree are dropped.
    Drop,
    /// The element is discarded but its converted children are spliced into
    /// the parent.
    Transparent,
}

impl MissPolicy {
    pub fn on_miss<T>(self, children: impl FnOnce() -> Vec<T>) -> Vec<T> {
        match self {
            MissPolicy::Drop => Vec::new(),
            MissPolicy::Transparent => children(),
        }
    }
}

/// Builds the output of [`Bespoke`] rules. Implementations may call back into
/// the engine to convert children.
pub trait BespokeHandler {
    fn convert(
        &self,
        engine: &Engine<'_>,
        kind: Bespoke,
        el: &XmlElement,
        table: &'static RuleTable,
    ) -> Option<MarkupNode>;
}

pub struct Engine<'h> {
    handler: &'h dyn BespokeHandler,
    policy: MissPolicy,
}

impl<'h> Engine<'h> {
    pub fn new(handler: &'h dyn BespokeHandler, policy: MissPolicy) -> Self {
        Self { handler, policy }
    }

    pub fn policy(&self) -> MissPolicy {
        self.policy
    }

    /// Convert one source node against `table`.
    pub fn convert(&self, node: &XmlNode, table: &'static RuleTable) -> Vec<MarkupNode> {
        match node {
            XmlNode::Text(t) => convert_text(t).into_iter().collect(),
            XmlNode::CData(t) if !t.is_empty() => vec![MarkupNode::CData(t.clone())],
            XmlNode::Comment(t) if !t.is_empty() => vec![MarkupNode::Comment(t.clone())],
            XmlNode::CData(_) | XmlNode::Comment(_) => Vec::new(),
            XmlNode::Element(el) => self.convert_element(el, table),
        }
    }

    pub fn convert_element(&self, el: &XmlElement, table: &'static RuleTable) -> Vec<MarkupNode> {
        match table.lookup(&el.name) {
            None => self
                .policy
                .on_miss(|| self.convert_children(el, ChildRules::Reuse, table)),
            Some(Rule::Bespoke(kind)) => self
                .handler
                .convert(self, *kind, el, table)
                .into_iter()
                .collect(),
            Some(Rule::Map {
                tag,
                children,
                attrs,
            }) => {
                let mut out = MarkupElement::new(*tag);
                copy_id(el, &mut out);
                for name in attrs.iter() {
                    if let Some(value) = el.attr(name).filter(|v| !v.is_empty()) {
                        out.set_attr(*name, value);
                    }
                }
                out.children = self.convert_children(el, *children, table);
                vec![out.into()]
            }
        }
    }

    /// Convert every child of `el`, resolving `children` against `current`.
    pub fn convert_children(
        &self,
        el: &XmlElement,
        children: ChildRules,
        current: &'static RuleTable,
    ) -> Vec<MarkupNode> {
        let table = match children {
            ChildRules::Reuse => current,
            ChildRules::Table(t) => t,
            ChildRules::TextOnly => {
                return el
                    .children
                    .iter()
                    .filter(|c| !matches!(c, XmlNode::Element(_)))
                    .flat_map(|c| self.convert(c, current))
                    .collect();
            }
        };
        el.children
            .iter()
            .flat_map(|c| self.convert(c, table))
            .collect()
    }
}

/// Copy a non-empty source `id` onto an output element.
pub fn copy_id(src: &XmlElement, out: &mut MarkupElement) {
    if let Some(id) = src.id() {
        out.set_attr("id", id);
    }
}

/// Text that is not all whitespace becomes a leaf with its leading whitespace
/// removed.
pub fn convert_text(text: &str) -> Option<MarkupNode> {
    if text.trim().is_empty() {
        None
    } else {
        Some(MarkupNode::Text(text.trim_start().to_string()))
    }
}
