//! Minimal XML element tree built from quick-xml events.
//!
//! The ebook importer walks this tree with the tag-mapping rule engine, so it
//! keeps everything the engine can see: elements (local names), attributes
//! with their prefixes, text, CDATA sections, and comments.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::error::ReadError;
use crate::security::{self, SecurityLimits};

const FORMAT: &str = "XML";

#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
    /// Encoding named in the `<?xml ... encoding="..."?>` prolog, if any.
    pub declared_encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Local name, namespace prefix stripped.
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Value of an unprefixed attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.prefix.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of an attribute by local name in any namespace (e.g. `l:href`,
    /// `xlink:href` or plain `href`). Unprefixed attributes win.
    pub fn attr_any_ns(&self, local: &str) -> Option<&str> {
        self.attr(local).or_else(|| {
            self.attributes
                .iter()
                .find(|a| a.name == local && a.prefix.as_deref() != Some("xmlns"))
                .map(|a| a.value.as_str())
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    /// Direct element children.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.children.iter()],
        }
    }

    /// First descendant element with the given local name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.descendants().find(|el| el.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.descendants().filter(move |el| el.name == name)
    }

    /// Descendant-combinator lookup: `select(&["title-info", "author"])`
    /// matches the first `author` nested anywhere under a `title-info`.
    pub fn select(&self, path: &[&str]) -> Option<&XmlElement> {
        self.select_all(path).into_iter().next()
    }

    pub fn select_all(&self, path: &[&str]) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        collect_path(self, path, &mut out);
        out
    }

    /// Concatenated text of every descendant text and CDATA node.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        push_text(self, &mut out);
        out
    }
}

fn collect_path<'a>(el: &'a XmlElement, path: &[&str], out: &mut Vec<&'a XmlElement>) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    for d in el.descendants().filter(|d| d.name == *head) {
        if rest.is_empty() {
            out.push(d);
        } else {
            collect_path(d, rest, out);
        }
    }
}

fn push_text(el: &XmlElement, out: &mut String) {
    for child in &el.children {
        match child {
            XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
            XmlNode::Element(e) => push_text(e, out),
            XmlNode::Comment(_) => {}
        }
    }
}

/// Pre-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<std::slice::Iter<'a, XmlNode>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(top) = self.stack.last_mut() {
            match top.next() {
                Some(XmlNode::Element(el)) => {
                    self.stack.push(el.children.iter());
                    return Some(el);
                }
                Some(_) => continue,
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}

/// Parse a complete XML document. Any well-formedness error fails the parse.
pub fn parse(content: &str, limits: &SecurityLimits) -> Result<XmlDocument, ReadError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut declared_encoding = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Decl(ref d)) => {
                if let Some(Ok(enc)) = d.encoding() {
                    declared_encoding = Some(String::from_utf8_lossy(&enc).trim().to_string());
                }
            }
            Ok(Event::Start(ref e)) => {
                security::check_nesting_depth(stack.len() as u32 + 1, limits)?;
                stack.push(element_from_start(e));
            }
            Ok(Event::Empty(ref e)) => {
                security::check_nesting_depth(stack.len() as u32 + 1, limits)?;
                attach(&mut stack, &mut root, element_from_start(e))?;
            }
            Ok(Event::End(ref e)) => {
                let el = stack.pop().ok_or_else(|| {
                    ReadError::malformed(
                        FORMAT,
                        format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(e.local_name().as_ref())
                        ),
                    )
                })?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| ReadError::malformed(FORMAT, err))?;
                    parent.children.push(XmlNode::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    parent.children.push(XmlNode::CData(text));
                }
            }
            Ok(Event::Comment(ref e)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    parent.children.push(XmlNode::Comment(text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::malformed(
                    FORMAT,
                    format!("{e} at position {}", reader.buffer_position()),
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ReadError::malformed(
            FORMAT,
            format!("unclosed element <{}>", open.name),
        ));
    }

    let root = root.ok_or_else(|| ReadError::malformed(FORMAT, "no root element"))?;
    Ok(XmlDocument {
        root,
        declared_encoding,
    })
}

fn element_from_start(e: &BytesStart<'_>) -> XmlElement {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let attributes = e
        .attributes()
        .flatten()
        .map(|a| {
            let prefix = a
                .key
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
            let name = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            };
            XmlAttribute {
                prefix,
                name,
                value,
            }
        })
        .collect();
    XmlElement {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), ReadError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(el));
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(ReadError::malformed(FORMAT, "multiple root elements"))
    }
}
