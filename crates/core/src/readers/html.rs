//! HTML reader: pasted or persisted HTML → rich-document tree.
//!
//! Block tags become elements, inline tags set a mark on every text leaf below
//! them, and any other tag is transparent: it disappears but its content is
//! kept. Presentation styles are only inferred on the body's direct children.

use std::io::{Read, Seek};

use scraper::{ElementRef, Html, Node};

use crate::detect::{DetectResult, Format};
use crate::document::{Align, ElementKind, Mark, RichElement, RichNode, RichText};
use crate::encoding;
use crate::error::ReadError;
use crate::progress::{emit_progress, ProgressHandler};
use crate::readers::{FormatReader, ReadOptions};

/// Deepest level (body = 1) whose inline style is inspected.
const STYLE_DEPTH: usize = 2;

/// Heavier than this counts as bold.
const BOLD_WEIGHT: u32 = 600;

/// Tag, element type, and the attribute holding the element's URL.
const BLOCK_TAGS: &[(&str, ElementKind, Option<&str>)] = &[
    ("a", ElementKind::Link, Some("href")),
    ("blockquote", ElementKind::BlockQuote, None),
    ("h1", ElementKind::HeadingOne, None),
    ("h2", ElementKind::HeadingTwo, None),
    ("h3", ElementKind::HeadingThree, None),
    ("h4", ElementKind::HeadingFour, None),
    ("h5", ElementKind::HeadingFive, None),
    ("h6", ElementKind::HeadingSix, None),
    ("img", ElementKind::Image, Some("src")),
    ("li", ElementKind::ListItem, None),
    ("ol", ElementKind::NumberedList, None),
    ("p", ElementKind::Paragraph, None),
    ("pre", ElementKind::CodeBlock, None),
    ("ul", ElementKind::BulletedList, None),
    ("table", ElementKind::Table, None),
    ("tr", ElementKind::TableRow, None),
    ("td", ElementKind::TableCell, None),
    ("th", ElementKind::TableCell, None),
];

const INLINE_TAGS: &[(&str, Mark)] = &[
    ("code", Mark::Code),
    ("del", Mark::Strikethrough),
    ("em", Mark::Italic),
    ("i", Mark::Italic),
    ("s", Mark::Strikethrough),
    ("strong", Mark::Bold),
    ("b", Mark::Bold),
    ("u", Mark::Underline),
    ("sub", Mark::Sub),
    ("sup", Mark::Sup),
];

pub struct HtmlReader;

impl FormatReader for HtmlReader {
    type Output = Vec<RichNode>;

    fn detect(header: &[u8]) -> DetectResult {
        let lower = encoding::decode_utf8(header).to_lowercase();
        let confidence = if lower.contains("<!doctype html") || lower.contains("<html") {
            0.85
        } else if lower.contains("<body") || lower.contains("<p") {
            0.5
        } else {
            0.1
        };
        DetectResult {
            format: Format::Html,
            confidence,
            mime_type: Format::Html.mime_type(),
        }
    }

    fn read<R: Read + Seek>(
        mut input: R,
        _opts: &ReadOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Vec<RichNode>, ReadError> {
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        emit_progress(progress, "Reading HTML", 0, Some(1), None);
        let nodes = import(&encoding::decode_utf8(&raw));
        emit_progress(progress, "Reading HTML", 1, Some(1), None);
        Ok(nodes)
    }
}

/// Convert an HTML fragment or document. Never fails; an empty input yields
/// one paragraph with one empty text leaf.
pub fn import(html: &str) -> Vec<RichNode> {
    let doc = Html::parse_document(html);
    let body = doc
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "body");

    let nodes = match body {
        Some(body) => deserialize_element(body, 1),
        None => Vec::new(),
    };

    let blank = nodes
        .iter()
        .all(|n| matches!(n, RichNode::Text(t) if t.text.trim().is_empty()));
    if blank {
        RichNode::empty_document()
    } else {
        nodes
    }
}

fn text_leaf(text: &str) -> Vec<RichNode> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![RichNode::text(text.trim_start())]
    }
}

fn deserialize_element(el: ElementRef<'_>, depth: usize) -> Vec<RichNode> {
    let name = el.value().name();
    if name == "br" {
        return vec![RichNode::text("\n")];
    }

    // <pre><code>…</code></pre> is a single code block, not two levels.
    let mut parent = el;
    if name == "pre" {
        if let Some(code) = el
            .first_child()
            .and_then(ElementRef::wrap)
            .filter(|c| c.value().name() == "code")
        {
            parent = code;
        }
    }

    let convert_children = || {
        let mut children: Vec<RichNode> = parent
            .children()
            .flat_map(|child| match (ElementRef::wrap(child), child.value()) {
                (Some(el), _) => deserialize_element(el, depth + 1),
                (None, Node::Text(t)) => text_leaf(t),
                _ => Vec::new(),
            })
            .collect();
        if children.is_empty() {
            children.push(RichNode::text(""));
        }
        children
    };

    if name == "body" {
        return convert_children();
    }

    if let Some((_, kind, url)) = BLOCK_TAGS.iter().find(|(tag, _, _)| *tag == name) {
        let mut element = RichElement::new(*kind, convert_children());
        if let Some(attr) = url {
            element.url = Some(el.value().attr(attr).unwrap_or_default().to_string());
        }
        if depth <= STYLE_DEPTH {
            if let Some(style) = el.value().attr("style") {
                apply_style(&mut element, &InlineStyle::parse(style));
            }
        }
        return vec![element.into()];
    }

    if let Some((_, mark)) = INLINE_TAGS.iter().find(|(tag, _)| *tag == name) {
        let mut children = convert_children();
        for child in &mut children {
            child.for_each_leaf_mut(&mut |leaf: &mut RichText| leaf.set(*mark, true));
        }
        return children;
    }

    // Anything else is transparent.
    convert_children()
}

/// The subset of an inline `style` attribute the importer looks at.
#[derive(Debug, Default, PartialEq, Eq)]
struct InlineStyle {
    text_align: Option<String>,
    text_decoration: Option<String>,
    font_weight: Option<String>,
    font_style: Option<String>,
}

impl InlineStyle {
    fn parse(style: &str) -> Self {
        let mut out = Self::default();
        for declaration in style.split(';') {
            let Some((prop, value)) = declaration.split_once(':') else {
                continue;
            };
            let value = Some(value.trim().to_ascii_lowercase());
            match prop.trim().to_ascii_lowercase().as_str() {
                "text-align" => out.text_align = value,
                "text-decoration" | "text-decoration-line" => out.text_decoration = value,
                "font-weight" => out.font_weight = value,
                "font-style" => out.font_style = value,
                _ => {}
            }
        }
        out
    }

    fn marks(&self) -> Vec<Mark> {
        let mut marks = Vec::new();
        let bold = self
            .font_weight
            .as_deref()
            .and_then(|w| w.parse::<u32>().ok())
            .is_some_and(|w| w > BOLD_WEIGHT);
        if bold {
            marks.push(Mark::Bold);
        }
        if self.font_style.as_deref() == Some("italic") {
            marks.push(Mark::Italic);
        }
        if let Some(decoration) = &self.text_decoration {
            for token in decoration.split_ascii_whitespace() {
                match token {
                    "underline" => marks.push(Mark::Underline),
                    "line-through" => marks.push(Mark::Strikethrough),
                    _ => {}
                }
            }
        }
        marks
    }
}

fn apply_style(element: &mut RichElement, style: &InlineStyle) {
    element.align = style.text_align.as_deref().and_then(Align::from_css);
    let marks = style.marks();
    if marks.is_empty() {
        return;
    }
    for child in &mut element.children {
        child.for_each_leaf_mut(&mut |leaf: &mut RichText| {
            for mark in &marks {
                leaf.set(*mark, true);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn para(children: Vec<RichNode>) -> RichNode {
        RichNode::element(ElementKind::Paragraph, children)
    }

    #[test]
    fn test_unmapped_tags_are_transparent() {
        assert_eq!(
            import("<foo><b>hi</b></foo>"),
            vec![RichText::new("hi").with(Mark::Bold).into()]
        );
    }

    #[test]
    fn test_blocks_marks_and_links() {
        let nodes = import(
            r#"<h2>Title</h2><p>Plain <strong>bold <em>both</em></strong> <a href="https://x.org">link</a></p>"#,
        );
        let mut link = RichElement::new(ElementKind::Link, vec![RichNode::text("link")]);
        link.url = Some("https://x.org".into());
        assert_eq!(
            nodes,
            vec![
                RichNode::element(ElementKind::HeadingTwo, vec![RichNode::text("Title")]),
                para(vec![
                    RichNode::text("Plain "),
                    RichText::new("bold ").with(Mark::Bold).into(),
                    RichText::new("both").with(Mark::Bold).with(Mark::Italic).into(),
                    link.into(),
                ]),
            ]
        );
    }

    #[test]
    fn test_br_and_pre_code() {
        let nodes = import("<p>a<br>b</p><pre><code>let x = 1;</code></pre>");
        assert_eq!(
            nodes,
            vec![
                para(vec![RichNode::text("a"), RichNode::text("\n"), RichNode::text("b")]),
                RichNode::element(ElementKind::CodeBlock, vec![RichNode::text("let x = 1;")]),
            ]
        );
    }

    #[test]
    fn test_style_inferred_only_near_the_root() {
        let nodes = import(
            r#"<p style="text-align: right; font-weight: 700">top</p>
               <blockquote><p style="text-align:center; font-style: italic">deep</p></blockquote>"#,
        );
        let mut top = RichElement::new(
            ElementKind::Paragraph,
            vec![RichText::new("top").with(Mark::Bold).into()],
        );
        top.align = Some(Align::End);
        assert_eq!(nodes[0], top.into());
        assert_eq!(
            nodes[1],
            RichNode::element(ElementKind::BlockQuote, vec![para(vec![RichNode::text("deep")])])
        );
    }

    #[test]
    fn test_style_values() {
        let style = InlineStyle::parse("TEXT-ALIGN: Left; text-decoration: underline line-through; font-weight: bold");
        assert_eq!(style.text_align.as_deref(), Some("left"));
        assert_eq!(style.marks(), vec![Mark::Underline, Mark::Strikethrough]);
        assert_eq!(InlineStyle::parse("font-weight: 600").marks(), vec![]);
        assert_eq!(InlineStyle::parse("font-weight: 601").marks(), vec![Mark::Bold]);

        let mut el = RichElement::new(ElementKind::Paragraph, vec![RichNode::text("x")]);
        apply_style(&mut el, &InlineStyle::parse("text-align: inherit"));
        assert_eq!(el.align, None);
    }

    #[test]
    fn test_empty_elements_get_a_placeholder_leaf() {
        let nodes = import("<p></p><ul><li>one</li></ul>");
        assert_eq!(
            nodes,
            vec![
                para(vec![RichNode::text("")]),
                RichNode::element(
                    ElementKind::BulletedList,
                    vec![RichNode::element(ElementKind::ListItem, vec![RichNode::text("one")])]
                ),
            ]
        );
    }

    #[test]
    fn test_empty_input_is_an_empty_document() {
        assert_eq!(import(""), RichNode::empty_document());
        assert_eq!(import("   \n "), RichNode::empty_document());
    }

    #[test]
    fn test_images_and_tables() {
        let nodes = import(r#"<img src="a.png"><table><tr><td>c</td></tr></table>"#);
        let mut img = RichElement::new(ElementKind::Image, vec![RichNode::text("")]);
        img.url = Some("a.png".into());
        assert_eq!(nodes[0], img.into());
        // html5ever adds <tbody>, which is transparent
        assert_eq!(
            nodes[1],
            RichNode::element(
                ElementKind::Table,
                vec![RichNode::element(
                    ElementKind::TableRow,
                    vec![RichNode::element(ElementKind::TableCell, vec![RichNode::text("c")])]
                )]
            )
        );
    }
}
