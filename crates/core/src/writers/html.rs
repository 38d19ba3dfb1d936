//! HTML writer: rich-document tree → renderable markup.
//!
//! Marks on a text leaf become nested wrappers, one per step, outermost first
//! in the order bold, italic, strikethrough, underline (then code, sub, sup).

use crate::document::{ElementKind, Mark, RichElement, RichNode, RichText};
use crate::error::WriteError;
use crate::markup::{self, MarkupElement, MarkupNode};
use crate::progress::{emit_progress, ProgressHandler};
use crate::writers::{FormatWriter, RenderOptions};

pub struct HtmlWriter;

impl FormatWriter for HtmlWriter {
    fn write<W: std::io::Write>(
        nodes: &[RichNode],
        mut output: W,
        opts: &RenderOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<(), WriteError> {
        emit_progress(progress, "Writing HTML", 0, Some(1), None);
        let html = markup::to_html(&render(nodes, opts));
        output.write_all(html.as_bytes())?;
        emit_progress(progress, "Writing HTML", 1, Some(1), None);
        Ok(())
    }
}

pub fn element_tag(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Paragraph => "p",
        ElementKind::HeadingOne => "h1",
        ElementKind::HeadingTwo => "h2",
        ElementKind::HeadingThree => "h3",
        ElementKind::HeadingFour => "h4",
        ElementKind::HeadingFive => "h5",
        ElementKind::HeadingSix => "h6",
        ElementKind::BlockQuote => "blockquote",
        ElementKind::BulletedList => "ul",
        ElementKind::NumberedList => "ol",
        ElementKind::ListItem => "li",
        ElementKind::Table => "table",
        ElementKind::TableRow => "tr",
        ElementKind::TableCell => "td",
        ElementKind::Link => "a",
        ElementKind::Image => "img",
        ElementKind::CodeBlock => "pre",
    }
}

pub fn mark_tag(mark: Mark) -> &'static str {
    match mark {
        Mark::Bold => "strong",
        Mark::Italic => "em",
        Mark::Strikethrough => "s",
        Mark::Underline => "u",
        Mark::Code => "code",
        Mark::Sub => "sub",
        Mark::Sup => "sup",
    }
}

/// Render a node list, skipping nodes that render to nothing.
pub fn render(nodes: &[RichNode], opts: &RenderOptions) -> Vec<MarkupNode> {
    nodes.iter().filter_map(|n| render_node(n, opts)).collect()
}

pub fn render_node(node: &RichNode, opts: &RenderOptions) -> Option<MarkupNode> {
    match node {
        RichNode::Element(el) => render_element(el, opts),
        RichNode::Text(leaf) => render_leaf(leaf.clone()),
    }
}

fn render_element(el: &RichElement, opts: &RenderOptions) -> Option<MarkupNode> {
    if el.kind == ElementKind::Image && opts.suppress_images {
        return None;
    }

    let mut out = MarkupElement::new(element_tag(el.kind));
    if let Some(align) = el.align {
        out.set_attr("class", format!("text-{}", align.as_str()));
    }
    match el.kind {
        ElementKind::Link => out.set_attr("href", el.url.as_deref().unwrap_or_default()),
        // The children of an image are only an editing placeholder.
        ElementKind::Image => {
            out.set_attr("src", el.url.as_deref().unwrap_or_default());
            return Some(out.into());
        }
        _ => {}
    }
    out.children = render(&el.children, opts);
    Some(out.into())
}

/// Wrap the first remaining mark, clear it, and recurse for the rest.
fn render_leaf(mut leaf: RichText) -> Option<MarkupNode> {
    if leaf.text.trim().is_empty() {
        return None;
    }
    match leaf.marks().first().copied() {
        None => Some(
            MarkupElement::new("span")
                .with_children(vec![MarkupNode::Text(leaf.text)])
                .into(),
        ),
        Some(mark) => {
            leaf.set(mark, false);
            let inner = render_leaf(leaf)?;
            Some(
                MarkupElement::new(mark_tag(mark))
                    .with_children(vec![inner])
                    .into(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Align;
    use pretty_assertions::assert_eq;

    fn html(nodes: &[RichNode], opts: &RenderOptions) -> String {
        markup::to_html(&render(nodes, opts))
    }

    #[test]
    fn test_marks_nest_in_priority_order() {
        let leaf: RichNode = RichText::new("x")
            .with(Mark::Underline)
            .with(Mark::Italic)
            .with(Mark::Bold)
            .into();
        assert_eq!(
            html(&[leaf], &RenderOptions::default()),
            "<strong><em><u><span>x</span></u></em></strong>"
        );
    }

    #[test]
    fn test_plain_and_blank_leaves() {
        let nodes = vec![RichNode::element(
            crate::document::ElementKind::Paragraph,
            vec![RichNode::text("a"), RichNode::text("  "), RichText::new("").with(Mark::Bold).into()],
        )];
        assert_eq!(html(&nodes, &RenderOptions::default()), "<p><span>a</span></p>");
    }

    #[test]
    fn test_alignment_class_and_links() {
        let mut p = RichElement::new(ElementKind::Paragraph, vec![]);
        p.align = Some(Align::Center);
        let mut link = RichElement::new(ElementKind::Link, vec![RichNode::text("go")]);
        link.url = Some("https://x.org/?a=1&b=2".into());
        p.children.push(link.into());
        assert_eq!(
            html(&[p.into()], &RenderOptions::default()),
            r#"<p class="text-center"><a href="https://x.org/?a=1&amp;b=2"><span>go</span></a></p>"#
        );
    }

    #[test]
    fn test_images_can_be_suppressed() {
        let mut img = RichElement::new(ElementKind::Image, vec![RichNode::text("")]);
        img.url = Some("a.png".into());
        let quote = RichNode::element(
            ElementKind::BlockQuote,
            vec![RichNode::element(ElementKind::ListItem, vec![img.into()])],
        );
        assert_eq!(
            html(std::slice::from_ref(&quote), &RenderOptions::default()),
            r#"<blockquote><li><img src="a.png"/></li></blockquote>"#
        );
        assert_eq!(
            html(&[quote], &RenderOptions { suppress_images: true }),
            "<blockquote><li></li></blockquote>"
        );
    }

    #[test]
    fn test_list_tags() {
        let nodes = vec![
            RichNode::element(ElementKind::BulletedList, vec![]),
            RichNode::element(ElementKind::NumberedList, vec![]),
            RichNode::element(ElementKind::CodeBlock, vec![]),
        ];
        assert_eq!(html(&nodes, &RenderOptions::default()), "<ul></ul><ol></ol><pre></pre>");
    }

    #[test]
    fn test_writer_emits_bytes() {
        let mut out = Vec::new();
        HtmlWriter::write(&RichNode::empty_document(), &mut out, &RenderOptions::default(), None)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<p></p>");
    }
}
