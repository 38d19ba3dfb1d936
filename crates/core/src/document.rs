use serde::{Deserialize, Serialize};

/// The editable rich-document tree. Produced by the HTML importer, consumed
/// by the renderer, and persisted as JSON in the editor's own shape:
/// `{"type": "paragraph", "children": [{"text": "hi", "bold": true}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RichNode {
    Element(RichElement),
    Text(RichText),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    /// Target of a link or source of an image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub children: Vec<RichNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    HeadingThree,
    HeadingFour,
    HeadingFive,
    HeadingSix,
    BlockQuote,
    BulletedList,
    NumberedList,
    ListItem,
    Table,
    TableRow,
    TableCell,
    Link,
    Image,
    CodeBlock,
}

impl ElementKind {
    pub fn heading(level: u8) -> Option<Self> {
        Some(match level {
            1 => ElementKind::HeadingOne,
            2 => ElementKind::HeadingTwo,
            3 => ElementKind::HeadingThree,
            4 => ElementKind::HeadingFour,
            5 => ElementKind::HeadingFive,
            6 => ElementKind::HeadingSix,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Start,
    Center,
    End,
    Justify,
}

impl Align {
    /// Map a CSS `text-align` value. Physical directions become logical ones;
    /// anything unrecognised is dropped.
    pub fn from_css(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Align::Start),
            "right" | "end" => Some(Align::End),
            "center" => Some(Align::Center),
            "justify" => Some(Align::Justify),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Align::Start => "start",
            Align::Center => "center",
            Align::End => "end",
            Align::Justify => "justify",
        }
    }
}

/// A text leaf. Marks are flat booleans, never nested wrapper nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RichText {
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sub: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sup: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Strikethrough,
    Underline,
    Code,
    Sub,
    Sup,
}

impl Mark {
    /// Wrapping order used by the renderer, outermost first.
    pub const RENDER_ORDER: [Mark; 7] = [
        Mark::Bold,
        Mark::Italic,
        Mark::Strikethrough,
        Mark::Underline,
        Mark::Code,
        Mark::Sub,
        Mark::Sup,
    ];
}

impl RichText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, mark: Mark) -> Self {
        self.set(mark, true);
        self
    }

    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Strikethrough => self.strikethrough,
            Mark::Underline => self.underline,
            Mark::Code => self.code,
            Mark::Sub => self.sub,
            Mark::Sup => self.sup,
        }
    }

    pub fn set(&mut self, mark: Mark, on: bool) {
        let slot = match mark {
            Mark::Bold => &mut self.bold,
            Mark::Italic => &mut self.italic,
            Mark::Strikethrough => &mut self.strikethrough,
            Mark::Underline => &mut self.underline,
            Mark::Code => &mut self.code,
            Mark::Sub => &mut self.sub,
            Mark::Sup => &mut self.sup,
        };
        *slot = on;
    }

    /// Active marks in render order.
    pub fn marks(&self) -> Vec<Mark> {
        Mark::RENDER_ORDER
            .into_iter()
            .filter(|m| self.has(*m))
            .collect()
    }

    pub fn has_marks(&self) -> bool {
        Mark::RENDER_ORDER.iter().any(|m| self.has(*m))
    }
}

impl RichElement {
    pub fn new(kind: ElementKind, children: Vec<RichNode>) -> Self {
        Self {
            kind,
            align: None,
            url: None,
            children,
        }
    }
}

impl From<RichElement> for RichNode {
    fn from(el: RichElement) -> Self {
        RichNode::Element(el)
    }
}

impl From<RichText> for RichNode {
    fn from(t: RichText) -> Self {
        RichNode::Text(t)
    }
}

impl RichNode {
    pub fn text(text: impl Into<String>) -> Self {
        RichNode::Text(RichText::new(text))
    }

    pub fn element(kind: ElementKind, children: Vec<RichNode>) -> Self {
        RichNode::Element(RichElement::new(kind, children))
    }

    /// One paragraph holding one empty text leaf.
    pub fn empty_document() -> Vec<RichNode> {
        vec![RichNode::element(
            ElementKind::Paragraph,
            vec![RichNode::text("")],
        )]
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, RichNode::Text(t) if t.text.is_empty())
    }

    pub fn text_content(&self) -> String {
        match self {
            RichNode::Text(t) => t.text.clone(),
            RichNode::Element(el) => el.children.iter().map(RichNode::text_content).collect(),
        }
    }

    /// Visit every text leaf in this subtree.
    pub fn for_each_leaf_mut(&mut self, f: &mut impl FnMut(&mut RichText)) {
        match self {
            RichNode::Text(t) => f(t),
            RichNode::Element(el) => {
                for child in &mut el.children {
                    child.for_each_leaf_mut(f);
                }
            }
        }
    }
}

/// Parse a persisted rich document.
pub fn from_json(json: &str) -> Result<Vec<RichNode>, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn to_json(nodes: &[RichNode]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_shape_matches_editor_documents() {
        let doc = vec![RichNode::Element(RichElement {
            kind: ElementKind::HeadingTwo,
            align: Some(Align::Center),
            url: None,
            children: vec![RichText::new("Title").with(Mark::Bold).into()],
        })];
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "type": "heading-two",
                "align": "center",
                "children": [{"text": "Title", "bold": true}]
            }])
        );
        let back = from_json(&json.to_string()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn unknown_leaf_fields_are_ignored() {
        let nodes = from_json(r#"[{"type":"link","url":"https://x","children":[{"text":"a","hr":true}]}]"#).unwrap();
        match &nodes[0] {
            RichNode::Element(el) => {
                assert_eq!(el.kind, ElementKind::Link);
                assert_eq!(el.url.as_deref(), Some("https://x"));
                assert_eq!(el.children, vec![RichNode::text("a")]);
            }
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn marks_follow_render_order() {
        let leaf = RichText::new("x")
            .with(Mark::Sup)
            .with(Mark::Underline)
            .with(Mark::Bold);
        assert_eq!(leaf.marks(), vec![Mark::Bold, Mark::Underline, Mark::Sup]);
        assert!(leaf.has_marks());
        assert!(!RichText::new("y").has_marks());
    }

    #[test]
    fn css_alignment() {
        assert_eq!(Align::from_css("left"), Some(Align::Start));
        assert_eq!(Align::from_css("right"), Some(Align::End));
        assert_eq!(Align::from_css(" Center "), Some(Align::Center));
        assert_eq!(Align::from_css("justify"), Some(Align::Justify));
        assert_eq!(Align::from_css("-webkit-auto"), None);
    }

    #[test]
    fn empty_document_shape() {
        let doc = RichNode::empty_document();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc[0].text_content(), "");
        match &doc[0] {
            RichNode::Element(el) => assert!(el.children[0].is_empty_text()),
            RichNode::Text(_) => panic!("expected paragraph"),
        }
    }
}
