//! FictionBook 2 reader: XML → Book.
//!
//! The first body is split into one section per top-level child; every
//! further body (endnotes, comments) becomes a single notes section. Embedded
//! `<binary>` images are inlined as data URIs.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek};

use crate::book::{
    Book, BookMetadata, Contributor, CoverSource, Person, SectionKind, SectionPart,
};
use crate::detect::{DetectResult, Format};
use crate::encoding;
use crate::error::ReadError;
use crate::markup::{MarkupElement, MarkupNode};
use crate::progress::{emit_progress, ProgressHandler};
use crate::readers::fb2_rules::{ANNOTATION, ROOT, STANZA_CHILDREN, TEXT_STYLE};
use crate::readers::{FormatReader, ReadOptions};
use crate::rules::{copy_id, Bespoke, BespokeHandler, ChildRules, Engine, MissPolicy, RuleTable};
use crate::xml::XmlElement;

/// Class added to the body element of every notes section.
pub const NOTES_BODY_CLASS: &str = "notesBodyType";

/// Source of an image whose href is empty or points at a missing binary.
pub const EMPTY_IMAGE_SRC: &str = "data:,";

const OPERATION: &str = "Reading FB2";

pub struct Fb2Reader;

impl FormatReader for Fb2Reader {
    type Output = Book;

    fn detect(header: &[u8]) -> DetectResult {
        let text = encoding::decode_utf8(header);
        let confidence = if text.contains("<FictionBook") { 0.95 } else { 0.2 };
        DetectResult {
            format: Format::Fb2,
            confidence,
            mime_type: Format::Fb2.mime_type(),
        }
    }

    fn read<R: Read + Seek>(
        mut input: R,
        opts: &ReadOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Book, ReadError> {
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        Self::read_bytes(&raw, opts, progress)
    }
}

impl Fb2Reader {
    /// Import a complete FB2 document. Only malformed XML fails the import.
    pub fn read_bytes(
        bytes: &[u8],
        opts: &ReadOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Book, ReadError> {
        emit_progress(progress, OPERATION, 0, Some(4), Some("Parsing XML"));
        let doc = encoding::parse_xml(bytes, &opts.security)?;
        let root = &doc.root;

        let converter = Converter::new(root);
        let engine = Engine::new(&converter, MissPolicy::Drop);

        emit_progress(progress, OPERATION, 1, Some(4), Some("Reading metadata"));
        let metadata = read_metadata(root, &engine);
        let cover = root
            .select(&["coverpage", "image"])
            .and_then(|img| converter.cover_source(img));

        emit_progress(progress, OPERATION, 2, Some(4), Some("Converting bodies"));
        let parts = convert_bodies(root, &engine);

        emit_progress(progress, OPERATION, 3, Some(4), Some("Building sections"));
        let book = Book::assemble(metadata, parts, cover);
        tracing::debug!(
            sections = book.sections.len(),
            binaries = converter.binaries.len(),
            "imported FB2 book"
        );

        emit_progress(progress, OPERATION, 4, Some(4), Some("Done"));
        Ok(book)
    }
}

struct Binary {
    media_type: String,
    payload: String,
}

/// Resolves binaries and builds the bespoke image, anchor and stanza shapes.
struct Converter {
    binaries: HashMap<String, Binary>,
}

impl Converter {
    fn new(root: &XmlElement) -> Self {
        let binaries = root
            .find_all("binary")
            .filter_map(|b| {
                let id = b.id()?;
                Some((
                    id.to_string(),
                    Binary {
                        media_type: b.attr("content-type").unwrap_or_default().to_string(),
                        payload: b.text_content(),
                    },
                ))
            })
            .collect();
        Self { binaries }
    }

    fn image_src(&self, el: &XmlElement) -> String {
        let href = el.attr_any_ns("href").unwrap_or_default();
        if href.is_empty() {
            return EMPTY_IMAGE_SRC.to_string();
        }
        let id = match href.split_once('#') {
            Some((_, id)) if !id.is_empty() => id,
            _ => return href.to_string(),
        };
        match self.binaries.get(id) {
            Some(binary) => {
                let payload: String = binary.payload.split_ascii_whitespace().collect();
                format!("data:{};base64,{}", binary.media_type, payload)
            }
            None => {
                tracing::warn!(id, "image references a missing binary");
                EMPTY_IMAGE_SRC.to_string()
            }
        }
    }

    fn cover_source(&self, el: &XmlElement) -> Option<CoverSource> {
        let href = el.attr_any_ns("href").filter(|h| !h.is_empty())?;
        match href.split_once('#') {
            Some((_, id)) if !id.is_empty() => match self.binaries.get(id) {
                Some(binary) => Some(CoverSource::Binary {
                    media_type: binary.media_type.clone(),
                    payload: binary.payload.clone(),
                }),
                None => {
                    tracing::warn!(id, "cover references a missing binary");
                    None
                }
            },
            _ => Some(CoverSource::Href(href.to_string())),
        }
    }

    fn image(&self, el: &XmlElement) -> MarkupElement {
        let mut img = MarkupElement::new("img");
        copy_id(el, &mut img);
        for name in ["alt", "title"] {
            if let Some(value) = el.attr(name).filter(|v| !v.is_empty()) {
                img.set_attr(name, value);
            }
        }
        img.set_attr("src", self.image_src(el));
        img
    }
}

impl BespokeHandler for Converter {
    fn convert(
        &self,
        engine: &Engine<'_>,
        kind: Bespoke,
        el: &XmlElement,
        table: &'static RuleTable,
    ) -> Option<MarkupNode> {
        let out = match kind {
            Bespoke::Image => self.image(el),
            Bespoke::Anchor => {
                let mut a = MarkupElement::new("a");
                copy_id(el, &mut a);
                a.children = engine.convert_children(el, ChildRules::Table(&TEXT_STYLE), table);
                a.set_attr("href", el.attr_any_ns("href").unwrap_or_default());
                if el.attr("type") == Some("note") {
                    a.set_attr("epub:type", "noteref");
                }
                a
            }
            Bespoke::Stanza => {
                let mut p = MarkupElement::new("p");
                copy_id(el, &mut p);
                p.children =
                    engine.convert_children(el, ChildRules::Table(&STANZA_CHILDREN), table);
                for verse in el.elements().filter(|c| c.name == "v") {
                    let text = verse.text_content();
                    if !text.is_empty() {
                        p.push(MarkupNode::Text(text));
                        p.push(MarkupElement::new("br").into());
                    }
                }
                p
            }
        };
        Some(out.into())
    }
}

fn convert_bodies(root: &XmlElement, engine: &Engine<'_>) -> Vec<SectionPart> {
    let mut parts = Vec::new();
    let bodies: Vec<MarkupElement> = root
        .find_all("body")
        .flat_map(|body| engine.convert_element(body, &ROOT))
        .filter_map(|node| match node {
            MarkupNode::Element(el) => Some(el),
            _ => None,
        })
        .collect();

    if bodies.is_empty() {
        tracing::warn!("document has no body");
        return parts;
    }

    for (index, body) in bodies.into_iter().enumerate() {
        if index == 0 {
            let before = parts.len();
            for child in body.children.iter() {
                if let MarkupNode::Element(el) = child {
                    let node = MarkupNode::Element(el.clone());
                    let mut ids = BTreeSet::new();
                    node.collect_ids(&mut ids);
                    parts.push(SectionPart {
                        root: el.clone(),
                        ids,
                        kind: SectionKind::Main,
                    });
                }
            }
            if parts.len() == before {
                // Nothing to split: keep the body whole so the book is never empty.
                parts.push(whole_body(body, SectionKind::Main));
            }
        } else {
            let mut body = whole_body(body, SectionKind::Notes);
            body.root.set_attr("class", NOTES_BODY_CLASS);
            parts.push(body);
        }
    }
    parts
}

/// A whole body as one section, with ids gathered from its children.
fn whole_body(body: MarkupElement, kind: SectionKind) -> SectionPart {
    let mut ids = BTreeSet::new();
    for child in &body.children {
        child.collect_ids(&mut ids);
    }
    SectionPart {
        root: body,
        ids,
        kind,
    }
}

fn read_metadata(root: &XmlElement, engine: &Engine<'_>) -> BookMetadata {
    let text = |path: &[&str]| element_text(root.select(path));

    let mut contributor: Vec<Contributor> = root
        .select_all(&["document-info", "author"])
        .into_iter()
        .map(|el| Contributor::from_person(person(el)))
        .collect();
    contributor.extend(
        root.select_all(&["document-info", "program-used"])
            .into_iter()
            .map(|el| Contributor::named(element_text(Some(el)))),
    );

    let description = root
        .select(&["title-info", "annotation"])
        .map(|annotation| {
            engine
                .convert_element(annotation, &ANNOTATION)
                .iter()
                .filter_map(MarkupNode::as_element)
                .map(MarkupElement::inner_html)
                .collect()
        })
        .unwrap_or_default();

    BookMetadata {
        title: text(&["title-info", "book-title"]),
        identifier: text(&["document-info", "id"]),
        language: text(&["title-info", "lang"]),
        author: root
            .select_all(&["title-info", "author"])
            .into_iter()
            .map(person)
            .collect(),
        translator: root
            .select_all(&["title-info", "translator"])
            .into_iter()
            .map(person)
            .collect(),
        contributor,
        publisher: text(&["publish-info", "publisher"]),
        published: date(root.select(&["title-info", "date"])),
        modified: date(root.select(&["document-info", "date"])),
        description,
        subject: root
            .select_all(&["title-info", "genre"])
            .into_iter()
            .map(|el| element_text(Some(el)))
            .collect(),
    }
}

/// Prefer the nickname; otherwise compose first, middle and last names.
fn person(el: &XmlElement) -> Person {
    let part = |name: &str| element_text(el.find(name));

    let nick = part("nickname");
    if !nick.is_empty() {
        return Person::Name(nick);
    }

    let first = part("first-name");
    let middle = part("middle-name");
    let last = part("last-name");

    let join = |parts: &[&str]| {
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let name = join(&[first.as_str(), middle.as_str(), last.as_str()]);
    let sort_as = (!last.is_empty())
        .then(|| format!("{}, {}", last, join(&[first.as_str(), middle.as_str()])));
    Person::Full { name, sort_as }
}

fn date(el: Option<&XmlElement>) -> String {
    match el {
        Some(el) => match el.attr("value") {
            Some(value) => value.to_string(),
            None => element_text(Some(el)),
        },
        None => String::new(),
    }
}

fn element_text(el: Option<&XmlElement>) -> String {
    el.map(|e| normalize_whitespace(&e.text_content()))
        .unwrap_or_default()
}

fn normalize_whitespace(s: &str) -> String {
    s.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}
