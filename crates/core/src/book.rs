//! The paginated book model produced by the ebook importer.
//!
//! A [`Book`] owns a [`ResourceArena`] holding one standalone XHTML document
//! per section (and the cover, once materialized). URLs handed out by the book
//! resolve through [`Book::fetch`] until [`Book::destroy`] is called.

use std::collections::{BTreeSet, HashMap};

use base64::Engine as _;
use serde::Serialize;

use crate::arena::{Resource, ResourceArena};
use crate::markup::{MarkupElement, MarkupNode};

/// Media type of every section document.
pub const SECTION_MEDIA_TYPE: &str = "text/html";

/// Attribute a table-of-contents target carries in the rendered section.
pub const TOC_ID_ATTRIBUTE: &str = "data-foliate-id";

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Role given to every document contributor ("book producer").
pub const CONTRIBUTOR_ROLE: &str = "bkp";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookMetadata {
    pub title: String,
    pub identifier: String,
    pub language: String,
    pub author: Vec<Person>,
    pub translator: Vec<Person>,
    pub contributor: Vec<Contributor>,
    pub publisher: String,
    pub published: String,
    pub modified: String,
    /// Annotation rendered to markup.
    pub description: String,
    pub subject: Vec<String>,
}

/// A person credit: a bare nickname, or a composed name with an optional sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Person {
    Name(String),
    Full {
        name: String,
        #[serde(rename = "sortAs")]
        sort_as: Option<String>,
    },
}

impl Person {
    pub fn name(&self) -> &str {
        match self {
            Person::Name(n) => n,
            Person::Full { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub name: String,
    #[serde(rename = "sortAs", skip_serializing_if = "Option::is_none")]
    pub sort_as: Option<String>,
    pub role: String,
}

impl Contributor {
    pub fn from_person(person: Person) -> Self {
        match person {
            Person::Name(name) => Self::named(name),
            Person::Full { name, sort_as } => Self {
                name,
                sort_as,
                role: CONTRIBUTOR_ROLE.to_string(),
            },
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort_as: None,
            role: CONTRIBUTOR_ROLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// A direct child of the first body.
    Main,
    /// A whole secondary body (endnotes, comments).
    Notes,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// Position in `Book::sections`.
    pub id: usize,
    /// Serialized document length, not counting embedded image sources.
    pub size: usize,
    pub ids: BTreeSet<String>,
    pub kind: SectionKind,
    #[serde(skip)]
    url: String,
    #[serde(skip)]
    content: String,
}

impl Section {
    /// Arena URL of the standalone section document.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Inner markup of the section element.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A converted section before it is serialized into the book.
#[derive(Debug, Clone)]
pub struct SectionPart {
    pub root: MarkupElement,
    pub ids: BTreeSet<String>,
    pub kind: SectionKind,
}

/// How a resolved href locates its target inside the section document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Table-of-contents link: match [`TOC_ID_ATTRIBUTE`].
    DataId(String),
    /// In-text link: match the element id.
    ElementId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrefTarget {
    /// Owning section, `None` when the link has no target.
    pub index: Option<usize>,
    pub locator: Locator,
}

/// Where the cover image comes from. Decoding is deferred until asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    Binary { media_type: String, payload: String },
    Href(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cover {
    Embedded { media_type: String, data: Vec<u8> },
    Linked(String),
}

#[derive(Debug)]
pub struct Book {
    pub metadata: BookMetadata,
    pub sections: Vec<Section>,
    id_index: HashMap<String, usize>,
    cover: Option<CoverSource>,
    cover_url: Option<String>,
    arena: ResourceArena,
}

impl Book {
    /// Serialize every part into the arena and build the id table.
    pub fn assemble(
        metadata: BookMetadata,
        parts: Vec<SectionPart>,
        cover: Option<CoverSource>,
    ) -> Self {
        let mut arena = ResourceArena::new();
        let mut id_index = HashMap::new();
        let mut sections = Vec::with_capacity(parts.len());

        for (index, part) in parts.into_iter().enumerate() {
            let node = MarkupNode::Element(part.root);
            let document = format!(
                r#"<html xmlns="{XHTML_NS}"><body>{}</body></html>"#,
                node.to_html()
            );
            let size = document.len().saturating_sub(node.image_source_len());
            let content = match &node {
                MarkupNode::Element(el) => el.inner_html(),
                _ => String::new(),
            };

            for id in &part.ids {
                if let Some(previous) = id_index.insert(id.clone(), index) {
                    if previous != index {
                        tracing::warn!(id = %id, previous, index, "duplicate id, last section wins");
                    }
                }
            }

            let url = arena.allocate(SECTION_MEDIA_TYPE, document.into_bytes());
            tracing::debug!(index, size, ids = part.ids.len(), "section ready");
            sections.push(Section {
                id: index,
                size,
                ids: part.ids,
                kind: part.kind,
                url,
                content,
            });
        }

        Self {
            metadata,
            sections,
            id_index,
            cover,
            cover_url: None,
            arena,
        }
    }

    /// Section that owns `id`, if any.
    pub fn section_of(&self, id: &str) -> Option<usize> {
        self.id_index.get(id).copied()
    }

    /// Resolve `{index}#{id}` (table of contents) or `#{id}` (in-text) links.
    pub fn resolve_href(&self, href: &str) -> HrefTarget {
        let (prefix, fragment) = href.split_once('#').unwrap_or((href, ""));
        if prefix.is_empty() {
            HrefTarget {
                index: self.section_of(fragment),
                locator: Locator::ElementId(fragment.to_string()),
            }
        } else {
            let index = prefix
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|i| *i < self.sections.len());
            HrefTarget {
                index,
                locator: Locator::DataId(fragment.to_string()),
            }
        }
    }

    /// The cover image, decoded on each call.
    pub fn cover(&self) -> Option<Cover> {
        match self.cover.as_ref()? {
            CoverSource::Href(href) => Some(Cover::Linked(href.clone())),
            CoverSource::Binary {
                media_type,
                payload,
            } => match decode_payload(payload) {
                Ok(data) => Some(Cover::Embedded {
                    media_type: media_type.clone(),
                    data,
                }),
                Err(e) => {
                    tracing::warn!("cover binary is not valid base64: {e}");
                    None
                }
            },
        }
    }

    /// A URL for the cover. Embedded covers are copied into the arena once.
    pub fn cover_url(&mut self) -> Option<String> {
        if let Some(url) = &self.cover_url {
            return Some(url.clone());
        }
        let url = match self.cover()? {
            Cover::Linked(href) => href,
            Cover::Embedded { media_type, data } => self.arena.allocate(media_type, data),
        };
        self.cover_url = Some(url.clone());
        Some(url)
    }

    /// Bytes behind a URL this book handed out.
    pub fn fetch(&self, url: &str) -> Option<&Resource> {
        self.arena.get(url)
    }

    /// Every section's content back to back, in reading order.
    pub fn chapter_text(&self) -> String {
        self.sections.iter().map(|s| s.content()).collect()
    }

    /// Release every section and cover URL. Returns how many were released.
    pub fn destroy(&mut self) -> usize {
        self.cover_url = None;
        self.arena.release_all()
    }
}

/// Decode a base64 binary payload, ignoring the line breaks it is usually
/// wrapped with.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = payload.split_ascii_whitespace().collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(id: &str, children: Vec<MarkupNode>, ids: &[&str], kind: SectionKind) -> SectionPart {
        SectionPart {
            root: MarkupElement::new("section")
                .with_attr("id", id)
                .with_children(children),
            ids: ids.iter().map(|s| s.to_string()).collect(),
            kind,
        }
    }

    fn sample() -> Book {
        Book::assemble(
            BookMetadata::default(),
            vec![
                part("a", vec![MarkupNode::text("one")], &["a", "a1"], SectionKind::Main),
                part(
                    "b",
                    vec![MarkupElement::new("img").with_attr("src", "data:,").into()],
                    &["b"],
                    SectionKind::Main,
                ),
                part("n", vec![], &["n1", "n2"], SectionKind::Notes),
            ],
            Some(CoverSource::Binary {
                media_type: "image/png".into(),
                payload: "aGVs\nbG8=".into(),
            }),
        )
    }

    #[test]
    fn sections_are_dense_and_serialized() {
        let book = sample();
        let ids: Vec<usize> = book.sections.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        let doc = book.fetch(book.sections[0].url()).unwrap();
        assert_eq!(doc.media_type, SECTION_MEDIA_TYPE);
        assert_eq!(
            String::from_utf8(doc.data.clone()).unwrap(),
            r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><section id="a">one</section></body></html>"#
        );
        assert_eq!(book.sections[0].content(), "one");
        assert_eq!(book.chapter_text(), "one<img src=\"data:,\"/>");
    }

    #[test]
    fn size_excludes_image_sources() {
        let book = sample();
        let plain = book.fetch(book.sections[0].url()).unwrap().data.len();
        assert_eq!(book.sections[0].size, plain);
        let with_img = book.fetch(book.sections[1].url()).unwrap().data.len();
        assert_eq!(book.sections[1].size, with_img - "data:,".len());
    }

    #[test]
    fn resolve_href_forms() {
        let book = sample();
        assert_eq!(
            book.resolve_href("#n2"),
            HrefTarget {
                index: Some(2),
                locator: Locator::ElementId("n2".into())
            }
        );
        assert_eq!(
            book.resolve_href("1#intro"),
            HrefTarget {
                index: Some(1),
                locator: Locator::DataId("intro".into())
            }
        );
        assert_eq!(book.resolve_href("#missing").index, None);
        assert_eq!(book.resolve_href("9#x").index, None);
        assert_eq!(book.resolve_href("abc#x").index, None);
    }

    #[test]
    fn cover_is_decoded_lazily_and_materialized_once() {
        let mut book = sample();
        assert_eq!(
            book.cover(),
            Some(Cover::Embedded {
                media_type: "image/png".into(),
                data: b"hello".to_vec()
            })
        );
        let url = book.cover_url().unwrap();
        assert_eq!(book.cover_url().unwrap(), url);
        assert_eq!(book.fetch(&url).unwrap().data, b"hello");
    }

    #[test]
    fn destroy_releases_everything() {
        let mut book = sample();
        let url = book.sections[0].url().to_string();
        let _ = book.cover_url();
        assert_eq!(book.destroy(), 4);
        assert!(book.fetch(&url).is_none());
        assert_eq!(book.destroy(), 0);
    }

    #[test]
    fn person_serializes_like_a_name_or_pair() {
        let people = vec![
            Person::Name("nick".into()),
            Person::Full {
                name: "A B".into(),
                sort_as: Some("B, A".into()),
            },
        ];
        assert_eq!(
            serde_json::to_value(&people).unwrap(),
            serde_json::json!(["nick", {"name": "A B", "sortAs": "B, A"}])
        );
    }
}
