//! Tag-mapping tables for FictionBook 2 bodies.
//!
//! Unmapped elements are dropped together with their subtree.

use crate::rules::{map, map_with, Bespoke, ChildRules, Rule, RuleTable};

use ChildRules::{Reuse, Table, TextOnly};

const CELL_ATTRS: &[&str] = &["colspan", "rowspan", "align", "valign"];

pub static TEXT_STYLE: RuleTable = RuleTable {
    name: "text-style",
    entries: &[
        ("strong", map("strong", Reuse)),
        ("emphasis", map("em", Reuse)),
        ("style", map("span", Reuse)),
        ("a", Rule::Bespoke(Bespoke::Anchor)),
        ("strikethrough", map("s", Reuse)),
        ("sub", map("sub", Reuse)),
        ("sup", map("sup", Reuse)),
        ("code", map("code", Reuse)),
        ("image", Rule::Bespoke(Bespoke::Image)),
    ],
    extends: None,
};

pub static TABLE_CELLS: RuleTable = RuleTable {
    name: "table-cells",
    entries: &[
        ("th", map_with("th", Table(&TEXT_STYLE), CELL_ATTRS)),
        ("td", map_with("td", Table(&TEXT_STYLE), CELL_ATTRS)),
    ],
    extends: None,
};

pub static TITLE_CHILDREN: RuleTable = RuleTable {
    name: "title",
    entries: &[
        ("p", map("h1", Table(&TEXT_STYLE))),
        ("empty-line", map("br", TextOnly)),
    ],
    extends: None,
};

pub static STANZA_TITLE: RuleTable = RuleTable {
    name: "stanza-title",
    entries: &[
        ("p", map("strong", Table(&TEXT_STYLE))),
        ("empty-line", map("br", TextOnly)),
    ],
    extends: None,
};

pub static STANZA_CHILDREN: RuleTable = RuleTable {
    name: "stanza",
    entries: &[
        ("title", map("header", Table(&STANZA_TITLE))),
        ("subtitle", map("p", Table(&TEXT_STYLE))),
    ],
    extends: None,
};

pub static TABLE: RuleTable = RuleTable {
    name: "table",
    entries: &[("tr", map_with("tr", Table(&TABLE_CELLS), &["align"]))],
    extends: None,
};

pub static POEM: RuleTable = RuleTable {
    name: "poem",
    entries: &[
        ("epigraph", map("blockquote", Table(&SECTION))),
        ("subtitle", map("h2", Table(&TEXT_STYLE))),
        ("text-author", map("p", Table(&TEXT_STYLE))),
        ("date", map("p", Table(&TEXT_STYLE))),
        ("stanza", Rule::Bespoke(Bespoke::Stanza)),
    ],
    extends: None,
};

/// Inline content of a paragraph. Nested paragraphs are kept.
pub static PARAGRAPH: RuleTable = RuleTable {
    name: "paragraph",
    entries: &[("p", map("p", Reuse))],
    extends: Some(&TEXT_STYLE),
};

pub static SECTION: RuleTable = RuleTable {
    name: "section",
    entries: &[
        ("title", map("header", Table(&TITLE_CHILDREN))),
        ("epigraph", map("blockquote", Reuse)),
        ("image", Rule::Bespoke(Bespoke::Image)),
        ("annotation", map("aside", TextOnly)),
        ("section", map("section", Reuse)),
        ("p", map("p", Table(&PARAGRAPH))),
        ("poem", map("blockquote", Table(&POEM))),
        ("subtitle", map("h2", Table(&TEXT_STYLE))),
        ("cite", map("blockquote", Reuse)),
        ("empty-line", map("br", TextOnly)),
        ("table", map("table", Table(&TABLE))),
        ("text-author", map("p", Table(&TEXT_STYLE))),
    ],
    extends: None,
};

/// Used for the book description.
pub static ANNOTATION: RuleTable = RuleTable {
    name: "annotation",
    entries: &[("annotation", map("div", Table(&SECTION)))],
    extends: None,
};

pub static BODY: RuleTable = RuleTable {
    name: "body",
    entries: &[
        ("image", Rule::Bespoke(Bespoke::Image)),
        ("title", map("section", Table(&TITLE_CHILDREN))),
        ("epigraph", map("section", Table(&SECTION))),
        ("section", map("section", Table(&SECTION))),
    ],
    extends: None,
};

pub static ROOT: RuleTable = RuleTable {
    name: "root",
    entries: &[("body", map("body", Table(&BODY)))],
    extends: None,
};
