//! Minimal owned XHTML tree.
//!
//! Source documents are parsed once into an [`Element`] tree. Sections are
//! detached from it by value, so every section owns its subtree outright.
//! Text nodes keep their source escaping, which makes re-serialization
//! lossless for entities the parser does not know (e.g. `&nbsp;`).

use std::borrow::Cow;

use anyhow::Context as _;
use quick_xml::Reader;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre",
    "section", "table", "td", "th", "tr", "ul",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data exactly as written in the source (still escaped).
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `section` or `svg:rect`.
    pub name: String,
    /// Attributes in source order with unescaped values.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Appends plain (unescaped) text.
    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(escape_text(text)));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn find_child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.local_name() == local)
    }

    pub fn find_child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|el| el.local_name() == local)
    }

    /// Detaches every direct child element matching `pred`, preserving order.
    pub fn take_children_where(&mut self, pred: impl Fn(&Element) -> bool) -> Vec<Element> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in std::mem::take(&mut self.children) {
            match node {
                Node::Element(el) if pred(&el) => taken.push(el),
                other => kept.push(other),
            }
        }
        self.children = kept;
        taken
    }

    /// Visits this element and all descendant elements, pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in self.child_elements() {
            child.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in self.child_elements_mut() {
            child.walk_mut(f);
        }
    }

    /// Flattened text with entity references resolved.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Element(el) => el.push_text(out),
                Node::Text(raw) => out.push_str(&decode_text(raw)),
                Node::CData(data) => out.push_str(data),
                Node::Comment(_) => {}
            }
        }
    }

    /// Like [`Element::text_content`], but block-level elements are padded
    /// with spaces so words in adjacent paragraphs do not run together.
    pub fn block_text(&self) -> String {
        let mut out = String::new();
        self.push_block_text(&mut out);
        out
    }

    fn push_block_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Element(el) => {
                    let block = BLOCK_TAGS.contains(&el.local_name());
                    if block {
                        out.push(' ');
                    }
                    el.push_block_text(out);
                    if block {
                        out.push(' ');
                    }
                }
                Node::Text(raw) => out.push_str(&decode_text(raw)),
                Node::CData(data) => out.push_str(data),
                Node::Comment(_) => {}
            }
        }
    }

    pub fn to_xhtml(&self) -> String {
        let mut out = String::new();
        self.write_xhtml(&mut out);
        out
    }

    pub fn write_xhtml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }

        if self.children.is_empty() && VOID_TAGS.contains(&self.local_name()) {
            out.push_str(" />");
            return;
        }

        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(el) => el.write_xhtml(out),
                Node::Text(raw) => out.push_str(raw),
                Node::CData(data) => {
                    out.push_str("<![CDATA[");
                    out.push_str(data);
                    out.push_str("]]>");
                }
                Node::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Parses an XHTML document and returns its root element.
///
/// The XML declaration, doctype and processing instructions are dropped.
pub fn parse_document(src: &str) -> anyhow::Result<Element> {
    let src = src.strip_prefix('\u{feff}').unwrap_or(src);
    let mut reader = Reader::from_str(src);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().with_context(|| {
            format!("parse xhtml at byte {}", reader.buffer_position())
        })?;
        match event {
            Event::Start(e) => stack.push(element_from_start(&e)?),
            Event::Empty(e) => {
                let el = element_from_start(&e)?;
                attach(&mut stack, &mut root, Node::Element(el));
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| anyhow::anyhow!("unbalanced end tag"))?;
                attach(&mut stack, &mut root, Node::Element(el));
            }
            Event::Text(e) => {
                if let Some(parent) = stack.last_mut() {
                    push_raw_text(parent, &String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(parent) = stack.last_mut() {
                    push_raw_text(parent, &format!("&{};", String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::CData(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::CData(String::from_utf8_lossy(&e.into_inner()).into_owned()));
                }
            }
            Event::Comment(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Comment(String::from_utf8_lossy(e.as_ref()).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        anyhow::bail!("unclosed element <{}>", open.name);
    }
    root.ok_or_else(|| anyhow::anyhow!("document has no root element"))
}

fn element_from_start(start: &BytesStart<'_>) -> anyhow::Result<Element> {
    let name = String::from_utf8(start.name().as_ref().to_vec()).context("element name utf-8")?;
    let mut el = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.with_context(|| format!("read attribute of <{}>", el.name))?;
        let key = String::from_utf8(attr.key.as_ref().to_vec()).context("attribute name utf-8")?;
        let raw = String::from_utf8(attr.value.to_vec()).context("attribute value utf-8")?;
        let value = match unescape_with(&raw, resolve_html5_entity) {
            Ok(value) => value.into_owned(),
            Err(_) => raw,
        };
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return;
    }
    if let Node::Element(el) = node
        && root.is_none()
    {
        *root = Some(el);
    }
}

fn push_raw_text(parent: &mut Element, raw: &str) {
    if let Some(Node::Text(prev)) = parent.children.last_mut() {
        prev.push_str(raw);
    } else {
        parent.children.push(Node::Text(raw.to_owned()));
    }
}

/// Extract local name from a qualified name (`epub:type` -> `type`).
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

pub fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}

/// Longest HTML5 entity name (`CounterClockwiseContourIntegral`).
const MAX_ENTITY_LEN: usize = 32;

/// Resolves entity references in escaped character data.
///
/// Named references use the HTML5 entity table; unknown ones are kept as
/// written.
pub fn decode_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let resolved = after
            .find(';')
            .filter(|&semi| semi <= MAX_ENTITY_LEN)
            .and_then(|semi| resolve_entity(&after[..semi]).map(|value| (semi, value)));
        match resolved {
            Some((semi, value)) => {
                out.push_str(&value);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(entity: &str) -> Option<Cow<'static, str>> {
    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        return u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .map(|c| Cow::Owned(c.to_string()));
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(|c| Cow::Owned(c.to_string()));
    }
    resolve_html5_entity(entity).map(Cow::Borrowed)
}
