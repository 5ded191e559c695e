//! LDraw parser - build pages, steps and elements from text
//!
//! This handles:
//! - Multi-part documents (`0 FILE` / `0 NOFILE`)
//! - Page headers (title, `Name:`, `Author:`, `!LDRAW_ORG`)
//! - Step breaks, colour definitions and groups
//! - Editor decorators written by the code generator
//! - Line types 1 to 5
//!
//! Loading is not an edit: nothing the parser does lands on the undo stack.

use crate::colour::{parse_colour_code, Rgba};
use crate::document::Document;
use crate::error::{DomError, Result};
use crate::geom::{Matrix4d, Vector3d};
use crate::material::Material;
use crate::node::GraphicKind;
use crate::types::{ObjectId, PageType};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_NAME: &str = "untitled.ldr";

/// Parser configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Fail on a line that cannot be understood instead of keeping it as a
    /// comment.
    pub strict: bool,
}

/// What a parse produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// New pages, in file order, added to the document.
    pub pages: Vec<ObjectId>,
    /// Some line was not taken as written (degraded or dropped).
    pub document_modified: bool,
}

/// Decorators waiting for the next element line.
#[derive(Debug, Default)]
struct Decorators {
    lock_next: bool,
    lock_geometry: bool,
    group: Option<String>,
    ghosted: bool,
    hidden: bool,
}

/// The page under construction. It joins the document when finished.
struct PageBuilder {
    page: ObjectId,
    step: Option<ObjectId>,
    lines: usize,
    groups: AHashMap<String, ObjectId>,
    links: Vec<(ObjectId, String)>,
}

impl PageBuilder {
    fn new(page: ObjectId) -> Self {
        Self {
            page,
            step: None,
            lines: 0,
            groups: AHashMap::new(),
            links: Vec::new(),
        }
    }

    /// The step receiving elements, opened on demand.
    fn step(&mut self, doc: &mut Document) -> Result<ObjectId> {
        if let Some(step) = self.step {
            return Ok(step);
        }
        let step = doc.create_step();
        doc.add(self.page, step)?;
        self.step = Some(step);
        Ok(step)
    }
}

/// LDraw text parser
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a whole file into new pages of `doc`. Pages are built detached
    /// and join the document together at the end; on failure none of them
    /// is kept and no event is raised.
    pub fn parse_document(&self, doc: &mut Document, text: &str) -> Result<ParseOutcome> {
        doc.run_op("Parse", |doc| {
            doc.without_history(|doc| {
                let mark = doc.events.mark();
                let mut created = Vec::new();
                let result = self
                    .parse_lines(doc, text, &mut created)
                    .and_then(|outcome| attach_pages(doc, &outcome.pages).map(|()| outcome));
                if result.is_err() {
                    discard_pages(doc, &created);
                    doc.events.discard_from(mark);
                }
                result
            })
        })
    }

    /// Build one detached element from a single line. Malformed lines are
    /// always an error here.
    pub fn parse_element(&self, doc: &mut Document, line: &str) -> Result<ObjectId> {
        let mut decorators = Decorators::default();
        let body = strip_decorators(line.trim(), &mut decorators);
        let element = create_element(doc, body)?;
        apply_flags(doc, element, &decorators)?;
        Ok(element)
    }

    fn parse_lines(&self, doc: &mut Document, text: &str, created: &mut Vec<ObjectId>) -> Result<ParseOutcome> {
        let mut outcome = ParseOutcome::default();
        let mut current: Option<PageBuilder> = None;
        let mut decorators = Decorators::default();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = strip_tokens(line, &["0", "FILE"]) {
                if let Some(builder) = current.take() {
                    self.finish_page(doc, builder, &mut outcome)?;
                }
                let page = if name.is_empty() {
                    let name = default_page_name(doc, created);
                    doc.create_page(&name)?
                } else {
                    doc.create_page(name)?
                };
                created.push(page);
                current = Some(PageBuilder::new(page));
                decorators = Decorators::default();
                continue;
            }
            if strip_tokens(line, &["0", "NOFILE"]).is_some() {
                if let Some(builder) = current.take() {
                    self.finish_page(doc, builder, &mut outcome)?;
                }
                decorators = Decorators::default();
                continue;
            }

            if current.is_none() {
                let name = default_page_name(doc, created);
                let page = doc.create_page(&name)?;
                created.push(page);
                current = Some(PageBuilder::new(page));
            }
            let Some(builder) = current.as_mut() else {
                continue;
            };
            let first_line = builder.lines == 0;
            builder.lines += 1;

            if self.parse_meta(doc, builder, line, first_line, &mut decorators)? {
                continue;
            }

            let body = strip_decorators(line, &mut decorators);
            let pending = std::mem::take(&mut decorators);
            match self.place_element(doc, builder, body, &pending) {
                Ok(()) => {}
                Err(err) if !self.config.strict => {
                    tracing::warn!(line = number + 1, error = %err, "unreadable line kept as a comment");
                    outcome.document_modified = true;
                    let comment = doc.create_comment(line)?;
                    let step = builder.step(doc)?;
                    doc.add(step, comment)?;
                }
                Err(err) => {
                    return Err(DomError::Format(format!("line {}: {}", number + 1, err)));
                }
            }
        }

        if let Some(builder) = current.take() {
            self.finish_page(doc, builder, &mut outcome)?;
        }
        tracing::debug!(
            pages = outcome.pages.len(),
            modified = outcome.document_modified,
            "document parsed"
        );
        Ok(outcome)
    }

    /// Page-level meta commands and decorators. Returns whether `line` was
    /// consumed.
    fn parse_meta(
        &self,
        doc: &mut Document,
        builder: &mut PageBuilder,
        line: &str,
        first_line: bool,
        decorators: &mut Decorators,
    ) -> Result<bool> {
        if let Some(name) = strip_tokens(line, &["0", "Name:"]) {
            if !name.is_empty() {
                doc.set_name(builder.page, name)?;
            }
        } else if let Some(author) = strip_tokens(line, &["0", "Author:"]) {
            doc.set_author(builder.page, author)?;
        } else if let Some(rest) = strip_tokens(line, &["0", "!LDRAW_ORG"]) {
            let keyword = rest.split_whitespace().next().unwrap_or_default();
            match PageType::from_keyword(keyword) {
                Some(page_type) => doc.set_page_type(builder.page, page_type)?,
                None => return Ok(false),
            }
        } else if strip_tokens(line, &["0", "STEP"]).is_some() {
            // close the current step; the next element opens a new one
            builder.step(doc)?;
            builder.step = None;
            *decorators = Decorators::default();
        } else if strip_tokens(line, &["0", "!DIGITALIS_LDTOOLS_DOM", "LOCKNEXT"]).is_some() {
            decorators.lock_next = true;
        } else if strip_tokens(line, &["0", "!DIGITALIS_LDTOOLS_DOM", "LOCKGEOM"]).is_some() {
            decorators.lock_geometry = true;
        } else if let Some(group) = strip_tokens(line, &["0", "MLCAD", "BTG"]) {
            decorators.group = Some(group.to_string());
        } else if first_line && is_plain_comment(line) {
            let title = strip_tokens(line, &["0"]).unwrap_or_default();
            doc.set_title(builder.page, title)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn place_element(
        &self,
        doc: &mut Document,
        builder: &mut PageBuilder,
        body: &str,
        decorators: &Decorators,
    ) -> Result<()> {
        let element = create_element(doc, body)?;
        let step = builder.step(doc)?;
        if let Err(err) = doc.add(step, element) {
            doc.dispose(element)?;
            return Err(err);
        }

        if let Some(group) = doc.node(element)?.as_group() {
            builder.groups.insert(group.name.clone(), element);
        }
        if let Some(group) = &decorators.group {
            builder.links.push((element, group.clone()));
        }
        apply_flags(doc, element, decorators)
    }

    fn finish_page(
        &self,
        doc: &mut Document,
        builder: PageBuilder,
        outcome: &mut ParseOutcome,
    ) -> Result<()> {
        for (member, name) in &builder.links {
            match builder.groups.get(name.as_str()) {
                Some(&group) => doc.set_group(*member, Some(group))?,
                None => {
                    tracing::warn!(group = %name, member, "reference to an unknown group dropped");
                    outcome.document_modified = true;
                }
            }
        }
        outcome.pages.push(builder.page);
        Ok(())
    }
}

/// `untitled.ldr`, or the first numbered variant no page of the document
/// or of this parse uses yet.
fn default_page_name(doc: &Document, created: &[ObjectId]) -> String {
    let taken = |name: &str| {
        doc.pages()
            .iter()
            .chain(created)
            .any(|&page| doc.name(page).is_ok_and(|n| n.eq_ignore_ascii_case(name)))
    };
    if !taken(DEFAULT_PAGE_NAME) {
        return DEFAULT_PAGE_NAME.to_string();
    }
    (2usize..)
        .map(|n| format!("untitled-{}.ldr", n))
        .find(|name| !taken(name))
        .unwrap_or_default()
}

fn attach_pages(doc: &mut Document, pages: &[ObjectId]) -> Result<()> {
    let root = doc.root();
    pages.iter().try_for_each(|&page| doc.add(root, page))
}

/// Throw away every page a failed parse created, attached or not.
fn discard_pages(doc: &mut Document, pages: &[ObjectId]) {
    let root = doc.root();
    for &page in pages {
        let result = match doc.parent(page) {
            Ok(Some(parent)) if parent == root => doc.remove(root, page).map(|_| ()),
            _ => Ok(()),
        }
        .and_then(|()| doc.dispose(page));
        if let Err(err) = result {
            tracing::warn!(page, %err, "could not discard a page of a failed parse");
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the leading words `words` (case-insensitive) and return the rest.
fn strip_tokens<'a>(line: &'a str, words: &[&str]) -> Option<&'a str> {
    let mut rest = line.trim_start();
    for word in words {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if !rest[..end].eq_ignore_ascii_case(word) {
            return None;
        }
        rest = rest[end..].trim_start();
    }
    Some(rest)
}

/// A `0` line that is not a command the DOM understands.
fn is_plain_comment(line: &str) -> bool {
    strip_tokens(line, &["0"]).is_some()
        && strip_tokens(line, &["0", "!COLOUR"]).is_none()
        && strip_tokens(line, &["0", "GROUP"]).is_none()
        && strip_tokens(line, &["0", "GHOST"]).is_none()
        && strip_tokens(line, &["0", "MLCAD"]).is_none()
}

fn strip_decorators<'a>(mut line: &'a str, decorators: &mut Decorators) -> &'a str {
    loop {
        if let Some(rest) = strip_tokens(line, &["0", "GHOST"]) {
            decorators.ghosted = true;
            line = rest;
        } else if let Some(rest) = strip_tokens(line, &["0", "MLCAD", "HIDE"]) {
            decorators.hidden = true;
            line = rest;
        } else {
            return line;
        }
    }
}

/// Local flags go on last: a locked element refuses the others.
fn apply_flags(doc: &mut Document, element: ObjectId, decorators: &Decorators) -> Result<()> {
    if decorators.ghosted {
        doc.set_ghosted(element, true)?;
    }
    if decorators.hidden {
        doc.set_visible(element, false)?;
    }
    if decorators.lock_geometry {
        doc.set_geometry_locked(element, true)?;
    }
    if decorators.lock_next {
        doc.set_locked(element, true)?;
    }
    Ok(())
}

fn create_element(doc: &mut Document, line: &str) -> Result<ObjectId> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&line_type, args)) = tokens.split_first() else {
        return Err(DomError::Format("empty line".to_string()));
    };

    match line_type {
        "0" => {
            if let Some(rest) = strip_tokens(line, &["0", "!COLOUR"]) {
                return parse_colour(doc, rest);
            }
            if let Some(rest) = strip_tokens(line, &["0", "GROUP"]) {
                // the member count is derived, not stored
                let name = strip_tokens(rest, &[rest.split_whitespace().next().unwrap_or_default()])
                    .unwrap_or_default();
                return doc.create_group(name);
            }
            doc.create_comment(strip_tokens(line, &["0"]).unwrap_or_default())
        }
        "1" => {
            if args.len() < 14 {
                return Err(DomError::Format(format!(
                    "reference needs 14 fields and a target, got {}",
                    args.len()
                )));
            }
            let colour = parse_colour_code(args[0])?;
            let mut values = [0.0; 12];
            for (value, token) in values.iter_mut().zip(&args[1..13]) {
                *value = parse_number(token)?;
            }
            let target = args[13..].join(" ");
            doc.create_reference(colour, Matrix4d::from_ldraw(values), &target)
        }
        "2" => parse_graphic(doc, GraphicKind::Line, args),
        "3" => parse_graphic(doc, GraphicKind::Triangle, args),
        "4" => parse_graphic(doc, GraphicKind::Quadrilateral, args),
        "5" => parse_graphic(doc, GraphicKind::OptionalLine, args),
        other => Err(DomError::Format(format!("unknown line type '{}'", other))),
    }
}

fn parse_graphic(doc: &mut Document, kind: GraphicKind, args: &[&str]) -> Result<ObjectId> {
    let expected = 1 + kind.coordinates_count() * 3;
    if args.len() != expected {
        return Err(DomError::Format(format!(
            "{:?} needs {} fields, got {}",
            kind,
            expected,
            args.len()
        )));
    }
    let colour = parse_colour_code(args[0])?;
    let coordinates = args[1..]
        .chunks(3)
        .map(|xyz| {
            Ok(Vector3d::new(
                parse_number(xyz[0])?,
                parse_number(xyz[1])?,
                parse_number(xyz[2])?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    doc.create_graphic(kind, colour, &coordinates)
}

/// `<name> CODE n VALUE #hex EDGE #hex|n [ALPHA a] [LUMINANCE l] [finish]`
fn parse_colour(doc: &mut Document, rest: &str) -> Result<ObjectId> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let Some((&name, mut fields)) = tokens.split_first() else {
        return Err(DomError::Format("!COLOUR without a name".to_string()));
    };

    let mut code = None;
    let mut value = None;
    let mut edge = None;
    let mut alpha = None;
    let mut luminance = None;
    let mut material = Material::Plastic;

    while let Some((&key, tail)) = fields.split_first() {
        let upper = key.to_ascii_uppercase();
        let takes_value = matches!(upper.as_str(), "CODE" | "VALUE" | "EDGE" | "ALPHA" | "LUMINANCE");
        if !takes_value {
            material = Material::parse(fields)?;
            break;
        }
        let Some((&arg, tail)) = tail.split_first() else {
            return Err(DomError::Format(format!("{} without a value", upper)));
        };
        match upper.as_str() {
            "CODE" => code = Some(parse_number::<u32>(arg)?),
            "VALUE" => value = Some(Rgba::from_hex(arg)?),
            "EDGE" => edge = Some(parse_edge(doc, arg)?),
            "ALPHA" => alpha = Some(parse_number::<u8>(arg)?),
            _ => luminance = Some(parse_number::<u8>(arg)?),
        }
        fields = tail;
    }

    let missing = |field: &str| DomError::Format(format!("!COLOUR {} without {}", name, field));
    let code = code.ok_or_else(|| missing("CODE"))?;
    let mut value = value.ok_or_else(|| missing("VALUE"))?;
    let edge = edge.ok_or_else(|| missing("EDGE"))?;
    if let Some(alpha) = alpha {
        value = value.with_alpha(alpha);
    }

    let colour = doc.create_colour(name, code, value, edge)?;
    if luminance.is_some() {
        doc.set_luminance(colour, luminance)?;
    }
    if material != Material::Plastic {
        let finish = doc.create_material(material);
        doc.set_material(colour, finish)?;
    }
    Ok(colour)
}

/// An edge is either `#RRGGBB` or the code of a palette colour.
fn parse_edge(doc: &Document, text: &str) -> Result<Rgba> {
    if text.starts_with('#') {
        return Rgba::from_hex(text);
    }
    let code = parse_number::<u32>(text)?;
    doc.palette()
        .get(code)
        .map(|entry| entry.value)
        .ok_or_else(|| DomError::Format(format!("unknown edge colour {}", code)))
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.parse::<T>()
        .map_err(|_| DomError::Format(format!("invalid number '{}'", text)))
}
