//! Code generator - turn a subtree back into LDraw text
//!
//! This module handles:
//! - One line per element, `\r\n` terminated
//! - Editor decorators (`LOCKNEXT`, `MLCAD BTG`, `GHOST`, `MLCAD HIDE`),
//!   dropped in parts-library mode
//! - Colour substitution (main colour override, local palette codes)
//! - Transforms and winding order
//! - Multi-page documents as `0 FILE` / `0 NOFILE` blocks

use crate::colour::{format_colour_code, is_direct_colour, MAIN_COLOUR};
use crate::document::Document;
use crate::error::Result;
use crate::geom::Matrix4d;
use crate::node::{ColourData, Graphic, GraphicKind, NodeData, Reference};
use crate::types::{CodeStandards, ElementKind, ObjectId, PageType, WindingDirection};
use crate::utils::format_number;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const LINE_END: &str = "\r\n";
pub const LOCK_NEXT: &str = "0 !DIGITALIS_LDTOOLS_DOM LOCKNEXT";
pub const LOCK_GEOMETRY: &str = "0 !DIGITALIS_LDTOOLS_DOM LOCKGEOM";

static NATURAL_ORDER: [usize; 4] = [0, 1, 2, 3];

/// Serializer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    pub standards: CodeStandards,
    /// Emitted in place of colour 16.
    pub override_colour: u32,
    pub winding: WindingDirection,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            standards: CodeStandards::Full,
            override_colour: MAIN_COLOUR,
            winding: WindingDirection::Normal,
        }
    }
}

impl SerializerConfig {
    pub fn with_standards(standards: CodeStandards) -> Self {
        Self {
            standards,
            ..Self::default()
        }
    }
}

/// LDraw code generator
pub struct CodeSerializer {
    config: SerializerConfig,
}

impl CodeSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Code for the subtree at `id`
    pub fn serialize(&self, doc: &Document, id: ObjectId) -> Result<String> {
        let mut output = String::with_capacity(1024);
        self.write(doc, id, &Matrix4d::IDENTITY, &mut output)?;
        Ok(output)
    }

    /// Append code for `id` with every coordinate passed through `transform`
    pub fn write(&self, doc: &Document, id: ObjectId, transform: &Matrix4d, output: &mut String) -> Result<()> {
        self.serialize_node(doc, id, transform, output)
    }

    fn decorate(&self) -> bool {
        self.config.standards.allows_decorators()
    }

    fn serialize_node(&self, doc: &Document, id: ObjectId, transform: &Matrix4d, output: &mut String) -> Result<()> {
        let node = doc.node(id)?;

        match &node.data {
            NodeData::Document => {
                let pages = &node.children;
                let wrap = pages.len() > 1 && self.decorate();
                for &page in pages {
                    if wrap {
                        push_line(output, &format!("0 FILE {}", doc.name(page)?));
                    }
                    self.serialize_node(doc, page, transform, output)?;
                    if wrap {
                        push_line(output, "0 NOFILE");
                    }
                }
            }
            NodeData::Page(page) => {
                if !page.title.is_empty() {
                    push_line(output, &format!("0 {}", page.title));
                }
                push_line(output, &format!("0 Name: {}", page.name));
                if !page.author.is_empty() {
                    push_line(output, &format!("0 Author: {}", page.author));
                }
                if page.page_type != PageType::Model {
                    push_line(output, &format!("0 !LDRAW_ORG {}", page.page_type.keyword()));
                }
                for (i, &step) in node.children.iter().enumerate() {
                    self.serialize_node(doc, step, transform, output)?;
                    if i + 1 < node.children.len() {
                        push_line(output, "0 STEP");
                    }
                }
            }
            NodeData::Step => {
                for &child in &node.children {
                    self.serialize_node(doc, child, transform, output)?;
                }
            }
            NodeData::Material(material) => {
                push_line(output, &format!("0 {}", material.to_code()));
            }
            _ => self.serialize_element(doc, id, transform, output)?,
        }

        Ok(())
    }

    /// A leaf element with its decorator lines.
    fn serialize_element(&self, doc: &Document, id: ObjectId, transform: &Matrix4d, output: &mut String) -> Result<()> {
        let node = doc.node(id)?;
        let decorate = self.decorate();
        if !decorate && node.kind() == ElementKind::Group {
            return Ok(());
        }

        let (visible, ghosted, geometry_locked) = match &node.data {
            NodeData::Graphic(g) => (g.visible, g.ghosted, g.geometry_locked),
            NodeData::Reference(r) => (r.visible, r.ghosted, r.geometry_locked),
            _ => (true, false, false),
        };

        if decorate && node.local_lock {
            push_line(output, LOCK_NEXT);
        }
        if decorate && geometry_locked {
            push_line(output, LOCK_GEOMETRY);
        }
        if decorate {
            if let Some(group) = node.group {
                push_line(output, &format!("0 MLCAD BTG {}", doc.name(group)?));
            }
        }

        let mut line = String::new();
        if decorate && ghosted {
            line.push_str("0 GHOST ");
        }
        if decorate && !visible {
            line.push_str("0 MLCAD HIDE ");
        }

        match &node.data {
            NodeData::Comment(comment) => {
                if comment.text.is_empty() {
                    line.push('0');
                } else {
                    let _ = write!(line, "0 {}", comment.text);
                }
            }
            NodeData::Graphic(graphic) => self.graphic_line(doc, id, graphic, transform, &mut line),
            NodeData::Reference(reference) => {
                self.reference_line(doc, id, reference, transform, &mut line)
            }
            NodeData::Group(group) => {
                let members = doc.group_member_count(id)?;
                let _ = write!(line, "0 GROUP {} {}", members, group.name);
            }
            NodeData::Colour(colour) => self.colour_line(doc, colour, &mut line)?,
            _ => {}
        }
        push_line(output, &line);
        Ok(())
    }

    fn graphic_line(&self, doc: &Document, id: ObjectId, graphic: &Graphic, transform: &Matrix4d, line: &mut String) {
        let line_type = graphic
            .kind
            .element_kind()
            .descriptor()
            .line_type
            .unwrap_or_default();
        let _ = write!(
            line,
            "{} {}",
            line_type,
            self.colour_text(doc, id, graphic.colour)
        );

        // a mirroring transform turns the faces over
        let winding = if transform.determinant3() < 0.0 {
            self.config.winding.flipped()
        } else {
            self.config.winding
        };
        let c = &graphic.coordinates;
        let order: &[usize] = match (graphic.kind, winding) {
            (GraphicKind::Triangle, WindingDirection::Reversed) => &[0, 2, 1],
            (GraphicKind::Quadrilateral, WindingDirection::Reversed) => &[0, 3, 2, 1],
            _ => &NATURAL_ORDER[..c.len()],
        };
        for &i in order {
            let p = transform.transform_point(c[i]);
            let _ = write!(
                line,
                " {} {} {}",
                format_number(p.x),
                format_number(p.y),
                format_number(p.z)
            );
        }
    }

    fn reference_line(&self, doc: &Document, id: ObjectId, reference: &Reference, transform: &Matrix4d, line: &mut String) {
        let matrix = *transform * reference.matrix;
        let _ = write!(line, "1 {}", self.colour_text(doc, id, reference.colour));
        for value in matrix.to_ldraw() {
            let _ = write!(line, " {}", format_number(value));
        }
        let _ = write!(line, " {}", reference.target);
    }

    fn colour_line(&self, doc: &Document, colour: &ColourData, line: &mut String) -> Result<()> {
        let _ = write!(
            line,
            "0 !COLOUR {} CODE {} VALUE {} EDGE {}",
            colour.name,
            colour.code,
            colour.value.to_hex(),
            colour.edge.to_hex()
        );
        if !colour.value.is_opaque() {
            let _ = write!(line, " ALPHA {}", colour.value.a);
        }
        if let Some(luminance) = colour.luminance {
            let _ = write!(line, " LUMINANCE {}", luminance);
        }
        let finish = doc.material_params(colour.material)?.to_code();
        if !finish.is_empty() {
            line.push(' ');
            line.push_str(&finish);
        }
        Ok(())
    }

    /// Colour code as written: 16 becomes the override colour, and in
    /// parts-library mode a code defined earlier in the page becomes a
    /// direct colour.
    fn colour_text(&self, doc: &Document, id: ObjectId, code: u32) -> String {
        let code = if code == MAIN_COLOUR {
            self.config.override_colour
        } else {
            code
        };
        if self.config.standards == CodeStandards::PartsLibrary && !is_direct_colour(code) {
            if let Some(value) = doc.local_colour(id, code) {
                return format_colour_code(value.to_direct_code());
            }
        }
        format_colour_code(code)
    }
}

impl Default for CodeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn push_line(output: &mut String, line: &str) {
    output.push_str(line);
    output.push_str(LINE_END);
}

impl Document {
    /// LDraw code for the subtree at `id`.
    pub fn to_code(&self, id: ObjectId, standards: CodeStandards) -> Result<String> {
        CodeSerializer::with_config(SerializerConfig::with_standards(standards)).serialize(self, id)
    }

    /// Append code for `id` to `output`, transformed by `transform`.
    pub fn write_code(
        &self,
        id: ObjectId,
        output: &mut String,
        config: &SerializerConfig,
        transform: &Matrix4d,
    ) -> Result<()> {
        CodeSerializer::with_config(config.clone()).write(self, id, transform, output)
    }

    /// RGBA of palette code `code` as defined by a `Colour` element earlier
    /// in the same page as `id`.
    pub fn local_colour(&self, id: ObjectId, code: u32) -> Option<crate::colour::Rgba> {
        let page = self.page_of(id).ok()??;
        let mut found = None;
        for element in self.page_elements(page).ok()? {
            if element == id {
                break;
            }
            if let Some(colour) = self.node(element).ok()?.as_colour() {
                if colour.code == code {
                    found = Some(colour.value);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colour::Rgba;
    use crate::geom::Vector3d;

    fn model() -> (Document, ObjectId, ObjectId) {
        let mut doc = Document::new();
        let page = doc.create_page("model.ldr").unwrap();
        let step = doc.create_step();
        doc.add(doc.root(), page).unwrap();
        doc.add(page, step).unwrap();
        (doc, page, step)
    }

    fn triangle(doc: &mut Document, colour: u32) -> ObjectId {
        doc.create_triangle(
            colour,
            [
                Vector3d::new(1.0, 2.0, 3.0),
                Vector3d::new(4.0, 5.0, 6.0),
                Vector3d::new(7.0, 8.0, 9.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_triangle_line_and_winding() {
        let (mut doc, _page, step) = model();
        let tri = triangle(&mut doc, 4);
        doc.add(step, tri).unwrap();

        assert_eq!(
            doc.to_code(tri, CodeStandards::Full).unwrap(),
            "3 4 1 2 3 4 5 6 7 8 9\r\n"
        );

        let config = SerializerConfig {
            winding: WindingDirection::Reversed,
            ..SerializerConfig::default()
        };
        let mut out = String::new();
        doc.write_code(tri, &mut out, &config, &Matrix4d::IDENTITY).unwrap();
        assert_eq!(out, "3 4 1 2 3 7 8 9 4 5 6\r\n");
    }

    #[test]
    fn test_mirror_transform_flips_winding() {
        let (mut doc, _page, step) = model();
        let tri = triangle(&mut doc, 4);
        doc.add(step, tri).unwrap();

        let mirror = Matrix4d::from_ldraw([0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let mut out = String::new();
        doc.write_code(tri, &mut out, &SerializerConfig::default(), &mirror)
            .unwrap();
        assert_eq!(out, "3 4 -1 2 3 -7 8 9 -4 5 6\r\n");
    }

    #[test]
    fn test_override_colour_and_transform() {
        let (mut doc, _page, step) = model();
        let tri = triangle(&mut doc, 16);
        doc.add(step, tri).unwrap();

        let config = SerializerConfig {
            override_colour: 2,
            ..SerializerConfig::default()
        };
        let mut out = String::new();
        let shift = Matrix4d::translation(Vector3d::new(10.0, 0.0, 0.0));
        doc.write_code(tri, &mut out, &config, &shift).unwrap();
        assert_eq!(out, "3 2 11 2 3 14 5 6 17 8 9\r\n");
    }

    #[test]
    fn test_decorators_follow_standards() {
        let (mut doc, _page, step) = model();
        let tri = triangle(&mut doc, 4);
        doc.add(step, tri).unwrap();
        doc.set_ghosted(tri, true).unwrap();
        doc.set_visible(tri, false).unwrap();
        doc.set_locked(tri, true).unwrap();

        assert_eq!(
            doc.to_code(tri, CodeStandards::Full).unwrap(),
            "0 !DIGITALIS_LDTOOLS_DOM LOCKNEXT\r\n0 GHOST 0 MLCAD HIDE 3 4 1 2 3 4 5 6 7 8 9\r\n"
        );
        assert_eq!(
            doc.to_code(tri, CodeStandards::PartsLibrary).unwrap(),
            "3 4 1 2 3 4 5 6 7 8 9\r\n"
        );
    }

    #[test]
    fn test_group_lines() {
        let (mut doc, _page, step) = model();
        let group = doc.create_group("Wheels").unwrap();
        let tri = triangle(&mut doc, 4);
        doc.add_range(step, &[group, tri]).unwrap();
        doc.group_add(group, tri).unwrap();

        assert_eq!(
            doc.to_code(step, CodeStandards::Full).unwrap(),
            "0 GROUP 1 Wheels\r\n0 MLCAD BTG Wheels\r\n3 4 1 2 3 4 5 6 7 8 9\r\n"
        );
        assert_eq!(
            doc.to_code(step, CodeStandards::PartsLibrary).unwrap(),
            "3 4 1 2 3 4 5 6 7 8 9\r\n"
        );
        assert_eq!(doc.to_code(group, CodeStandards::PartsLibrary).unwrap(), "");
    }

    #[test]
    fn test_local_palette_in_parts_library() {
        let (mut doc, _page, step) = model();
        let colour = doc
            .create_colour("Custom", 500, Rgba::rgb(0x12, 0x34, 0x56), Rgba::rgb(0, 0, 0))
            .unwrap();
        let tri = triangle(&mut doc, 500);
        doc.add_range(step, &[colour, tri]).unwrap();

        assert!(doc
            .to_code(tri, CodeStandards::PartsLibrary)
            .unwrap()
            .starts_with("3 #2123456 "));
        assert!(doc.to_code(tri, CodeStandards::Full).unwrap().starts_with("3 500 "));
    }

    #[test]
    fn test_page_header_and_steps() {
        let (mut doc, page, step) = model();
        doc.set_title(page, "Little car").unwrap();
        doc.set_author(page, "Jane Doe").unwrap();
        let comment = doc.create_comment("hello").unwrap();
        doc.add(step, comment).unwrap();
        let second = doc.create_step();
        doc.add(page, second).unwrap();

        assert_eq!(
            doc.to_code(page, CodeStandards::Full).unwrap(),
            "0 Little car\r\n0 Name: model.ldr\r\n0 Author: Jane Doe\r\n0 hello\r\n0 STEP\r\n"
        );
    }

    #[test]
    fn test_multi_page_document() {
        let (mut doc, _page, _step) = model();
        let part = doc.create_page("part.dat").unwrap();
        doc.add(doc.root(), part).unwrap();
        doc.set_page_type(part, PageType::Part).unwrap();

        let code = doc.to_code(doc.root(), CodeStandards::Full).unwrap();
        assert_eq!(
            code,
            "0 FILE model.ldr\r\n0 Name: model.ldr\r\n0 NOFILE\r\n\
             0 FILE part.dat\r\n0 Name: part.dat\r\n0 !LDRAW_ORG Part\r\n0 NOFILE\r\n"
        );
    }

    #[test]
    fn test_colour_definition() {
        let mut doc = Document::new();
        let colour = doc
            .create_colour(
                "Trans_Clear",
                47,
                Rgba::rgb(0xFC, 0xFC, 0xFC).with_alpha(128),
                Rgba::rgb(0xC3, 0xC3, 0xC3),
            )
            .unwrap();
        assert_eq!(
            doc.to_code(colour, CodeStandards::Full).unwrap(),
            "0 !COLOUR Trans_Clear CODE 47 VALUE #FCFCFC EDGE #C3C3C3 ALPHA 128\r\n"
        );
    }
}
