//! Observable properties
//!
//! Every settable value goes through `write_property`: permission checks,
//! no-op detection, validation, store, undo record, events. The typed
//! accessors below are thin wrappers over it.

use crate::colour::{is_valid_colour_value, Rgba};
use crate::document::Document;
use crate::error::{DomError, Result};
use crate::geom::{Matrix4d, Vector3d};
use crate::material::{is_valid_fraction, Material};
use crate::node::NodeData;
use crate::types::{Coordinates, ElementKind, ObjectId, PageType, Property, PropertyValue};
use crate::undo::Edit;

/// Single-line text. `required` also rejects blank text.
pub(crate) fn validate_line_text(text: &str, required: bool) -> Result<()> {
    if text.contains(['\r', '\n']) {
        return Err(DomError::InvalidArgument(
            "text must fit on one line".to_string(),
        ));
    }
    if required && text.trim().is_empty() {
        return Err(DomError::InvalidArgument("name must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_coordinates(expected: usize, coordinates: &[Vector3d]) -> Result<()> {
    if coordinates.len() != expected {
        return Err(DomError::CoordinateCount {
            expected,
            actual: coordinates.len(),
        });
    }
    if !coordinates.iter().all(|v| v.is_finite()) {
        return Err(DomError::InvalidArgument(
            "coordinates must be finite".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_matrix(matrix: &Matrix4d) -> Result<()> {
    if !matrix.is_finite() {
        return Err(DomError::InvalidArgument("matrix must be finite".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_target_name(target: &str) -> Result<()> {
    validate_line_text(target, true)
}

/// `!COLOUR` names are a single token.
pub(crate) fn validate_colour_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(DomError::InvalidArgument(format!(
            "colour name '{}' must be one word",
            name
        )));
    }
    Ok(())
}

/// Palette codes; direct colours cannot be defined.
pub(crate) fn validate_colour_code(code: u32) -> Result<()> {
    if code >= 0x200_0000 {
        return Err(DomError::InvalidArgument(format!(
            "{} is not a palette code",
            code
        )));
    }
    Ok(())
}

fn validate_size(value: f64) -> Result<()> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(DomError::InvalidArgument(format!(
            "size {} must be positive",
            value
        )));
    }
    Ok(())
}

fn mismatch(property: Property, value: &PropertyValue) -> DomError {
    DomError::InvalidArgument(format!("{:?} cannot hold {:?}", property, value))
}

impl Document {
    /// Current value of `property` on `id`.
    pub fn property(&self, id: ObjectId, property: Property) -> Result<PropertyValue> {
        use PropertyValue as V;

        let node = self.node(id)?;
        let descriptor = node.kind().descriptor();
        let value = match (property, &node.data) {
            (Property::Parent, _) => Some(V::Link(node.parent)),
            (Property::Group, _) if descriptor.is_groupable => Some(V::Link(node.group)),
            (Property::IsLocked, _) if descriptor.is_element => Some(V::Bool(node.local_lock)),

            (Property::IsGeometryLocked, NodeData::Graphic(g)) => Some(V::Bool(g.geometry_locked)),
            (Property::IsVisible, NodeData::Graphic(g)) => Some(V::Bool(g.visible)),
            (Property::IsGhosted, NodeData::Graphic(g)) => Some(V::Bool(g.ghosted)),
            (Property::ColourValue, NodeData::Graphic(g)) => Some(V::Code(g.colour)),
            (Property::Coordinates, NodeData::Graphic(g)) => Some(V::Coordinates(g.coordinates.clone())),

            (Property::IsGeometryLocked, NodeData::Reference(r)) => Some(V::Bool(r.geometry_locked)),
            (Property::IsVisible, NodeData::Reference(r)) => Some(V::Bool(r.visible)),
            (Property::IsGhosted, NodeData::Reference(r)) => Some(V::Bool(r.ghosted)),
            (Property::ColourValue, NodeData::Reference(r)) => Some(V::Code(r.colour)),
            (Property::Matrix, NodeData::Reference(r)) => Some(V::Matrix(r.matrix)),
            (Property::TargetName, NodeData::Reference(r)) => Some(V::Text(r.target.clone())),

            (Property::Text, NodeData::Comment(c)) => Some(V::Text(c.text.clone())),

            (Property::Name, NodeData::Page(p)) => Some(V::Text(p.name.clone())),
            (Property::Title, NodeData::Page(p)) => Some(V::Text(p.title.clone())),
            (Property::Author, NodeData::Page(p)) => Some(V::Text(p.author.clone())),
            (Property::PageType, NodeData::Page(p)) => Some(V::PageType(p.page_type)),

            (Property::Name, NodeData::Group(g)) => Some(V::Text(g.name.clone())),

            (Property::Name, NodeData::Colour(c)) => Some(V::Text(c.name.clone())),
            (Property::Code, NodeData::Colour(c)) => Some(V::Code(c.code)),
            (Property::Value, NodeData::Colour(c)) => Some(V::Rgba(c.value)),
            (Property::EdgeValue, NodeData::Colour(c)) => Some(V::Rgba(c.edge)),
            (Property::Luminance, NodeData::Colour(c)) => Some(V::Luminance(c.luminance)),
            (Property::Material, NodeData::Colour(c)) => Some(V::Link(Some(c.material))),

            (Property::MaterialValue, NodeData::Material(m)) => m.value().map(V::Rgba),
            (Property::Fraction, NodeData::Material(m)) => m.fraction().map(V::Number),
            (Property::VFraction, NodeData::Material(Material::Glitter(p))) => Some(V::Number(p.vfraction)),
            (Property::Size, NodeData::Material(Material::Glitter(p))) => Some(V::Number(p.size)),
            (Property::MinSize, NodeData::Material(Material::Speckle(p))) => Some(V::Number(p.min_size)),
            (Property::MaxSize, NodeData::Material(Material::Speckle(p))) => Some(V::Number(p.max_size)),
            _ => None,
        };
        value.ok_or_else(|| {
            DomError::NotSupported(format!("{} has no {:?} property", node.kind(), property))
        })
    }

    /// Set any property by value. Structural properties (parent, group,
    /// material) are routed to their own operations.
    pub fn set_property(&mut self, id: ObjectId, property: Property, value: PropertyValue) -> Result<()> {
        match (property, value) {
            (Property::Parent, PropertyValue::Link(parent)) => self.set_parent(id, parent),
            (Property::Group, PropertyValue::Link(group)) => self.set_group(id, group),
            (Property::Material, PropertyValue::Link(Some(material))) => self.set_material(id, material),
            (Property::MinSize, PropertyValue::Number(size)) => self.set_speckle_min_size(id, size),
            (Property::MaxSize, PropertyValue::Number(size)) => self.set_speckle_max_size(id, size),
            (Property::Fraction, PropertyValue::Number(f)) => self.set_material_fraction(id, f),
            (Property::VFraction, PropertyValue::Number(f)) => self.set_glitter_vfraction(id, f),
            (property, value) => self.set(id, property, value),
        }
    }

    fn set(&mut self, id: ObjectId, property: Property, value: PropertyValue) -> Result<()> {
        self.run_op(property.event_name(), |doc| doc.write_property(id, property, value))
    }

    /// May `property` of `id` be written right now?
    pub(crate) fn check_property_write(&self, id: ObjectId, property: Property) -> Result<()> {
        self.check_mutable(id)?;
        self.property(id, property)?;
        if property == Property::IsLocked && self.ancestor_locked(id) {
            return Err(DomError::Locked(id));
        }
        if !property.settable_when_locked() && self.is_locked(id)? {
            return Err(DomError::Locked(id));
        }
        if property.is_geometry()
            && self.property(id, Property::IsGeometryLocked)? == PropertyValue::Bool(true)
        {
            return Err(DomError::Locked(id));
        }
        Ok(())
    }

    pub(crate) fn write_property(&mut self, id: ObjectId, property: Property, value: PropertyValue) -> Result<()> {
        self.check_property_write(id, property)?;
        let old = self.property(id, property)?;
        if old == value {
            return Ok(());
        }
        self.validate_property(id, property, &value)?;
        self.store_property(id, property, value.clone())?;
        tracing::trace!(id, ?property, "property written");

        self.undo.record(Edit::Property {
            target: id,
            property,
            old: old.clone(),
            new: value.clone(),
        });
        self.emit_property(id, property, old, value);
        Ok(())
    }

    fn validate_property(&self, id: ObjectId, property: Property, value: &PropertyValue) -> Result<()> {
        use PropertyValue as V;

        let kind = self.kind(id)?;
        match (property, value) {
            (Property::ColourValue, V::Code(code)) => {
                if !is_valid_colour_value(*code) {
                    return Err(DomError::InvalidArgument(format!(
                        "colour value {} out of range",
                        code
                    )));
                }
            }
            (Property::Coordinates, V::Coordinates(c)) => {
                validate_coordinates(kind.descriptor().coordinates_count, c)?
            }
            (Property::Matrix, V::Matrix(m)) => validate_matrix(m)?,
            (Property::TargetName, V::Text(t)) => validate_target_name(t)?,
            (Property::Text | Property::Title | Property::Author, V::Text(t)) => {
                validate_line_text(t, false)?
            }
            (Property::Name, V::Text(name)) => match kind {
                ElementKind::Colour => validate_colour_name(name)?,
                ElementKind::Page => {
                    validate_line_text(name, true)?;
                    if let Some(parent) = self.node(id)?.parent {
                        let taken = self.node(parent)?.children.iter().any(|&sibling| {
                            sibling != id
                                && self
                                    .node(sibling)
                                    .ok()
                                    .and_then(|n| n.as_page())
                                    .is_some_and(|p| p.name.eq_ignore_ascii_case(name))
                        });
                        if taken {
                            return Err(DomError::DuplicateName(name.clone()));
                        }
                    }
                }
                _ => {
                    validate_line_text(name, true)?;
                    if self.group_name_taken(self.group_scope(id), name, &[id]) {
                        return Err(DomError::DuplicateName(name.clone()));
                    }
                }
            },
            (Property::Code, V::Code(code)) => validate_colour_code(*code)?,
            (Property::Fraction | Property::VFraction, V::Number(f)) => {
                if !is_valid_fraction(*f) {
                    return Err(DomError::InvalidArgument(format!(
                        "fraction {} outside (0,1)",
                        f
                    )));
                }
            }
            (Property::Size | Property::MinSize | Property::MaxSize, V::Number(size)) => {
                validate_size(*size)?
            }
            _ => {}
        }
        Ok(())
    }

    fn store_property(&mut self, id: ObjectId, property: Property, value: PropertyValue) -> Result<()> {
        use PropertyValue as V;

        let err = mismatch(property, &value);
        let node = self.node_mut(id)?;
        match (property, value, &mut node.data) {
            (Property::IsLocked, V::Bool(b), _) => node.local_lock = b,

            (Property::IsGeometryLocked, V::Bool(b), NodeData::Graphic(g)) => g.geometry_locked = b,
            (Property::IsVisible, V::Bool(b), NodeData::Graphic(g)) => g.visible = b,
            (Property::IsGhosted, V::Bool(b), NodeData::Graphic(g)) => g.ghosted = b,
            (Property::ColourValue, V::Code(c), NodeData::Graphic(g)) => g.colour = c,
            (Property::Coordinates, V::Coordinates(c), NodeData::Graphic(g)) => g.coordinates = c,

            (Property::IsGeometryLocked, V::Bool(b), NodeData::Reference(r)) => r.geometry_locked = b,
            (Property::IsVisible, V::Bool(b), NodeData::Reference(r)) => r.visible = b,
            (Property::IsGhosted, V::Bool(b), NodeData::Reference(r)) => r.ghosted = b,
            (Property::ColourValue, V::Code(c), NodeData::Reference(r)) => r.colour = c,
            (Property::Matrix, V::Matrix(m), NodeData::Reference(r)) => r.matrix = m,
            (Property::TargetName, V::Text(t), NodeData::Reference(r)) => r.target = t,

            (Property::Text, V::Text(t), NodeData::Comment(c)) => c.text = t,

            (Property::Name, V::Text(t), NodeData::Page(p)) => p.name = t,
            (Property::Title, V::Text(t), NodeData::Page(p)) => p.title = t,
            (Property::Author, V::Text(t), NodeData::Page(p)) => p.author = t,
            (Property::PageType, V::PageType(t), NodeData::Page(p)) => p.page_type = t,

            (Property::Name, V::Text(t), NodeData::Group(g)) => g.name = t,

            (Property::Name, V::Text(t), NodeData::Colour(c)) => c.name = t,
            (Property::Code, V::Code(code), NodeData::Colour(c)) => c.code = code,
            (Property::Value, V::Rgba(v), NodeData::Colour(c)) => c.value = v,
            (Property::EdgeValue, V::Rgba(v), NodeData::Colour(c)) => c.edge = v,
            (Property::Luminance, V::Luminance(l), NodeData::Colour(c)) => c.luminance = l,

            (Property::MaterialValue, V::Rgba(v), NodeData::Material(Material::Glitter(p))) => p.value = v,
            (Property::MaterialValue, V::Rgba(v), NodeData::Material(Material::Speckle(p))) => p.value = v,
            (Property::Fraction, V::Number(f), NodeData::Material(Material::Glitter(p))) => p.fraction = f,
            (Property::Fraction, V::Number(f), NodeData::Material(Material::Speckle(p))) => p.fraction = f,
            (Property::VFraction, V::Number(f), NodeData::Material(Material::Glitter(p))) => p.vfraction = f,
            (Property::Size, V::Number(s), NodeData::Material(Material::Glitter(p))) => p.size = s,
            (Property::MinSize, V::Number(s), NodeData::Material(Material::Speckle(p))) => p.min_size = s,
            (Property::MaxSize, V::Number(s), NodeData::Material(Material::Speckle(p))) => p.max_size = s,
            _ => return Err(err),
        }
        Ok(())
    }

    // ----- typed reads -------------------------------------------------------

    fn read_bool(&self, id: ObjectId, property: Property) -> Result<bool> {
        match self.property(id, property)? {
            PropertyValue::Bool(b) => Ok(b),
            other => Err(mismatch(property, &other)),
        }
    }

    fn read_code(&self, id: ObjectId, property: Property) -> Result<u32> {
        match self.property(id, property)? {
            PropertyValue::Code(c) => Ok(c),
            other => Err(mismatch(property, &other)),
        }
    }

    fn read_text(&self, id: ObjectId, property: Property) -> Result<String> {
        match self.property(id, property)? {
            PropertyValue::Text(t) => Ok(t),
            other => Err(mismatch(property, &other)),
        }
    }

    fn read_number(&self, id: ObjectId, property: Property) -> Result<f64> {
        match self.property(id, property)? {
            PropertyValue::Number(n) => Ok(n),
            other => Err(mismatch(property, &other)),
        }
    }

    fn read_rgba(&self, id: ObjectId, property: Property) -> Result<Rgba> {
        match self.property(id, property)? {
            PropertyValue::Rgba(v) => Ok(v),
            other => Err(mismatch(property, &other)),
        }
    }

    // ----- graphics and references -------------------------------------------

    pub fn colour_value(&self, id: ObjectId) -> Result<u32> {
        self.read_code(id, Property::ColourValue)
    }

    pub fn set_colour_value(&mut self, id: ObjectId, colour: u32) -> Result<()> {
        self.set(id, Property::ColourValue, PropertyValue::Code(colour))
    }

    pub fn coordinates(&self, id: ObjectId) -> Result<Coordinates> {
        match self.property(id, Property::Coordinates)? {
            PropertyValue::Coordinates(c) => Ok(c),
            other => Err(mismatch(Property::Coordinates, &other)),
        }
    }

    pub fn set_coordinates(&mut self, id: ObjectId, coordinates: &[Vector3d]) -> Result<()> {
        let value = PropertyValue::Coordinates(coordinates.iter().copied().collect());
        self.set(id, Property::Coordinates, value)
    }

    pub fn vertex(&self, id: ObjectId, index: usize) -> Result<Vector3d> {
        let coordinates = self.coordinates(id)?;
        coordinates.get(index).copied().ok_or(DomError::OutOfRange {
            index,
            len: coordinates.len(),
        })
    }

    /// Move one vertex, leaving the others alone.
    pub fn set_vertex(&mut self, id: ObjectId, index: usize, vertex: Vector3d) -> Result<()> {
        let mut coordinates = self.coordinates(id)?;
        let len = coordinates.len();
        let slot = coordinates
            .get_mut(index)
            .ok_or(DomError::OutOfRange { index, len })?;
        *slot = vertex;
        self.set(id, Property::Coordinates, PropertyValue::Coordinates(coordinates))
    }

    pub fn is_visible(&self, id: ObjectId) -> Result<bool> {
        self.read_bool(id, Property::IsVisible)
    }

    pub fn set_visible(&mut self, id: ObjectId, visible: bool) -> Result<()> {
        self.set(id, Property::IsVisible, PropertyValue::Bool(visible))
    }

    pub fn is_ghosted(&self, id: ObjectId) -> Result<bool> {
        self.read_bool(id, Property::IsGhosted)
    }

    pub fn set_ghosted(&mut self, id: ObjectId, ghosted: bool) -> Result<()> {
        self.set(id, Property::IsGhosted, PropertyValue::Bool(ghosted))
    }

    pub fn is_geometry_locked(&self, id: ObjectId) -> Result<bool> {
        self.read_bool(id, Property::IsGeometryLocked)
    }

    /// Protect coordinates or matrix while leaving other properties editable.
    pub fn set_geometry_locked(&mut self, id: ObjectId, locked: bool) -> Result<()> {
        self.set(id, Property::IsGeometryLocked, PropertyValue::Bool(locked))
    }

    pub fn matrix(&self, id: ObjectId) -> Result<Matrix4d> {
        match self.property(id, Property::Matrix)? {
            PropertyValue::Matrix(m) => Ok(m),
            other => Err(mismatch(Property::Matrix, &other)),
        }
    }

    pub fn set_matrix(&mut self, id: ObjectId, matrix: Matrix4d) -> Result<()> {
        self.set(id, Property::Matrix, PropertyValue::Matrix(matrix))
    }

    pub fn target_name(&self, id: ObjectId) -> Result<String> {
        self.read_text(id, Property::TargetName)
    }

    pub fn set_target_name(&mut self, id: ObjectId, target: &str) -> Result<()> {
        self.set(id, Property::TargetName, PropertyValue::Text(target.to_string()))
    }

    // ----- locking -----------------------------------------------------------

    /// Lock or unlock `id`. Fails while an ancestor holds a lock.
    pub fn set_locked(&mut self, id: ObjectId, locked: bool) -> Result<()> {
        self.set(id, Property::IsLocked, PropertyValue::Bool(locked))
    }

    // ----- comments, pages, groups -------------------------------------------

    pub fn text(&self, id: ObjectId) -> Result<String> {
        self.read_text(id, Property::Text)
    }

    pub fn set_text(&mut self, id: ObjectId, text: &str) -> Result<()> {
        self.set(id, Property::Text, PropertyValue::Text(text.to_string()))
    }

    /// Name of a page, group or colour.
    pub fn name(&self, id: ObjectId) -> Result<String> {
        self.read_text(id, Property::Name)
    }

    pub fn set_name(&mut self, id: ObjectId, name: &str) -> Result<()> {
        self.set(id, Property::Name, PropertyValue::Text(name.to_string()))
    }

    pub fn title(&self, page: ObjectId) -> Result<String> {
        self.read_text(page, Property::Title)
    }

    pub fn set_title(&mut self, page: ObjectId, title: &str) -> Result<()> {
        self.set(page, Property::Title, PropertyValue::Text(title.to_string()))
    }

    pub fn author(&self, page: ObjectId) -> Result<String> {
        self.read_text(page, Property::Author)
    }

    pub fn set_author(&mut self, page: ObjectId, author: &str) -> Result<()> {
        self.set(page, Property::Author, PropertyValue::Text(author.to_string()))
    }

    pub fn page_type(&self, page: ObjectId) -> Result<PageType> {
        match self.property(page, Property::PageType)? {
            PropertyValue::PageType(t) => Ok(t),
            other => Err(mismatch(Property::PageType, &other)),
        }
    }

    pub fn set_page_type(&mut self, page: ObjectId, page_type: PageType) -> Result<()> {
        self.set(page, Property::PageType, PropertyValue::PageType(page_type))
    }

    // ----- colours -----------------------------------------------------------

    pub fn colour_code(&self, colour: ObjectId) -> Result<u32> {
        self.read_code(colour, Property::Code)
    }

    pub fn set_colour_code(&mut self, colour: ObjectId, code: u32) -> Result<()> {
        self.set(colour, Property::Code, PropertyValue::Code(code))
    }

    pub fn colour_rgba(&self, colour: ObjectId) -> Result<Rgba> {
        self.read_rgba(colour, Property::Value)
    }

    pub fn set_colour_rgba(&mut self, colour: ObjectId, value: Rgba) -> Result<()> {
        self.set(colour, Property::Value, PropertyValue::Rgba(value))
    }

    pub fn edge_rgba(&self, colour: ObjectId) -> Result<Rgba> {
        self.read_rgba(colour, Property::EdgeValue)
    }

    pub fn set_edge_rgba(&mut self, colour: ObjectId, value: Rgba) -> Result<()> {
        self.set(colour, Property::EdgeValue, PropertyValue::Rgba(value))
    }

    pub fn luminance(&self, colour: ObjectId) -> Result<Option<u8>> {
        match self.property(colour, Property::Luminance)? {
            PropertyValue::Luminance(l) => Ok(l),
            other => Err(mismatch(Property::Luminance, &other)),
        }
    }

    pub fn set_luminance(&mut self, colour: ObjectId, luminance: Option<u8>) -> Result<()> {
        self.set(colour, Property::Luminance, PropertyValue::Luminance(luminance))
    }

    /// The material node owned by `colour`.
    pub fn material(&self, colour: ObjectId) -> Result<ObjectId> {
        match self.property(colour, Property::Material)? {
            PropertyValue::Link(Some(material)) => Ok(material),
            other => Err(mismatch(Property::Material, &other)),
        }
    }

    /// Give `colour` the material node `material`. A material owned by
    /// another colour is taken from it, and that colour gets a plastic one.
    pub fn set_material(&mut self, colour: ObjectId, material: ObjectId) -> Result<()> {
        self.run_op(Property::Material.event_name(), |doc| {
            doc.check_property_write(colour, Property::Material)?;
            doc.attach_material(colour, material)
        })
    }

    pub(crate) fn attach_material(&mut self, colour: ObjectId, material: ObjectId) -> Result<()> {
        let kind = self.kind(material)?;
        if kind != ElementKind::Material {
            return Err(DomError::wrong_kind("Material", kind));
        }
        self.check_mutable(material)?;
        let old = self.material(colour)?;
        if old == material {
            return Ok(());
        }
        if let Some(owner) = self.node(material)?.parent {
            self.check_property_write(owner, Property::Material)?;
            let fresh = self.create_material(Material::Plastic);
            self.attach_material(owner, fresh)?;
        }
        self.attach_material_unchecked(colour, material)?;
        self.undo.record(Edit::Property {
            target: colour,
            property: Property::Material,
            old: PropertyValue::Link(Some(old)),
            new: PropertyValue::Link(Some(material)),
        });
        Ok(())
    }

    /// Finish parameters of a material node.
    pub fn material_params(&self, material: ObjectId) -> Result<Material> {
        let node = self.node(material)?;
        node.as_material()
            .cloned()
            .ok_or_else(|| DomError::wrong_kind("Material", node.kind()))
    }

    pub fn set_material_value(&mut self, material: ObjectId, value: Rgba) -> Result<()> {
        self.set(material, Property::MaterialValue, PropertyValue::Rgba(value))
    }

    /// Values outside (0,1) are ignored.
    pub fn set_material_fraction(&mut self, material: ObjectId, fraction: f64) -> Result<()> {
        if !is_valid_fraction(fraction) {
            self.check_property_write(material, Property::Fraction)?;
            tracing::debug!(material, fraction, "fraction ignored");
            return Ok(());
        }
        self.set(material, Property::Fraction, PropertyValue::Number(fraction))
    }

    /// Values outside (0,1) are ignored.
    pub fn set_glitter_vfraction(&mut self, material: ObjectId, fraction: f64) -> Result<()> {
        if !is_valid_fraction(fraction) {
            self.check_property_write(material, Property::VFraction)?;
            tracing::debug!(material, fraction, "vfraction ignored");
            return Ok(());
        }
        self.set(material, Property::VFraction, PropertyValue::Number(fraction))
    }

    pub fn set_glitter_size(&mut self, material: ObjectId, size: f64) -> Result<()> {
        self.set(material, Property::Size, PropertyValue::Number(size))
    }

    /// Raising the minimum above the maximum raises the maximum with it.
    pub fn set_speckle_min_size(&mut self, material: ObjectId, size: f64) -> Result<()> {
        validate_size(size)?;
        self.run_op(Property::MinSize.event_name(), |doc| {
            doc.check_property_write(material, Property::MinSize)?;
            if size > doc.read_number(material, Property::MaxSize)? {
                doc.write_property(material, Property::MaxSize, PropertyValue::Number(size))?;
            }
            doc.write_property(material, Property::MinSize, PropertyValue::Number(size))
        })
    }

    /// Lowering the maximum below the minimum lowers the minimum with it.
    pub fn set_speckle_max_size(&mut self, material: ObjectId, size: f64) -> Result<()> {
        validate_size(size)?;
        self.run_op(Property::MaxSize.event_name(), |doc| {
            doc.check_property_write(material, Property::MaxSize)?;
            if size < doc.read_number(material, Property::MinSize)? {
                doc.write_property(material, Property::MinSize, PropertyValue::Number(size))?;
            }
            doc.write_property(material, Property::MaxSize, PropertyValue::Number(size))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DomEvent, EventFilter};
    use crate::material::SpeckleParams;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn triangle(doc: &mut Document) -> ObjectId {
        doc.create_triangle(
            16,
            [
                Vector3d::ZERO,
                Vector3d::new(1.0, 0.0, 0.0),
                Vector3d::new(0.0, 1.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_set_and_read() {
        let mut doc = Document::new();
        let tri = triangle(&mut doc);

        doc.set_colour_value(tri, 4).unwrap();
        doc.set_vertex(tri, 2, Vector3d::new(0.0, 2.0, 0.0)).unwrap();
        doc.set_ghosted(tri, true).unwrap();

        assert_eq!(doc.colour_value(tri).unwrap(), 4);
        assert_eq!(doc.vertex(tri, 2).unwrap(), Vector3d::new(0.0, 2.0, 0.0));
        assert!(doc.is_ghosted(tri).unwrap());
        assert!(matches!(doc.vertex(tri, 3), Err(DomError::OutOfRange { .. })));
        assert!(matches!(doc.text(tri), Err(DomError::NotSupported(_))));
    }

    #[test]
    fn test_validation() {
        let mut doc = Document::new();
        let tri = triangle(&mut doc);
        assert!(matches!(
            doc.set_coordinates(tri, &[Vector3d::ZERO]),
            Err(DomError::CoordinateCount { expected: 3, actual: 1 })
        ));
        assert!(doc.set_colour_value(tri, 0x500_0000).is_err());
        assert!(doc
            .set_vertex(tri, 0, Vector3d::new(f64::NAN, 0.0, 0.0))
            .is_err());

        let comment = doc.create_comment("a").unwrap();
        assert!(doc.set_text(comment, "two\nlines").is_err());
        assert_eq!(doc.text(comment).unwrap(), "a");
    }

    #[test]
    fn test_unchanged_value_raises_nothing() {
        let mut doc = Document::new();
        let tri = triangle(&mut doc);
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        doc.subscribe(EventFilter::Source(tri), move |_, _| *sink.borrow_mut() += 1);

        doc.set_colour_value(tri, 16).unwrap();
        assert_eq!(*count.borrow(), 0);
        assert!(!doc.can_undo());

        doc.set_colour_value(tri, 1).unwrap();
        // typed event, then the generic one
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_typed_event_precedes_generic() {
        let mut doc = Document::new();
        let tri = triangle(&mut doc);
        let order = Rc::new(RefCell::new(Vec::new()));
        let sink = order.clone();
        doc.subscribe(EventFilter::Source(tri), move |_, event| {
            sink.borrow_mut().push(match event {
                DomEvent::PropertyChanged { .. } => "typed",
                DomEvent::Changed { .. } => "generic",
                _ => "other",
            });
        });
        doc.set_visible(tri, false).unwrap();
        assert_eq!(*order.borrow(), vec!["typed", "generic"]);
    }

    #[test]
    fn test_lock_rules() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let step = doc.create_step();
        let tri = triangle(&mut doc);
        doc.add(page, step).unwrap();
        doc.add(step, tri).unwrap();

        doc.set_locked(tri, true).unwrap();
        assert!(matches!(doc.set_colour_value(tri, 4), Err(DomError::Locked(_))));
        doc.set_geometry_locked(tri, true).unwrap();
        doc.set_locked(tri, false).unwrap();

        // geometry lock only guards coordinates
        doc.set_colour_value(tri, 4).unwrap();
        assert!(matches!(
            doc.set_vertex(tri, 0, Vector3d::new(5.0, 0.0, 0.0)),
            Err(DomError::Locked(_))
        ));

        doc.set_locked(page, true).unwrap();
        assert!(doc.is_locked(tri).unwrap());
        assert!(!doc.is_local_lock(tri).unwrap());
        assert!(matches!(doc.set_locked(tri, true), Err(DomError::Locked(_))));
    }

    #[test]
    fn test_names() {
        let mut doc = Document::new();
        let a = doc.create_page("a.ldr").unwrap();
        let b = doc.create_page("b.ldr").unwrap();
        doc.add_range(doc.root(), &[a, b]).unwrap();
        assert!(matches!(doc.set_name(b, "A.LDR"), Err(DomError::DuplicateName(_))));
        doc.set_name(b, "c.ldr").unwrap();

        let colour = doc
            .create_colour("Blue", 1, Rgba::rgb(0, 0x55, 0xBF), Rgba::rgb(0x33, 0x33, 0x33))
            .unwrap();
        assert!(doc.set_name(colour, "Dark Blue").is_err());
        assert!(doc.set_colour_code(colour, 0x200_0001).is_err());
        doc.set_colour_code(colour, 272).unwrap();
    }

    #[test]
    fn test_material_fraction_and_speckle_clamp() {
        let mut doc = Document::new();
        let material = doc.create_material(Material::Speckle(SpeckleParams::default()));

        doc.set_material_fraction(material, 1.5).unwrap();
        assert_eq!(doc.material_params(material).unwrap().fraction(), Some(0.4));

        doc.set_speckle_min_size(material, 5.0).unwrap();
        match doc.material_params(material).unwrap() {
            Material::Speckle(p) => {
                assert_eq!(p.min_size, 5.0);
                assert_eq!(p.max_size, 5.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        doc.set_speckle_max_size(material, 2.0).unwrap();
        match doc.material_params(material).unwrap() {
            Material::Speckle(p) => assert_eq!((p.min_size, p.max_size), (2.0, 2.0)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(doc.set_speckle_max_size(material, 0.0).is_err());

        // one undo step reverts both sizes
        doc.undo().unwrap();
        match doc.material_params(material).unwrap() {
            Material::Speckle(p) => assert_eq!((p.min_size, p.max_size), (5.0, 5.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_material_transfer() {
        let mut doc = Document::new();
        let red = doc
            .create_colour("Red", 4, Rgba::rgb(0xC9, 0x1A, 0x09), Rgba::rgb(0x33, 0x33, 0x33))
            .unwrap();
        let blue = doc
            .create_colour("Blue", 1, Rgba::rgb(0, 0x55, 0xBF), Rgba::rgb(0x33, 0x33, 0x33))
            .unwrap();
        let chrome = doc.create_material(Material::Chrome);
        doc.set_material(red, chrome).unwrap();
        assert_eq!(doc.material(red).unwrap(), chrome);

        doc.set_material(blue, chrome).unwrap();
        assert_eq!(doc.material(blue).unwrap(), chrome);
        let replacement = doc.material(red).unwrap();
        assert_ne!(replacement, chrome);
        assert_eq!(doc.material_params(replacement).unwrap(), Material::Plastic);

        doc.undo().unwrap();
        assert_eq!(doc.material(red).unwrap(), chrome);
        assert_eq!(doc.parent(chrome).unwrap(), Some(red));
    }

    #[test]
    fn test_undo_redo_property() {
        let mut doc = Document::new();
        let comment = doc.create_comment("first").unwrap();
        doc.set_text(comment, "second").unwrap();
        assert_eq!(doc.undo_name(), Some("TextChanged"));

        doc.undo().unwrap();
        assert_eq!(doc.text(comment).unwrap(), "first");
        doc.redo().unwrap();
        assert_eq!(doc.text(comment).unwrap(), "second");
    }

    #[test]
    fn test_undo_refused_when_frozen() {
        let mut doc = Document::new();
        let comment = doc.create_comment("first").unwrap();
        doc.set_text(comment, "second").unwrap();
        doc.freeze(comment).unwrap();

        assert!(matches!(doc.undo(), Err(DomError::Frozen(_))));
        assert_eq!(doc.text(comment).unwrap(), "second");
        assert!(doc.can_undo());
    }
}
