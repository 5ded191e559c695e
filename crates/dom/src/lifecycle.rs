//! Freezing and disposal.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::events::{CollectionChange, DomEvent};
use crate::material::Material;
use crate::node::NodeData;
use crate::types::{ElementKind, NodeState, ObjectId, Property, PropertyValue};

impl Document {
    /// Make `id` and everything below it permanently immutable.
    /// Freezing something already frozen is a no-op.
    pub fn freeze(&mut self, id: ObjectId) -> Result<()> {
        if self.is_frozen(id)? {
            return Ok(());
        }
        self.node_mut(id)?.frozen = true;
        tracing::debug!(id, "frozen");
        Ok(())
    }

    /// Dispose `id` and its subtree. Disposing twice is a no-op.
    ///
    /// A frozen subtree may only be disposed from its frozen root; a child of
    /// an explicitly locked collection stays until the lock is lifted.
    pub fn dispose(&mut self, id: ObjectId) -> Result<()> {
        let node = self.arena.slot(id)?;
        if node.state != NodeState::Live {
            return Ok(());
        }
        let frozen_root = node.frozen;
        let parent = node.parent;
        if self.is_frozen(id)? && !frozen_root {
            return Err(DomError::Frozen(id));
        }
        if let Some(parent) = parent {
            if self.is_frozen(parent)? {
                return Err(DomError::Frozen(id));
            }
            // only an explicit lock on the parent itself holds its children
            if self.node(parent)?.local_lock {
                return Err(DomError::Locked(parent));
            }
            if self.node(parent)?.read_only {
                return Err(DomError::NotSupported(format!(
                    "collection {} is read-only",
                    parent
                )));
            }
        }

        self.run_op("Dispose", |doc| {
            doc.without_history(|doc| doc.dispose_unrecorded(id, parent))
        })
    }

    fn dispose_unrecorded(&mut self, id: ObjectId, parent: Option<ObjectId>) -> Result<()> {
        self.node_mut(id)?.state = NodeState::Disposing;

        if let Some(parent) = parent {
            if let Some(index) = self.index_of(parent, id)? {
                self.remove_items(parent, index, 1, CollectionChange::Removed, true)?;
            } else if self.kind(id)? == ElementKind::Material {
                // a colour never goes without a material
                let fresh = self.create_material(Material::Plastic);
                self.attach_material_unchecked(parent, fresh)?;
            }
        }

        let subtree = self.disposal_order(id)?;
        for &node in &subtree {
            if self.kind(node)? == ElementKind::Group {
                self.release_members(node)?;
            }
            if self.node(node)?.group.is_some() {
                self.link_group(node, None)?;
            }
        }
        for &node in subtree.iter().rev() {
            let slot = self.arena.slot_mut(node)?;
            slot.state = NodeState::Disposed;
            slot.parent = None;
            slot.children.clear();
            self.events.queue(DomEvent::Disposed { source: node });
        }
        tracing::debug!(id, count = subtree.len(), "disposed");
        Ok(())
    }

    /// `id`, its descendants and any materials they own, parents first.
    fn disposal_order(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.arena.slot(current)?;
            order.push(current);
            if let Some(colour) = node.as_colour() {
                stack.push(colour.material);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(order)
    }

    /// Give `colour` a new material without any checks. The old one is
    /// left detached.
    pub(crate) fn attach_material_unchecked(&mut self, colour: ObjectId, material: ObjectId) -> Result<()> {
        let kind = self.kind(colour)?;
        let NodeData::Colour(data) = &mut self.node_mut(colour)?.data else {
            return Err(DomError::wrong_kind("Colour", kind));
        };
        let old = std::mem::replace(&mut data.material, material);
        self.node_mut(material)?.parent = Some(colour);
        if let Ok(previous) = self.arena.slot_mut(old) {
            if previous.parent == Some(colour) {
                previous.parent = None;
            }
        }
        self.emit_property(
            colour,
            Property::Material,
            PropertyValue::Link(Some(old)),
            PropertyValue::Link(Some(material)),
        );
        Ok(())
    }
}
