//! Copying subtrees: in-memory clones and serde snapshots.
//!
//! A clone is always unfrozen. A serialized snapshot keeps the frozen state
//! of the subtree so that a round trip gives back an equally frozen copy.
//! Group links survive only when both the member and the group are inside
//! the copied subtree.

use crate::colour::is_valid_colour_value;
use crate::document::Document;
use crate::error::{DomError, Result};
use crate::node::NodeData;
use crate::properties::{
    validate_colour_code, validate_colour_name, validate_coordinates, validate_line_text,
    validate_matrix, validate_target_name,
};
use crate::types::{ElementKind, ObjectId};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

/// Detached copy of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub data: NodeData,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Pre-order position of this node's group within the snapshot.
    #[serde(default)]
    pub group: Option<usize>,
    /// Owned material of a colour.
    #[serde(default)]
    pub material: Option<Box<NodeSnapshot>>,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

/// Walk state while checking a snapshot.
#[derive(Default)]
struct Validation {
    /// Kinds in pre-order, materials excluded. Group links index into this.
    kinds: Vec<ElementKind>,
    links: Vec<(usize, usize)>,
    /// `(scope position, name)` of every group seen.
    group_names: AHashSet<(usize, String)>,
}

impl NodeSnapshot {
    /// Check the whole snapshot before anything is built from it: kinds
    /// nest the way collections accept them, element data passes the same
    /// validators as the setters, group links point at groups.
    pub fn validate(&self) -> Result<()> {
        if self.data.kind() == ElementKind::Document {
            return Err(DomError::Format("a snapshot cannot hold a document".to_string()));
        }
        let mut state = Validation::default();
        self.validate_node(None, 0, &mut state)?;
        for (member, position) in state.links {
            match state.kinds.get(position) {
                Some(ElementKind::Group) => {}
                Some(_) => {
                    return Err(DomError::Format(format!(
                        "node {}: group reference {} is not a group",
                        member, position
                    )));
                }
                None => {
                    return Err(DomError::Format(format!(
                        "node {}: group reference {} out of range",
                        member, position
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_node(&self, parent: Option<ElementKind>, scope: usize, state: &mut Validation) -> Result<()> {
        let kind = self.data.kind();
        let position = state.kinds.len();
        state.kinds.push(kind);
        let invalid = |err: DomError| DomError::Format(format!("node {}: {}", position, err));

        if let Some(parent) = parent {
            if !parent.accepts(kind) {
                return Err(invalid(DomError::NotSupported(format!(
                    "{} cannot contain {}",
                    parent, kind
                ))));
            }
        }
        check_data(&self.data).map_err(invalid)?;
        if let Some(group) = self.group {
            state.links.push((position, group));
        }
        let scope = if kind == ElementKind::Page { position } else { scope };
        if let NodeData::Group(group) = &self.data {
            if !state.group_names.insert((scope, group.name.clone())) {
                return Err(invalid(DomError::DuplicateName(group.name.clone())));
            }
        }

        match (&self.data, &self.material) {
            (NodeData::Colour(_), Some(material)) => {
                let NodeData::Material(params) = &material.data else {
                    return Err(invalid(DomError::wrong_kind("Material", material.data.kind())));
                };
                if !params.is_valid() || !material.children.is_empty() || material.material.is_some() {
                    return Err(invalid(DomError::InvalidArgument(
                        "malformed material".to_string(),
                    )));
                }
            }
            (NodeData::Colour(_), None) => {}
            (_, Some(_)) => {
                return Err(invalid(DomError::InvalidArgument(format!(
                    "{} cannot own a material",
                    kind
                ))));
            }
            (_, None) => {}
        }

        self.children
            .iter()
            .try_for_each(|child| child.validate_node(Some(kind), scope, state))
    }
}

fn check_data(data: &NodeData) -> Result<()> {
    let check_colour = |colour: u32| {
        if is_valid_colour_value(colour) {
            Ok(())
        } else {
            Err(DomError::InvalidArgument(format!(
                "colour value {} out of range",
                colour
            )))
        }
    };
    match data {
        NodeData::Document | NodeData::Step => Ok(()),
        NodeData::Page(page) => {
            validate_line_text(&page.name, true)?;
            validate_line_text(&page.title, false)?;
            validate_line_text(&page.author, false)
        }
        NodeData::Comment(comment) => validate_line_text(&comment.text, false),
        NodeData::Graphic(graphic) => {
            validate_coordinates(graphic.kind.coordinates_count(), &graphic.coordinates)?;
            check_colour(graphic.colour)
        }
        NodeData::Reference(reference) => {
            validate_matrix(&reference.matrix)?;
            validate_target_name(&reference.target)?;
            check_colour(reference.colour)
        }
        NodeData::Group(group) => validate_line_text(&group.name, true),
        NodeData::Colour(colour) => {
            validate_colour_name(&colour.name)?;
            validate_colour_code(colour.code)
        }
        NodeData::Material(material) => {
            if material.is_valid() {
                Ok(())
            } else {
                Err(DomError::InvalidArgument("material out of range".to_string()))
            }
        }
    }
}

impl Document {
    /// Capture the subtree at `id`. `keep_frozen` records frozen flags,
    /// including a freeze inherited by `id` from above.
    pub fn snapshot(&self, id: ObjectId, keep_frozen: bool) -> Result<NodeSnapshot> {
        let kind = self.kind(id)?;
        if kind == ElementKind::Document {
            return Err(DomError::NotSupported("the document node cannot be copied".to_string()));
        }
        let order = self.arena.subtree(id)?;
        let positions: AHashMap<ObjectId, usize> =
            order.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut snapshot = self.capture(id, keep_frozen, &positions)?;
        if keep_frozen {
            snapshot.frozen = self.is_frozen(id)?;
        }
        Ok(snapshot)
    }

    fn capture(
        &self,
        id: ObjectId,
        keep_frozen: bool,
        positions: &AHashMap<ObjectId, usize>,
    ) -> Result<NodeSnapshot> {
        let node = self.node(id)?;
        let material = match node.as_colour() {
            Some(colour) => Some(Box::new(self.capture(colour.material, keep_frozen, positions)?)),
            None => None,
        };
        let children = node
            .children
            .iter()
            .map(|&child| self.capture(child, keep_frozen, positions))
            .collect::<Result<Vec<_>>>()?;

        Ok(NodeSnapshot {
            data: node.data.clone(),
            locked: node.local_lock,
            frozen: keep_frozen && node.frozen,
            read_only: node.read_only,
            group: node.group.and_then(|g| positions.get(&g).copied()),
            material,
            children,
        })
    }

    /// Rebuild a snapshot as a new detached subtree. Returns its root.
    /// A snapshot that fails validation adds nothing to the arena.
    pub fn restore(&mut self, snapshot: &NodeSnapshot) -> Result<ObjectId> {
        snapshot.validate()?;
        let mut created = Vec::new();
        let mut links = Vec::new();
        let root = self.rebuild(snapshot, &mut created, &mut links);
        for (member, position) in links {
            let group = *created.get(position).ok_or_else(|| {
                DomError::Format(format!("group reference {} out of range", position))
            })?;
            self.node_mut(member)?.group = Some(group);
        }
        tracing::debug!(root, nodes = created.len(), "subtree restored");
        Ok(root)
    }

    fn rebuild(
        &mut self,
        snapshot: &NodeSnapshot,
        created: &mut Vec<ObjectId>,
        links: &mut Vec<(ObjectId, usize)>,
    ) -> ObjectId {
        let id = self.arena.add_node(snapshot.data.clone());
        created.push(id);
        if let Some(position) = snapshot.group {
            links.push((id, position));
        }

        if let NodeData::Colour(_) = snapshot.data {
            let material = match &snapshot.material {
                Some(material) => self.arena.add_node(material.data.clone()),
                None => self.create_material(Default::default()),
            };
            if let Ok(node) = self.arena.slot_mut(material) {
                node.parent = Some(id);
                node.frozen = snapshot.material.as_ref().is_some_and(|m| m.frozen);
            }
            if let Ok(node) = self.arena.slot_mut(id) {
                if let NodeData::Colour(colour) = &mut node.data {
                    colour.material = material;
                }
            }
        }

        let children: Vec<ObjectId> = snapshot
            .children
            .iter()
            .map(|child| {
                let child_id = self.rebuild(child, created, links);
                if let Ok(node) = self.arena.slot_mut(child_id) {
                    node.parent = Some(id);
                }
                child_id
            })
            .collect();

        if let Ok(node) = self.arena.slot_mut(id) {
            node.children = children;
            node.local_lock = snapshot.locked;
            node.frozen = snapshot.frozen;
            node.read_only = snapshot.read_only;
        }
        id
    }

    /// Detached, unfrozen deep copy of `id`.
    pub fn clone_node(&mut self, id: ObjectId) -> Result<ObjectId> {
        let snapshot = self.snapshot(id, false)?;
        self.restore(&snapshot)
    }

    /// Serialize the subtree at `id`, frozen state included.
    pub fn serialize_node(&self, id: ObjectId) -> Result<Vec<u8>> {
        let snapshot = self.snapshot(id, true)?;
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Rebuild a subtree written by `serialize_node`. Returns its root.
    pub fn deserialize_node(&mut self, bytes: &[u8]) -> Result<ObjectId> {
        let snapshot: NodeSnapshot = serde_json::from_slice(bytes)?;
        self.restore(&snapshot)
    }
}
