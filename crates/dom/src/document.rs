//! Document - owner of the object graph
//!
//! A `Document` owns the arena, the event queue and the undo history. Every
//! public mutation runs inside `run_op`, which opens an implicit undo command
//! and drains queued events once the outermost operation is done.
//!
//! ```text
//! Document (root, id 0)
//!   └── Page
//!         └── Step
//!               └── Comment / Line / Triangle / Quadrilateral /
//!                   OptionalLine / Reference / Group / Colour
//! ```

use crate::arena::DomArena;
use crate::colour::{is_valid_colour_value, Palette, Rgba};
use crate::error::{DomError, Result};
use crate::events::{
    ChangeArgs, CollectionChange, CollectionChangedArgs, CollectionView, DomEvent, EventFilter,
    PropertyChangedArgs,
};
use crate::geom::{Matrix4d, Vector3d};
use crate::material::Material;
use crate::node::{ColourData, CommentData, Graphic, GraphicKind, GroupData, Node, NodeData, PageData, Reference};
use crate::types::{Coordinates, ElementKind, NodeState, ObjectId, Property, PropertyValue, SubscriptionId};
use crate::undo::UndoStack;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-document settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Number of commands kept in the undo history.
    pub undo_limit: usize,
    /// Author written into pages created without one.
    pub default_author: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            undo_limit: 100,
            default_author: String::new(),
        }
    }
}

pub struct Document {
    pub(crate) arena: DomArena,
    root: ObjectId,
    config: DocumentConfig,
    palette: Arc<Palette>,
    pub(crate) events: crate::events::EventDispatcher,
    pub(crate) undo: UndoStack,
    op_depth: usize,
    /// Non-zero while an operation emits its own page-elements events.
    pub(crate) view_events_suppressed: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::with_config(DocumentConfig::default())
    }

    pub fn with_config(config: DocumentConfig) -> Self {
        Self::with_palette(config, Arc::new(Palette::system()))
    }

    pub fn with_palette(config: DocumentConfig, palette: Arc<Palette>) -> Self {
        let mut arena = DomArena::new();
        let root = arena.add_node(NodeData::Document);
        Self {
            arena,
            root,
            undo: UndoStack::new(config.undo_limit),
            config,
            palette,
            events: Default::default(),
            op_depth: 0,
            view_events_suppressed: 0,
        }
    }

    /// The document node itself. Pages are its children.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.palette
    }

    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    /// Live node by id
    pub fn node(&self, id: ObjectId) -> Result<&Node> {
        self.arena.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: ObjectId) -> Result<&mut Node> {
        self.arena.get_mut(id)
    }

    pub fn kind(&self, id: ObjectId) -> Result<ElementKind> {
        Ok(self.node(id)?.kind())
    }

    /// Pages of this document, in order.
    pub fn pages(&self) -> &[ObjectId] {
        self.arena
            .get(self.root)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    // ----- operation bracket -------------------------------------------------

    /// Run one public mutation. Nested calls join the outermost one; events
    /// are delivered after the outermost call returns.
    pub(crate) fn run_op<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.op_depth += 1;
        self.undo.begin_implicit(name);
        let result = f(self);
        self.undo.end_implicit();
        self.op_depth -= 1;
        if self.op_depth == 0 {
            self.flush_events();
        }
        result
    }

    /// Run `f` without recording anything into the undo history.
    pub(crate) fn without_history<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        self.undo.suspend();
        let result = f(self);
        self.undo.resume();
        result
    }

    /// Deliver queued events. Handlers run with full access to the document;
    /// whatever they raise is appended to the queue and delivered in turn.
    pub(crate) fn flush_events(&mut self) {
        if !self.events.begin_dispatch() {
            return;
        }
        while let Some(event) = self.events.next_event() {
            tracing::trace!(?event, "dispatching");
            let mut listeners = self.events.take_listeners();
            for listener in listeners.iter_mut() {
                if self.events.is_removed(listener.id) || !listener.filter.matches(&event) {
                    continue;
                }
                (listener.handler)(self, &event);
            }
            self.events.restore_listeners(listeners);
        }
        self.events.end_dispatch();

        let arena = &self.arena;
        self.events
            .prune(|id| arena.slot(id).map_or(false, |n| n.is_live()));
    }

    // ----- events ------------------------------------------------------------

    pub fn subscribe<F>(&mut self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: FnMut(&mut Document, &DomEvent) + 'static,
    {
        self.events.subscribe(filter, Box::new(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Number of live subscriptions bound to `source`.
    pub fn subscriber_count(&self, source: ObjectId) -> usize {
        self.events.subscriber_count(source)
    }

    /// Queue the typed event, then the generic `Changed` event.
    pub(crate) fn emit_property(
        &mut self,
        source: ObjectId,
        property: Property,
        old: PropertyValue,
        new: PropertyValue,
    ) {
        let args = PropertyChangedArgs { property, old, new };
        self.events.queue(DomEvent::PropertyChanged {
            source,
            args: args.clone(),
        });
        self.events.queue(DomEvent::Changed {
            source,
            operation: property.event_name(),
            args: ChangeArgs::Property(args),
        });
    }

    /// Queue a collection event for `source`. Nothing is raised for a change
    /// that touched no items.
    pub(crate) fn emit_collection(
        &mut self,
        source: ObjectId,
        view: CollectionView,
        change: CollectionChange,
        items: Vec<ObjectId>,
        replaced: Vec<ObjectId>,
        index: usize,
    ) {
        if items.is_empty() && replaced.is_empty() {
            return;
        }
        let args = CollectionChangedArgs {
            view,
            change,
            items,
            replaced,
            index,
        };
        self.events.queue(DomEvent::CollectionChanged {
            source,
            args: args.clone(),
        });
        self.events.queue(DomEvent::Changed {
            source,
            operation: change.event_name(),
            args: ChangeArgs::Collection(args),
        });
    }

    /// Every node of the subtree rooted at `id` has a new path to the top.
    pub(crate) fn emit_path_changed(&mut self, id: ObjectId) {
        let Ok(ids) = self.arena.subtree(id) else {
            return;
        };
        for source in ids {
            self.events.queue(DomEvent::PathToDocumentChanged { source });
        }
    }

    // ----- lifecycle queries -------------------------------------------------

    pub fn is_disposed(&self, id: ObjectId) -> Result<bool> {
        Ok(self.arena.slot(id)?.state == NodeState::Disposed)
    }

    pub fn is_disposing(&self, id: ObjectId) -> Result<bool> {
        Ok(self.arena.slot(id)?.state == NodeState::Disposing)
    }

    /// Frozen locally or through any ancestor.
    pub fn is_frozen(&self, id: ObjectId) -> Result<bool> {
        let node = self.node(id)?;
        Ok(node.frozen || self.arena.ancestors(id).any(|a| self.flag(a, |n| n.frozen)))
    }

    /// Locked locally or through any ancestor.
    pub fn is_locked(&self, id: ObjectId) -> Result<bool> {
        let node = self.node(id)?;
        Ok(node.local_lock || self.ancestor_locked(id))
    }

    /// The lock flag stored on `id` itself.
    pub fn is_local_lock(&self, id: ObjectId) -> Result<bool> {
        Ok(self.node(id)?.local_lock)
    }

    pub fn is_read_only(&self, id: ObjectId) -> Result<bool> {
        Ok(self.node(id)?.read_only)
    }

    pub(crate) fn ancestor_locked(&self, id: ObjectId) -> bool {
        self.arena.ancestors(id).any(|a| self.flag(a, |n| n.local_lock))
    }

    fn flag<F>(&self, id: ObjectId, f: F) -> bool
    where
        F: Fn(&Node) -> bool,
    {
        self.arena.slot(id).map_or(false, f)
    }

    /// Fails unless `id` is live and not frozen.
    pub(crate) fn check_mutable(&self, id: ObjectId) -> Result<()> {
        if self.is_frozen(id)? {
            return Err(DomError::Frozen(id));
        }
        Ok(())
    }

    // ----- navigation --------------------------------------------------------

    pub fn parent(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.node(id)?.parent)
    }

    /// Nearest containing page.
    pub fn page_of(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        self.nearest_ancestor(id, ElementKind::Page)
    }

    /// Nearest containing step.
    pub fn step_of(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        self.nearest_ancestor(id, ElementKind::Step)
    }

    /// This document's root when `id` is attached to it.
    pub fn document_of(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        self.node(id)?;
        if id == self.root || self.arena.ancestors(id).any(|a| a == self.root) {
            return Ok(Some(self.root));
        }
        Ok(None)
    }

    fn nearest_ancestor(&self, id: ObjectId, kind: ElementKind) -> Result<Option<ObjectId>> {
        self.node(id)?;
        Ok(self
            .arena
            .ancestors(id)
            .find(|&a| self.arena.slot(a).map_or(false, |n| n.kind() == kind)))
    }

    // ----- construction ------------------------------------------------------

    /// New detached page. The name must be a usable file name.
    pub fn create_page(&mut self, name: &str) -> Result<ObjectId> {
        crate::properties::validate_line_text(name, true)?;
        Ok(self.arena.add_node(NodeData::Page(PageData {
            name: name.to_string(),
            author: self.config.default_author.clone(),
            ..PageData::default()
        })))
    }

    pub fn create_step(&mut self) -> ObjectId {
        self.arena.add_node(NodeData::Step)
    }

    pub fn create_comment(&mut self, text: &str) -> Result<ObjectId> {
        crate::properties::validate_line_text(text, false)?;
        Ok(self.arena.add_node(NodeData::Comment(CommentData {
            text: text.to_string(),
        })))
    }

    /// New detached line, triangle, quadrilateral or optional line.
    pub fn create_graphic(
        &mut self,
        kind: GraphicKind,
        colour: u32,
        coordinates: &[Vector3d],
    ) -> Result<ObjectId> {
        crate::properties::validate_coordinates(kind.coordinates_count(), coordinates)?;
        if !is_valid_colour_value(colour) {
            return Err(DomError::InvalidArgument(format!(
                "colour value {} out of range",
                colour
            )));
        }
        let coordinates: Coordinates = coordinates.iter().copied().collect();
        Ok(self
            .arena
            .add_node(NodeData::Graphic(Graphic::new(kind, colour, coordinates))))
    }

    pub fn create_line(&mut self, colour: u32, v1: Vector3d, v2: Vector3d) -> Result<ObjectId> {
        self.create_graphic(GraphicKind::Line, colour, &[v1, v2])
    }

    pub fn create_triangle(&mut self, colour: u32, vertices: [Vector3d; 3]) -> Result<ObjectId> {
        self.create_graphic(GraphicKind::Triangle, colour, &vertices)
    }

    pub fn create_quadrilateral(&mut self, colour: u32, vertices: [Vector3d; 4]) -> Result<ObjectId> {
        self.create_graphic(GraphicKind::Quadrilateral, colour, &vertices)
    }

    /// `vertices` are the two line ends followed by the two control points.
    pub fn create_optional_line(&mut self, colour: u32, vertices: [Vector3d; 4]) -> Result<ObjectId> {
        self.create_graphic(GraphicKind::OptionalLine, colour, &vertices)
    }

    pub fn create_reference(&mut self, colour: u32, matrix: Matrix4d, target: &str) -> Result<ObjectId> {
        if !is_valid_colour_value(colour) {
            return Err(DomError::InvalidArgument(format!(
                "colour value {} out of range",
                colour
            )));
        }
        crate::properties::validate_matrix(&matrix)?;
        crate::properties::validate_target_name(target)?;
        Ok(self.arena.add_node(NodeData::Reference(Reference::new(
            colour,
            matrix,
            target.to_string(),
        ))))
    }

    pub fn create_group(&mut self, name: &str) -> Result<ObjectId> {
        crate::properties::validate_line_text(name, true)?;
        Ok(self.arena.add_node(NodeData::Group(GroupData {
            name: name.to_string(),
        })))
    }

    /// New detached colour definition with a plastic finish.
    pub fn create_colour(&mut self, name: &str, code: u32, value: Rgba, edge: Rgba) -> Result<ObjectId> {
        crate::properties::validate_colour_name(name)?;
        crate::properties::validate_colour_code(code)?;
        let colour = self.arena.add_node(NodeData::Colour(ColourData {
            name: name.to_string(),
            code,
            value,
            edge,
            luminance: None,
            material: 0,
        }));
        let material = self.arena.add_node(NodeData::Material(Material::Plastic));
        self.arena.slot_mut(material)?.parent = Some(colour);
        if let NodeData::Colour(c) = &mut self.arena.slot_mut(colour)?.data {
            c.material = material;
        }
        Ok(colour)
    }

    /// New unowned material node, ready to be given to a colour.
    pub fn create_material(&mut self, material: Material) -> ObjectId {
        self.arena.add_node(NodeData::Material(material))
    }

    /// Build one element from a single line of LDraw code.
    pub fn create_from_code(&mut self, line: &str) -> Result<ObjectId> {
        crate::parser::Parser::default().parse_element(self, line)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.arena.len())
            .field("pages", &self.pages().len())
            .field("events", &self.events)
            .finish()
    }
}
