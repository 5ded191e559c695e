//! Undo history
//!
//! Mutations record `Edit`s into the currently open command. A command is
//! opened explicitly with `start_command`, or implicitly by every top-level
//! mutation. Undo replays a command's edits backwards. Whatever can be
//! checked up front is checked before anything is applied; an edit refused
//! halfway through is followed by reverting the edits already replayed, so
//! a failed undo or redo leaves the graph as it was and raises no events.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::events::CollectionChange;
use crate::types::{ObjectId, Property, PropertyValue};

/// One reversible change.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Edit {
    Property {
        target: ObjectId,
        property: Property,
        old: PropertyValue,
        new: PropertyValue,
    },
    Insert {
        collection: ObjectId,
        index: usize,
        items: Vec<ObjectId>,
    },
    Remove {
        collection: ObjectId,
        index: usize,
        items: Vec<ObjectId>,
        change: CollectionChange,
        /// `(member, group)` links severed because the items left the group's scope.
        broken_groups: Vec<(ObjectId, ObjectId)>,
    },
    Replace {
        collection: ObjectId,
        index: usize,
        old: ObjectId,
        new: ObjectId,
        broken_groups: Vec<(ObjectId, ObjectId)>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub(crate) name: String,
    pub(crate) edits: Vec<Edit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Backward,
    Forward,
}

impl Direction {
    fn reversed(self) -> Self {
        match self {
            Direction::Backward => Direction::Forward,
            Direction::Forward => Direction::Backward,
        }
    }
}

#[derive(Debug)]
pub(crate) struct UndoStack {
    commands: Vec<Command>,
    /// Number of commands currently applied.
    position: usize,
    open: Option<Command>,
    explicit_depth: usize,
    implicit_depth: usize,
    suspended: usize,
    limit: usize,
}

impl UndoStack {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            commands: Vec::new(),
            position: 0,
            open: None,
            explicit_depth: 0,
            implicit_depth: 0,
            suspended: 0,
            limit,
        }
    }

    pub(crate) fn start_explicit(&mut self, name: &str) {
        if self.explicit_depth == 0 && self.implicit_depth == 0 {
            self.open = Some(Command {
                name: name.to_string(),
                edits: Vec::new(),
            });
        }
        self.explicit_depth += 1;
    }

    pub(crate) fn end_explicit(&mut self) -> Result<()> {
        if self.explicit_depth == 0 {
            return Err(DomError::InvalidOperation("no command is open".to_string()));
        }
        self.explicit_depth -= 1;
        if self.explicit_depth == 0 && self.implicit_depth == 0 {
            self.commit();
        }
        Ok(())
    }

    pub(crate) fn begin_implicit(&mut self, name: &str) {
        if self.explicit_depth == 0 && self.implicit_depth == 0 {
            self.open = Some(Command {
                name: name.to_string(),
                edits: Vec::new(),
            });
        }
        self.implicit_depth += 1;
    }

    pub(crate) fn end_implicit(&mut self) {
        self.implicit_depth = self.implicit_depth.saturating_sub(1);
        if self.explicit_depth == 0 && self.implicit_depth == 0 {
            self.commit();
        }
    }

    fn commit(&mut self) {
        let Some(command) = self.open.take() else {
            return;
        };
        if command.edits.is_empty() {
            return;
        }
        tracing::debug!(name = %command.name, edits = command.edits.len(), "command recorded");
        self.commands.truncate(self.position);
        self.commands.push(command);
        if self.commands.len() > self.limit {
            let excess = self.commands.len() - self.limit;
            self.commands.drain(..excess);
        }
        self.position = self.commands.len();
    }

    pub(crate) fn record(&mut self, edit: Edit) {
        if self.suspended > 0 || self.limit == 0 {
            return;
        }
        if let Some(command) = self.open.as_mut() {
            command.edits.push(edit);
        }
    }

    pub(crate) fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub(crate) fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    pub(crate) fn is_explicit_open(&self) -> bool {
        self.explicit_depth > 0
    }

    pub(crate) fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub(crate) fn can_redo(&self) -> bool {
        self.position < self.commands.len()
    }

    pub(crate) fn peek_undo(&self) -> Option<&Command> {
        self.position.checked_sub(1).and_then(|i| self.commands.get(i))
    }

    pub(crate) fn peek_redo(&self) -> Option<&Command> {
        self.commands.get(self.position)
    }

    pub(crate) fn step_back(&mut self) {
        self.position = self.position.saturating_sub(1);
    }

    pub(crate) fn step_forward(&mut self) {
        self.position = (self.position + 1).min(self.commands.len());
    }

    pub(crate) fn clear(&mut self) {
        self.commands.clear();
        self.position = 0;
    }
}

impl Document {
    /// Open an explicit command. Everything up to the matching `end_command`
    /// is undone as one step. Brackets nest; only the outermost one counts.
    pub fn start_command(&mut self, name: &str) {
        self.undo.start_explicit(name);
    }

    pub fn end_command(&mut self) -> Result<()> {
        self.undo.end_explicit()
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo_name(&self) -> Option<&str> {
        self.undo.peek_undo().map(|c| c.name.as_str())
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.undo.peek_redo().map(|c| c.name.as_str())
    }

    /// Forget all recorded commands.
    pub fn clear_history(&mut self) {
        self.undo.clear();
    }

    /// Revert the most recent command. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.undo.is_explicit_open() {
            return Err(DomError::InvalidOperation(
                "cannot undo while a command is open".to_string(),
            ));
        }
        let Some(command) = self.undo.peek_undo().cloned() else {
            return Ok(false);
        };
        self.replay(&command, Direction::Backward)?;
        self.undo.step_back();
        Ok(true)
    }

    /// Re-apply the most recently undone command.
    pub fn redo(&mut self) -> Result<bool> {
        if self.undo.is_explicit_open() {
            return Err(DomError::InvalidOperation(
                "cannot redo while a command is open".to_string(),
            ));
        }
        let Some(command) = self.undo.peek_redo().cloned() else {
            return Ok(false);
        };
        self.replay(&command, Direction::Forward)?;
        self.undo.step_forward();
        Ok(true)
    }

    fn replay(&mut self, command: &Command, direction: Direction) -> Result<()> {
        let edits: Vec<&Edit> = match direction {
            Direction::Backward => command.edits.iter().rev().collect(),
            Direction::Forward => command.edits.iter().collect(),
        };
        // only the first edit sees the graph as it is now; later ones are
        // checked as they are applied
        if let Some(first) = edits.first() {
            self.check_edit(first, direction)?;
        }
        for edit in &edits[1.min(edits.len())..] {
            self.check_edit_static(edit)?;
        }

        tracing::debug!(name = %command.name, ?direction, "replaying command");
        let mark = self.events.mark();
        self.run_op(&command.name, |doc| {
            doc.without_history(|doc| {
                for (applied, edit) in edits.iter().enumerate() {
                    if let Err(err) = doc.apply_edit(edit, direction) {
                        tracing::debug!(name = %command.name, applied, %err, "replay refused, reverting");
                        doc.revert_applied(&edits[..applied], direction);
                        doc.events.discard_from(mark);
                        return Err(err);
                    }
                }
                Ok(())
            })
        })
    }

    /// Take back the edits of a replay that stopped partway, newest first.
    fn revert_applied(&mut self, applied: &[&Edit], direction: Direction) {
        let reverse = direction.reversed();
        for edit in applied.iter().rev() {
            if let Err(err) = self.apply_edit(edit, reverse) {
                tracing::warn!(%err, "could not revert a partially replayed command");
                return;
            }
        }
    }

    /// Disposal and freezing are never reverted by other edits, so these
    /// checks hold for every edit of the command up front.
    fn check_edit_static(&self, edit: &Edit) -> Result<()> {
        match edit {
            Edit::Property { target, .. } => self.check_mutable(*target),
            Edit::Insert {
                collection, items, ..
            } => {
                self.check_mutable(*collection)?;
                items.iter().try_for_each(|&item| self.check_mutable(item))
            }
            Edit::Remove {
                collection,
                items,
                broken_groups,
                ..
            } => {
                self.check_mutable(*collection)?;
                items.iter().try_for_each(|&item| self.check_mutable(item))?;
                self.check_links_live(broken_groups)
            }
            Edit::Replace {
                collection,
                old,
                new,
                broken_groups,
                ..
            } => {
                self.check_mutable(*collection)?;
                self.check_mutable(*old)?;
                self.check_mutable(*new)?;
                self.check_links_live(broken_groups)
            }
        }
    }

    fn check_links_live(&self, links: &[(ObjectId, ObjectId)]) -> Result<()> {
        for &(member, group) in links {
            self.node(member)?;
            self.node(group)?;
        }
        Ok(())
    }

    /// Full check of an edit against the graph as it is right now.
    fn check_edit(&self, edit: &Edit, direction: Direction) -> Result<()> {
        self.check_edit_static(edit)?;
        match edit {
            Edit::Insert { collection, .. }
            | Edit::Remove { collection, .. }
            | Edit::Replace { collection, .. } => self.check_collection_mutable(*collection)?,
            Edit::Property { .. } => {}
        }
        match (edit, direction) {
            (Edit::Property { target, property, .. }, _) => {
                self.check_property_write(*target, *property)
            }
            (
                Edit::Insert {
                    collection,
                    index,
                    items,
                },
                Direction::Backward,
            )
            | (
                Edit::Remove {
                    collection,
                    index,
                    items,
                    ..
                },
                Direction::Forward,
            ) => self.check_children_at(*collection, *index, items),
            (
                Edit::Insert {
                    collection,
                    index,
                    items,
                },
                Direction::Forward,
            )
            | (
                Edit::Remove {
                    collection,
                    index,
                    items,
                    ..
                },
                Direction::Backward,
            ) => {
                let len = self.node(*collection)?.children.len();
                if *index > len {
                    return Err(DomError::OutOfRange { index: *index, len });
                }
                self.check_detached(items)
            }
            (
                Edit::Replace {
                    collection,
                    index,
                    old,
                    new,
                    ..
                },
                _,
            ) => {
                let (current, incoming) = match direction {
                    Direction::Backward => (*new, *old),
                    Direction::Forward => (*old, *new),
                };
                self.check_children_at(*collection, *index, &[current])?;
                self.check_detached(&[incoming])
            }
        }
    }

    fn check_children_at(&self, collection: ObjectId, index: usize, items: &[ObjectId]) -> Result<()> {
        let children = &self.node(collection)?.children;
        let span = index
            .checked_add(items.len())
            .and_then(|end| children.get(index..end));
        if span != Some(items) {
            return Err(DomError::InvalidOperation(
                "history no longer matches the collection".to_string(),
            ));
        }
        Ok(())
    }

    fn check_detached(&self, items: &[ObjectId]) -> Result<()> {
        for &item in items {
            if self.node(item)?.parent.is_some() {
                return Err(DomError::InvalidOperation(format!(
                    "element {} has been attached elsewhere",
                    item
                )));
            }
        }
        Ok(())
    }

    fn apply_edit(&mut self, edit: &Edit, direction: Direction) -> Result<()> {
        match (edit, direction) {
            (
                Edit::Property {
                    target,
                    property,
                    old,
                    new,
                },
                _,
            ) => {
                let value = match direction {
                    Direction::Backward => old.clone(),
                    Direction::Forward => new.clone(),
                };
                match (property, value) {
                    (Property::Group, PropertyValue::Link(group)) => self.link_group(*target, group),
                    (Property::Material, PropertyValue::Link(Some(material))) => {
                        self.attach_material(*target, material)
                    }
                    (property, value) => self.write_property(*target, *property, value),
                }
            }
            (
                Edit::Insert {
                    collection,
                    index,
                    items,
                },
                Direction::Forward,
            ) => self.insert_items(*collection, *index, items),
            (
                Edit::Insert {
                    collection,
                    index,
                    items,
                },
                Direction::Backward,
            ) => self
                .remove_items(*collection, *index, items.len(), CollectionChange::Removed, false)
                .map(|_| ()),
            (
                Edit::Remove {
                    collection,
                    index,
                    items,
                    change,
                    ..
                },
                Direction::Forward,
            ) => self
                .remove_items(*collection, *index, items.len(), *change, false)
                .map(|_| ()),
            (
                Edit::Remove {
                    collection,
                    index,
                    items,
                    broken_groups,
                    ..
                },
                Direction::Backward,
            ) => {
                self.insert_items(*collection, *index, items)?;
                self.restore_groups(broken_groups)
            }
            (
                Edit::Replace {
                    collection,
                    index,
                    new,
                    ..
                },
                Direction::Forward,
            ) => self.replace_item(*collection, *index, *new).map(|_| ()),
            (
                Edit::Replace {
                    collection,
                    index,
                    old,
                    broken_groups,
                    ..
                },
                Direction::Backward,
            ) => {
                self.replace_item(*collection, *index, *old)?;
                self.restore_groups(broken_groups)
            }
        }
    }
}
