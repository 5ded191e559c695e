//! Ordered children: the mutation gate and the tree operations built on it.
//!
//! Every structural change goes through three primitives (`insert_items`,
//! `remove_items`, `replace_item`). They validate everything first, apply
//! the change, record one undo edit and queue the events. The public
//! operations are thin wrappers that open an operation bracket.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::events::{CollectionChange, CollectionView};
use crate::types::{ElementKind, InsertCheckFlags, InsertCheckResult, ObjectId, Property, PropertyValue};
use crate::undo::Edit;

impl Document {
    // ----- gate --------------------------------------------------------------

    /// Would `item` be accepted by `collection`? Errors only when either
    /// object is missing or disposed.
    pub fn can_insert(
        &self,
        collection: ObjectId,
        item: ObjectId,
        flags: InsertCheckFlags,
    ) -> Result<InsertCheckResult> {
        self.insert_check(collection, item, flags, None)
    }

    /// Would `item` be accepted in place of `existing`?
    pub fn can_replace(
        &self,
        collection: ObjectId,
        item: ObjectId,
        existing: ObjectId,
        flags: InsertCheckFlags,
    ) -> Result<InsertCheckResult> {
        if self.node(existing)?.parent != Some(collection) {
            return Err(DomError::InvalidArgument(format!(
                "{} is not a child of {}",
                existing, collection
            )));
        }
        if item == existing {
            return Ok(InsertCheckResult::Allowed);
        }
        self.insert_check(collection, item, flags, Some(existing))
    }

    fn insert_check(
        &self,
        collection: ObjectId,
        item: ObjectId,
        flags: InsertCheckFlags,
        replacing: Option<ObjectId>,
    ) -> Result<InsertCheckResult> {
        let target = self.node(collection)?;
        let node = self.node(item)?;

        if !target.kind().accepts(node.kind()) {
            return Ok(InsertCheckResult::NotSupported);
        }
        if node.parent.is_some() && !flags.ignore_current_parent {
            return Ok(InsertCheckResult::AlreadyParented);
        }
        if self.arena.is_self_or_ancestor(item, collection) {
            return Ok(InsertCheckResult::CircularReference);
        }
        if !flags.ignore_duplicate_names && self.has_name_clash(collection, item, replacing)? {
            return Ok(InsertCheckResult::DuplicateName);
        }
        Ok(InsertCheckResult::Allowed)
    }

    /// Would attaching `item` under `collection` give two pages, or two groups
    /// of one page, the same name?
    pub(crate) fn has_name_clash(
        &self,
        collection: ObjectId,
        item: ObjectId,
        replacing: Option<ObjectId>,
    ) -> Result<bool> {
        let incoming = self.arena.subtree(item)?;
        let mut skip = incoming.clone();
        if let Some(old) = replacing {
            skip.extend(self.arena.subtree(old)?);
        }

        if let Some(page) = self.node(item)?.as_page() {
            let target = self.node(collection)?;
            return Ok(target.children.iter().any(|&sibling| {
                !skip.contains(&sibling)
                    && self
                        .node(sibling)
                        .ok()
                        .and_then(|n| n.as_page())
                        .is_some_and(|p| p.name.eq_ignore_ascii_case(&page.name))
            }));
        }

        let scope = self.group_scope(collection);
        for &id in &incoming {
            if let Some(group) = self.node(id)?.as_group() {
                if self.group_name_taken(scope, &group.name, &skip) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub(crate) fn gate_error(&self, result: InsertCheckResult, collection: ObjectId, item: ObjectId) -> DomError {
        let kind = |id| self.kind(id).map_or("?", |k: ElementKind| k.type_name());
        match result {
            InsertCheckResult::Allowed => {
                DomError::InvalidOperation("insertion was allowed".to_string())
            }
            InsertCheckResult::NotSupported => DomError::NotSupported(format!(
                "{} cannot contain {}",
                kind(collection),
                kind(item)
            )),
            InsertCheckResult::AlreadyParented => {
                DomError::InvalidOperation(format!("element {} already has a parent", item))
            }
            InsertCheckResult::CircularReference => DomError::InvalidOperation(format!(
                "element {} would become its own ancestor",
                item
            )),
            InsertCheckResult::DuplicateName => {
                DomError::DuplicateName(self.display_name(item).unwrap_or_default())
            }
        }
    }

    fn display_name(&self, id: ObjectId) -> Option<String> {
        let node = self.node(id).ok()?;
        node.as_page()
            .map(|p| p.name.clone())
            .or_else(|| node.as_group().map(|g| g.name.clone()))
            .or_else(|| Some(format!("{}", id)))
    }

    /// Structure of `collection` may change right now.
    pub(crate) fn check_collection_mutable(&self, collection: ObjectId) -> Result<()> {
        self.check_collection(collection, true)
    }

    /// Disposal answers only to the parent's own lock, which `dispose` has
    /// already checked, so it skips the lock test here.
    fn check_collection(&self, collection: ObjectId, honour_locks: bool) -> Result<()> {
        let node = self.node(collection)?;
        if self.is_frozen(collection)? {
            return Err(DomError::Frozen(collection));
        }
        if !node.kind().descriptor().is_collection {
            return Err(DomError::NotSupported(format!(
                "{} is not a collection",
                node.kind()
            )));
        }
        if node.read_only {
            return Err(DomError::NotSupported(format!(
                "collection {} is read-only",
                collection
            )));
        }
        if honour_locks && self.is_locked(collection)? {
            return Err(DomError::Locked(collection));
        }
        Ok(())
    }

    // ----- primitives --------------------------------------------------------

    pub(crate) fn insert_items(&mut self, collection: ObjectId, index: usize, items: &[ObjectId]) -> Result<()> {
        for &item in items {
            if self.node(item)?.parent.is_some() {
                return Err(self.gate_error(InsertCheckResult::AlreadyParented, collection, item));
            }
        }
        self.check_collection_mutable(collection)?;
        if items.is_empty() {
            return Ok(());
        }
        let len = self.node(collection)?.children.len();
        if index > len {
            return Err(DomError::OutOfRange { index, len });
        }
        for (i, &item) in items.iter().enumerate() {
            if items[..i].contains(&item) {
                return Err(DomError::InvalidArgument(format!(
                    "element {} appears twice",
                    item
                )));
            }
            self.check_mutable(item)?;
            let gate = self.insert_check(collection, item, InsertCheckFlags::NONE, None)?;
            if gate != InsertCheckResult::Allowed {
                return Err(self.gate_error(gate, collection, item));
            }
        }

        let target = self.node_mut(collection)?;
        target.children.splice(index..index, items.iter().copied());
        for &item in items {
            self.node_mut(item)?.parent = Some(collection);
        }
        tracing::debug!(collection, index, count = items.len(), "inserted");

        self.undo.record(Edit::Insert {
            collection,
            index,
            items: items.to_vec(),
        });
        self.emit_collection(
            collection,
            CollectionView::Children,
            CollectionChange::Added,
            items.to_vec(),
            Vec::new(),
            index,
        );
        for &item in items {
            self.emit_property(
                item,
                Property::Parent,
                PropertyValue::Link(None),
                PropertyValue::Link(Some(collection)),
            );
            self.emit_path_changed(item);
        }
        if let Some(span) = self.view_span(collection, index, items.len()) {
            self.emit_view(span, CollectionChange::Added);
        }
        Ok(())
    }

    /// Detach `count` children starting at `index`. Disposal passes
    /// `disposing` so that a frozen subtree root can leave its parent.
    pub(crate) fn remove_items(
        &mut self,
        collection: ObjectId,
        index: usize,
        count: usize,
        change: CollectionChange,
        disposing: bool,
    ) -> Result<Vec<ObjectId>> {
        self.check_collection(collection, !disposing)?;
        let len = self.node(collection)?.children.len();
        let end = index
            .checked_add(count)
            .filter(|&end| end <= len)
            .ok_or(DomError::OutOfRange { index, len })?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let items: Vec<ObjectId> = self.node(collection)?.children[index..end].to_vec();
        if !disposing {
            for &item in &items {
                self.check_mutable(item)?;
            }
        }

        let span = self.view_span(collection, index, count);
        self.node_mut(collection)?.children.drain(index..end);
        for &item in &items {
            self.node_mut(item)?.parent = None;
        }
        let broken_groups = self.break_foreign_groups(&items)?;
        tracing::debug!(collection, index, count, broken = broken_groups.len(), "removed");

        self.undo.record(Edit::Remove {
            collection,
            index,
            items: items.clone(),
            change,
            broken_groups,
        });
        self.emit_collection(
            collection,
            CollectionView::Children,
            change,
            items.clone(),
            Vec::new(),
            index,
        );
        for &item in &items {
            self.emit_property(
                item,
                Property::Parent,
                PropertyValue::Link(Some(collection)),
                PropertyValue::Link(None),
            );
            self.emit_path_changed(item);
        }
        if let Some(span) = span {
            let change = if self.node(collection)?.kind() == ElementKind::Page
                && change == CollectionChange::Cleared
            {
                CollectionChange::Cleared
            } else {
                CollectionChange::Removed
            };
            self.emit_view(span, change);
        }
        Ok(items)
    }

    /// Put `item` at `index`, detaching whatever was there. Returns the old child.
    pub(crate) fn replace_item(&mut self, collection: ObjectId, index: usize, item: ObjectId) -> Result<ObjectId> {
        if self.node(item)?.parent.is_some() {
            return Err(self.gate_error(InsertCheckResult::AlreadyParented, collection, item));
        }
        self.check_collection_mutable(collection)?;
        let len = self.node(collection)?.children.len();
        let old = *self
            .node(collection)?
            .children
            .get(index)
            .ok_or(DomError::OutOfRange { index, len })?;
        self.check_mutable(item)?;
        self.check_mutable(old)?;
        let gate = self.insert_check(collection, item, InsertCheckFlags::NONE, Some(old))?;
        if gate != InsertCheckResult::Allowed {
            return Err(self.gate_error(gate, collection, item));
        }

        let before = self.view_span(collection, index, 1);
        self.node_mut(collection)?.children[index] = item;
        self.node_mut(old)?.parent = None;
        self.node_mut(item)?.parent = Some(collection);
        let broken_groups = self.break_foreign_groups(&[old])?;
        tracing::debug!(collection, index, old, new = item, "replaced");

        self.undo.record(Edit::Replace {
            collection,
            index,
            old,
            new: item,
            broken_groups,
        });
        self.emit_collection(
            collection,
            CollectionView::Children,
            CollectionChange::Replaced,
            vec![item],
            vec![old],
            index,
        );
        self.emit_property(
            old,
            Property::Parent,
            PropertyValue::Link(Some(collection)),
            PropertyValue::Link(None),
        );
        self.emit_path_changed(old);
        self.emit_property(
            item,
            Property::Parent,
            PropertyValue::Link(None),
            PropertyValue::Link(Some(collection)),
        );
        self.emit_path_changed(item);

        let after = self.view_span(collection, index, 1);
        match (before, after) {
            (Some(before), Some(after)) if self.node(collection)?.kind() == ElementKind::Step => {
                self.emit_view_replaced(before, after);
            }
            (before, after) => {
                if let Some(span) = before {
                    self.emit_view(span, CollectionChange::Removed);
                }
                if let Some(span) = after {
                    self.emit_view(span, CollectionChange::Added);
                }
            }
        }
        Ok(old)
    }

    // ----- public operations -------------------------------------------------

    pub fn add(&mut self, collection: ObjectId, item: ObjectId) -> Result<()> {
        let index = self.count(collection)?;
        self.insert(collection, index, item)
    }

    pub fn add_range(&mut self, collection: ObjectId, items: &[ObjectId]) -> Result<()> {
        let index = self.count(collection)?;
        self.insert_range(collection, index, items)
    }

    pub fn insert(&mut self, collection: ObjectId, index: usize, item: ObjectId) -> Result<()> {
        self.run_op("Insert", |doc| doc.insert_items(collection, index, &[item]))
    }

    /// Insert several items in one step; either all of them go in or none.
    pub fn insert_range(&mut self, collection: ObjectId, index: usize, items: &[ObjectId]) -> Result<()> {
        self.run_op("Insert", |doc| doc.insert_items(collection, index, items))
    }

    /// Detach `item` from `collection`. Returns false when it was not a child.
    pub fn remove(&mut self, collection: ObjectId, item: ObjectId) -> Result<bool> {
        let Some(index) = self.index_of(collection, item)? else {
            return Ok(false);
        };
        self.run_op("Remove", |doc| {
            doc.remove_items(collection, index, 1, CollectionChange::Removed, false)
        })?;
        Ok(true)
    }

    pub fn remove_at(&mut self, collection: ObjectId, index: usize) -> Result<ObjectId> {
        let removed = self.run_op("Remove", |doc| {
            doc.remove_items(collection, index, 1, CollectionChange::Removed, false)
        })?;
        removed
            .first()
            .copied()
            .ok_or(DomError::OutOfRange { index, len: 0 })
    }

    /// Detach every child. Returns the detached items.
    pub fn clear(&mut self, collection: ObjectId) -> Result<Vec<ObjectId>> {
        let count = self.count(collection)?;
        self.run_op("Clear", |doc| {
            doc.remove_items(collection, 0, count, CollectionChange::Cleared, false)
        })
    }

    /// Swap the child at `index` for `item`. Returns the detached child.
    pub fn replace(&mut self, collection: ObjectId, index: usize, item: ObjectId) -> Result<ObjectId> {
        self.run_op("Replace", |doc| doc.replace_item(collection, index, item))
    }

    pub fn index_of(&self, collection: ObjectId, item: ObjectId) -> Result<Option<usize>> {
        Ok(self.node(collection)?.children.iter().position(|&c| c == item))
    }

    pub fn contains(&self, collection: ObjectId, item: ObjectId) -> Result<bool> {
        Ok(self.index_of(collection, item)?.is_some())
    }

    pub fn count(&self, collection: ObjectId) -> Result<usize> {
        Ok(self.node(collection)?.children.len())
    }

    pub fn children(&self, collection: ObjectId) -> Result<&[ObjectId]> {
        Ok(&self.node(collection)?.children)
    }

    pub fn child_at(&self, collection: ObjectId, index: usize) -> Result<ObjectId> {
        let children = self.children(collection)?;
        children.get(index).copied().ok_or(DomError::OutOfRange {
            index,
            len: children.len(),
        })
    }

    /// Move `item` by assigning its parent. Assigning a different parent to
    /// an attached element fails; detach it first.
    pub fn set_parent(&mut self, item: ObjectId, parent: Option<ObjectId>) -> Result<()> {
        let current = self.node(item)?.parent;
        if current == parent {
            return Ok(());
        }
        if self.kind(item)? == ElementKind::Material {
            return Err(DomError::NotSupported(
                "materials are attached through their colour".to_string(),
            ));
        }
        match (current, parent) {
            (Some(_), Some(new)) => Err(self.gate_error(InsertCheckResult::AlreadyParented, new, item)),
            (Some(old), None) => self.remove(old, item).map(|_| ()),
            (None, Some(new)) => self.add(new, item),
            (None, None) => Ok(()),
        }
    }

    /// Make a collection refuse structural changes.
    pub fn set_read_only(&mut self, collection: ObjectId, read_only: bool) -> Result<()> {
        self.check_mutable(collection)?;
        let node = self.node_mut(collection)?;
        if !node.kind().descriptor().is_collection {
            return Err(DomError::NotSupported(format!(
                "{} is not a collection",
                node.kind()
            )));
        }
        node.read_only = read_only;
        Ok(())
    }
}
