//! Named groups of elements (`0 GROUP` / `0 MLCAD BTG`).
//!
//! Membership is a link stored on the member. A group and its members must
//! share a scope: the page they live in, or the top of their tree when they
//! are not inside a page. Links whose two ends stop sharing a scope are cut
//! when an element is detached.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::events::{CollectionChange, CollectionView};
use crate::types::{ElementKind, ObjectId, Property, PropertyValue};
use crate::undo::Edit;

impl Document {
    /// The page containing `id` (or `id` itself if it is a page), otherwise
    /// the top of its tree.
    pub(crate) fn group_scope(&self, id: ObjectId) -> ObjectId {
        std::iter::once(id)
            .chain(self.arena.ancestors(id))
            .find(|&a| {
                self.arena
                    .slot(a)
                    .is_ok_and(|n| n.kind() == ElementKind::Page)
            })
            .unwrap_or_else(|| self.arena.root_of(id))
    }

    /// A group other than those in `skip` already uses `name` in `scope`.
    pub(crate) fn group_name_taken(&self, scope: ObjectId, name: &str, skip: &[ObjectId]) -> bool {
        self.arena.iter().any(|node| {
            node.as_group().is_some_and(|g| g.name == name)
                && !skip.contains(&node.id)
                && self.group_scope(node.id) == scope
        })
    }

    /// The group `member` belongs to.
    pub fn group_of(&self, member: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.node(member)?.group)
    }

    /// Members in document order.
    pub fn group_members(&self, group: ObjectId) -> Result<Vec<ObjectId>> {
        self.expect_group(group)?;
        let scope = self.group_scope(group);
        let mut members = Vec::new();
        self.arena.traverse_df(scope, |node| {
            if node.group == Some(group) {
                members.push(node.id);
            }
            Ok(())
        })?;
        // loose members sit outside any tree walk from the scope
        for id in self.arena.find(|n| n.group == Some(group)) {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        Ok(members)
    }

    pub fn group_contains(&self, group: ObjectId, member: ObjectId) -> Result<bool> {
        self.expect_group(group)?;
        Ok(self.node(member)?.group == Some(group))
    }

    pub fn group_member_count(&self, group: ObjectId) -> Result<usize> {
        Ok(self.group_members(group)?.len())
    }

    /// Add `member` to `group`. Fails if it already belongs to a group.
    pub fn group_add(&mut self, group: ObjectId, member: ObjectId) -> Result<()> {
        self.expect_group(group)?;
        if let Some(current) = self.node(member)?.group {
            return Err(DomError::InvalidOperation(format!(
                "element {} already belongs to group {}",
                member, current
            )));
        }
        self.set_group(member, Some(group))
    }

    /// Take `member` out of `group`. Returns false if it was not a member.
    pub fn group_remove(&mut self, group: ObjectId, member: ObjectId) -> Result<bool> {
        if !self.group_contains(group, member)? {
            return Ok(false);
        }
        self.set_group(member, None)?;
        Ok(true)
    }

    /// Assign or clear the group of `member`. Allowed on locked elements.
    pub fn set_group(&mut self, member: ObjectId, group: Option<ObjectId>) -> Result<()> {
        self.run_op(Property::Group.event_name(), |doc| {
            doc.check_group_link(member, group)?;
            doc.link_group(member, group)
        })
    }

    fn expect_group(&self, group: ObjectId) -> Result<()> {
        let kind = self.kind(group)?;
        if kind != ElementKind::Group {
            return Err(DomError::wrong_kind("Group", kind));
        }
        Ok(())
    }

    fn check_group_link(&self, member: ObjectId, group: Option<ObjectId>) -> Result<()> {
        let kind = self.kind(member)?;
        if !kind.descriptor().is_groupable {
            return Err(DomError::NotSupported(format!("{} cannot join a group", kind)));
        }
        self.check_mutable(member)?;
        if let Some(group) = group {
            self.expect_group(group)?;
            self.check_mutable(group)?;
            if self.group_scope(member) != self.group_scope(group) {
                return Err(DomError::InvalidOperation(format!(
                    "element {} and group {} are not in the same page",
                    member, group
                )));
            }
        }
        Ok(())
    }

    /// Store the link, record it and announce it on the member and on both groups.
    pub(crate) fn link_group(&mut self, member: ObjectId, group: Option<ObjectId>) -> Result<()> {
        let old = self.node(member)?.group;
        if old == group {
            return Ok(());
        }
        let old_index = match old {
            Some(g) => self.group_members(g)?.iter().position(|&m| m == member),
            None => None,
        };
        self.node_mut(member)?.group = group;

        self.undo.record(Edit::Property {
            target: member,
            property: Property::Group,
            old: PropertyValue::Link(old),
            new: PropertyValue::Link(group),
        });
        self.emit_property(
            member,
            Property::Group,
            PropertyValue::Link(old),
            PropertyValue::Link(group),
        );
        if let (Some(g), Some(index)) = (old, old_index) {
            self.emit_collection(
                g,
                CollectionView::GroupMembers,
                CollectionChange::Removed,
                vec![member],
                Vec::new(),
                index,
            );
        }
        if let Some(g) = group {
            let index = self
                .group_members(g)?
                .iter()
                .position(|&m| m == member)
                .unwrap_or(0);
            self.emit_collection(
                g,
                CollectionView::GroupMembers,
                CollectionChange::Added,
                vec![member],
                Vec::new(),
                index,
            );
        }
        tracing::trace!(member, ?old, ?group, "group link changed");
        Ok(())
    }

    /// Cut group links that now cross a scope boundary because `detached`
    /// left their tree. Returns the cut `(member, group)` pairs.
    pub(crate) fn break_foreign_groups(&mut self, detached: &[ObjectId]) -> Result<Vec<(ObjectId, ObjectId)>> {
        let mut broken = Vec::new();
        for &root in detached {
            for id in self.arena.subtree(root)? {
                let node = self.node(id)?;
                if let Some(group) = node.group {
                    if self.group_scope(id) != self.group_scope(group) {
                        broken.push((id, group));
                    }
                }
                if node.kind() == ElementKind::Group {
                    for member in self.arena.find(|n| n.group == Some(id)) {
                        if self.group_scope(member) != self.group_scope(id) && !broken.contains(&(member, id)) {
                            broken.push((member, id));
                        }
                    }
                }
            }
        }
        if broken.is_empty() {
            return Ok(broken);
        }
        self.without_history(|doc| {
            broken
                .iter()
                .try_for_each(|&(member, _)| doc.link_group(member, None))
        })?;
        tracing::debug!(count = broken.len(), "group links cut");
        Ok(broken)
    }

    /// Put back links cut by `break_foreign_groups`.
    pub(crate) fn restore_groups(&mut self, links: &[(ObjectId, ObjectId)]) -> Result<()> {
        self.without_history(|doc| {
            links
                .iter()
                .try_for_each(|&(member, group)| doc.link_group(member, Some(group)))
        })
    }

    /// Empty a group that is going away.
    pub(crate) fn release_members(&mut self, group: ObjectId) -> Result<()> {
        for member in self.arena.find(|n| n.group == Some(group)) {
            self.link_group(member, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vector3d;

    fn page_with_step(doc: &mut Document, name: &str) -> (ObjectId, ObjectId) {
        let page = doc.create_page(name).unwrap();
        let step = doc.create_step();
        doc.add(doc.root(), page).unwrap();
        doc.add(page, step).unwrap();
        (page, step)
    }

    fn line(doc: &mut Document) -> ObjectId {
        doc.create_line(24, Vector3d::ZERO, Vector3d::new(0.0, 1.0, 0.0))
            .unwrap()
    }

    #[test]
    fn test_membership() {
        let mut doc = Document::new();
        let (_page, step) = page_with_step(&mut doc, "a.ldr");
        let group = doc.create_group("wheels").unwrap();
        let a = line(&mut doc);
        let b = line(&mut doc);
        doc.add_range(step, &[group, a, b]).unwrap();

        doc.group_add(group, b).unwrap();
        doc.group_add(group, a).unwrap();
        assert_eq!(doc.group_members(group).unwrap(), vec![a, b]);
        assert!(doc.group_contains(group, a).unwrap());
        assert!(matches!(doc.group_add(group, a), Err(DomError::InvalidOperation(_))));

        assert!(doc.group_remove(group, a).unwrap());
        assert!(!doc.group_remove(group, a).unwrap());
        assert_eq!(doc.group_of(b).unwrap(), Some(group));
    }

    #[test]
    fn test_group_across_pages_is_refused() {
        let mut doc = Document::new();
        let (_p1, s1) = page_with_step(&mut doc, "a.ldr");
        let (_p2, s2) = page_with_step(&mut doc, "b.ldr");
        let group = doc.create_group("g").unwrap();
        let member = line(&mut doc);
        doc.add(s1, group).unwrap();
        doc.add(s2, member).unwrap();

        assert!(matches!(doc.group_add(group, member), Err(DomError::InvalidOperation(_))));
    }

    #[test]
    fn test_detaching_member_cuts_link_and_undo_restores() {
        let mut doc = Document::new();
        let (_page, step) = page_with_step(&mut doc, "a.ldr");
        let group = doc.create_group("g").unwrap();
        let member = line(&mut doc);
        doc.add_range(step, &[group, member]).unwrap();
        doc.group_add(group, member).unwrap();

        doc.remove(step, member).unwrap();
        assert_eq!(doc.group_of(member).unwrap(), None);
        assert!(doc.group_members(group).unwrap().is_empty());

        doc.undo().unwrap();
        assert_eq!(doc.parent(member).unwrap(), Some(step));
        assert_eq!(doc.group_of(member).unwrap(), Some(group));
    }

    #[test]
    fn test_moving_whole_step_keeps_links() {
        let mut doc = Document::new();
        let (page, step) = page_with_step(&mut doc, "a.ldr");
        let group = doc.create_group("g").unwrap();
        let member = line(&mut doc);
        doc.add_range(step, &[group, member]).unwrap();
        doc.group_add(group, member).unwrap();

        // group and member travel together
        doc.remove(page, step).unwrap();
        assert_eq!(doc.group_of(member).unwrap(), Some(group));
    }

    #[test]
    fn test_locked_member_can_change_group() {
        let mut doc = Document::new();
        let (_page, step) = page_with_step(&mut doc, "a.ldr");
        let group = doc.create_group("g").unwrap();
        let member = line(&mut doc);
        doc.add_range(step, &[group, member]).unwrap();
        doc.set_locked(member, true).unwrap();

        doc.group_add(group, member).unwrap();
        assert!(doc.group_contains(group, member).unwrap());
    }
}
