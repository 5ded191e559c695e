//! Flattened view of a page: every element of every step, in order.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::events::{CollectionChange, CollectionView};
use crate::types::{ElementKind, InsertCheckFlags, InsertCheckResult, ObjectId};

/// A run of consecutive elements in a page's flattened view.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ViewSpan {
    pub(crate) page: ObjectId,
    pub(crate) index: usize,
    pub(crate) items: Vec<ObjectId>,
}

impl Document {
    fn expect_page(&self, page: ObjectId) -> Result<&[ObjectId]> {
        let node = self.node(page)?;
        if node.kind() != ElementKind::Page {
            return Err(DomError::wrong_kind("Page", node.kind()));
        }
        Ok(&node.children)
    }

    /// Number of elements before `step` in the flattened view of `page`.
    fn view_offset(&self, page: ObjectId, step: ObjectId) -> usize {
        let Ok(steps) = self.expect_page(page) else {
            return 0;
        };
        steps
            .iter()
            .take_while(|&&s| s != step)
            .map(|&s| self.node(s).map_or(0, |n| n.children.len()))
            .sum()
    }

    /// The part of a page view covered by children `index..index + count`
    /// of `collection`, if `collection` feeds a page view at all.
    pub(crate) fn view_span(&self, collection: ObjectId, index: usize, count: usize) -> Option<ViewSpan> {
        let node = self.node(collection).ok()?;
        let children = node.children.get(index..index.checked_add(count)?)?;
        match node.kind() {
            ElementKind::Step => {
                let page = node.parent?;
                Some(ViewSpan {
                    page,
                    index: self.view_offset(page, collection) + index,
                    items: children.to_vec(),
                })
            }
            ElementKind::Page => {
                let index = node.children[..index]
                    .iter()
                    .map(|&s| self.node(s).map_or(0, |n| n.children.len()))
                    .sum();
                let items = children
                    .iter()
                    .filter_map(|&s| self.node(s).ok())
                    .flat_map(|s| s.children.iter().copied())
                    .collect();
                Some(ViewSpan {
                    page: collection,
                    index,
                    items,
                })
            }
            _ => None,
        }
    }

    pub(crate) fn emit_view(&mut self, span: ViewSpan, change: CollectionChange) {
        if self.view_events_suppressed > 0 {
            return;
        }
        self.emit_collection(
            span.page,
            CollectionView::PageElements,
            change,
            span.items,
            Vec::new(),
            span.index,
        );
    }

    pub(crate) fn emit_view_replaced(&mut self, before: ViewSpan, after: ViewSpan) {
        if self.view_events_suppressed > 0 {
            return;
        }
        self.emit_collection(
            after.page,
            CollectionView::PageElements,
            CollectionChange::Replaced,
            after.items,
            before.items,
            after.index,
        );
    }

    /// Step holding flattened position `index`, and the position inside it.
    /// `index == count` resolves to the end of the last step.
    fn locate(&self, page: ObjectId, index: usize) -> Result<(ObjectId, usize)> {
        let steps = self.expect_page(page)?;
        let total = self.page_element_count(page)?;
        if index > total {
            return Err(DomError::OutOfRange { index, len: total });
        }
        let mut start = 0;
        for &step in steps {
            let len = self.node(step)?.children.len();
            if index < start + len {
                return Ok((step, index - start));
            }
            start += len;
        }
        match steps.last() {
            Some(&last) => Ok((last, self.node(last)?.children.len())),
            None => Err(DomError::OutOfRange { index, len: 0 }),
        }
    }

    pub fn page_element_count(&self, page: ObjectId) -> Result<usize> {
        self.expect_page(page)?
            .iter()
            .map(|&s| -> Result<usize> { Ok(self.node(s)?.children.len()) })
            .sum()
    }

    pub fn page_elements(&self, page: ObjectId) -> Result<Vec<ObjectId>> {
        let mut out = Vec::new();
        for &step in self.expect_page(page)? {
            out.extend_from_slice(&self.node(step)?.children);
        }
        Ok(out)
    }

    pub fn page_element_at(&self, page: ObjectId, index: usize) -> Result<ObjectId> {
        let total = self.page_element_count(page)?;
        if index >= total {
            return Err(DomError::OutOfRange { index, len: total });
        }
        let (step, local) = self.locate(page, index)?;
        self.child_at(step, local)
    }

    pub fn page_element_index_of(&self, page: ObjectId, element: ObjectId) -> Result<Option<usize>> {
        Ok(self.page_elements(page)?.iter().position(|&e| e == element))
    }

    /// Insert into the step that holds position `index`. A page without
    /// steps gets one first, in the same command.
    pub fn page_elements_insert(&mut self, page: ObjectId, index: usize, element: ObjectId) -> Result<()> {
        self.run_op("Insert", |doc| {
            if !doc.expect_page(page)?.is_empty() {
                let (step, local) = doc.locate(page, index)?;
                return doc.insert_items(step, local, &[element]);
            }
            if index > 0 {
                return Err(DomError::OutOfRange { index, len: 0 });
            }
            // everything either insert could refuse is settled before the
            // step exists
            doc.check_collection_mutable(page)?;
            doc.check_mutable(element)?;
            let step = doc.create_step();
            let mut gate = doc.can_insert(step, element, InsertCheckFlags::NONE)?;
            if gate == InsertCheckResult::Allowed && doc.has_name_clash(page, element, None)? {
                gate = InsertCheckResult::DuplicateName;
            }
            if gate != InsertCheckResult::Allowed {
                let err = doc.gate_error(gate, step, element);
                doc.dispose(step)?;
                return Err(err);
            }
            doc.insert_items(page, 0, &[step])?;
            doc.insert_items(step, 0, &[element])
        })
    }

    pub fn page_elements_add(&mut self, page: ObjectId, element: ObjectId) -> Result<()> {
        let index = self.page_element_count(page)?;
        self.page_elements_insert(page, index, element)
    }

    pub fn page_elements_remove_at(&mut self, page: ObjectId, index: usize) -> Result<ObjectId> {
        let total = self.page_element_count(page)?;
        if index >= total {
            return Err(DomError::OutOfRange { index, len: total });
        }
        let (step, local) = self.locate(page, index)?;
        self.remove_at(step, local)
    }

    pub fn page_elements_remove(&mut self, page: ObjectId, element: ObjectId) -> Result<bool> {
        match self.page_element_index_of(page, element)? {
            Some(index) => self.page_elements_remove_at(page, index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn page_elements_replace(&mut self, page: ObjectId, index: usize, element: ObjectId) -> Result<ObjectId> {
        let total = self.page_element_count(page)?;
        if index >= total {
            return Err(DomError::OutOfRange { index, len: total });
        }
        let (step, local) = self.locate(page, index)?;
        self.replace(step, local, element)
    }

    /// Empty every step of the page. Steps themselves stay.
    pub fn page_elements_clear(&mut self, page: ObjectId) -> Result<()> {
        let elements = self.page_elements(page)?;
        if elements.is_empty() {
            return Ok(());
        }
        let steps: Vec<ObjectId> = self.expect_page(page)?.to_vec();
        for &step in &steps {
            if !self.node(step)?.children.is_empty() {
                self.check_collection_mutable(step)?;
            }
        }
        for &element in &elements {
            self.check_mutable(element)?;
        }

        self.run_op("Clear", |doc| {
            doc.view_events_suppressed += 1;
            let result = steps.iter().try_for_each(|&step| {
                let count = doc.node(step)?.children.len();
                doc.remove_items(step, 0, count, CollectionChange::Cleared, false)
                    .map(|_| ())
            });
            doc.view_events_suppressed -= 1;
            result?;
            doc.emit_view(
                ViewSpan {
                    page,
                    index: 0,
                    items: elements,
                },
                CollectionChange::Cleared,
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DomEvent, EventFilter};
    use crate::geom::Vector3d;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn comment(doc: &mut Document, text: &str) -> ObjectId {
        doc.create_comment(text).unwrap()
    }

    #[test]
    fn test_flattened_indices() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let s1 = doc.create_step();
        let s2 = doc.create_step();
        let s3 = doc.create_step();
        doc.add_range(page, &[s1, s2, s3]).unwrap();
        let a = comment(&mut doc, "a");
        let b = comment(&mut doc, "b");
        let c = comment(&mut doc, "c");
        doc.add_range(s1, &[a, b]).unwrap();
        doc.add(s3, c).unwrap();

        assert_eq!(doc.page_elements(page).unwrap(), vec![a, b, c]);
        assert_eq!(doc.page_element_at(page, 2).unwrap(), c);
        assert_eq!(doc.page_element_index_of(page, c).unwrap(), Some(2));

        // position 2 is the first element of the third step
        let d = comment(&mut doc, "d");
        doc.page_elements_insert(page, 2, d).unwrap();
        assert_eq!(doc.children(s3).unwrap(), &[d, c]);

        let e = comment(&mut doc, "e");
        doc.page_elements_add(page, e).unwrap();
        assert_eq!(doc.children(s3).unwrap(), &[d, c, e]);
        assert!(doc.page_element_at(page, 5).is_err());
    }

    #[test]
    fn test_insert_into_empty_page_creates_step() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let line = doc
            .create_line(24, Vector3d::ZERO, Vector3d::new(1.0, 0.0, 0.0))
            .unwrap();
        doc.page_elements_insert(page, 0, line).unwrap();

        assert_eq!(doc.count(page).unwrap(), 1);
        let step = doc.child_at(page, 0).unwrap();
        assert_eq!(doc.kind(step).unwrap(), ElementKind::Step);
        assert_eq!(doc.children(step).unwrap(), &[line]);

        // one command for the whole thing
        doc.undo().unwrap();
        assert_eq!(doc.count(page).unwrap(), 0);
        assert_eq!(doc.parent(line).unwrap(), None);
    }

    #[test]
    fn test_refused_insert_into_empty_page_adds_no_step() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let other = doc.create_page("b.ldr").unwrap();
        assert!(matches!(
            doc.page_elements_insert(page, 0, other),
            Err(DomError::NotSupported(_))
        ));

        let step = doc.create_step();
        let comment = comment(&mut doc, "taken");
        doc.add(step, comment).unwrap();
        assert!(doc.page_elements_insert(page, 0, comment).is_err());

        let line = doc
            .create_line(24, Vector3d::ZERO, Vector3d::new(1.0, 0.0, 0.0))
            .unwrap();
        doc.set_locked(page, true).unwrap();
        assert!(matches!(doc.page_elements_insert(page, 0, line), Err(DomError::Locked(_))));

        assert_eq!(doc.count(page).unwrap(), 0);
        assert_eq!(doc.parent(line).unwrap(), None);
        assert_eq!(doc.undo_name(), Some("IsLockedChanged"));
    }

    #[test]
    fn test_view_events() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let s1 = doc.create_step();
        let s2 = doc.create_step();
        doc.add_range(page, &[s1, s2]).unwrap();
        let a = comment(&mut doc, "a");
        let b = comment(&mut doc, "b");
        doc.add(s1, a).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        doc.subscribe(EventFilter::Collection(page, CollectionView::PageElements), move |_, event| {
            if let DomEvent::CollectionChanged { args, .. } = event {
                sink.borrow_mut().push((args.change, args.index, args.items.clone()));
            }
        });

        doc.add(s2, b).unwrap();
        doc.page_elements_clear(page).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (CollectionChange::Added, 1, vec![b]),
                (CollectionChange::Cleared, 0, vec![a, b]),
            ]
        );
        assert_eq!(doc.count(page).unwrap(), 2);
        assert_eq!(doc.page_element_count(page).unwrap(), 0);
    }

    #[test]
    fn test_empty_step_raises_no_view_event() {
        let mut doc = Document::new();
        let page = doc.create_page("a.ldr").unwrap();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        doc.subscribe(EventFilter::Collection(page, CollectionView::PageElements), move |_, _| {
            *sink.borrow_mut() += 1;
        });

        let step = doc.create_step();
        doc.add(page, step).unwrap();
        assert_eq!(*count.borrow(), 0);
    }
}
