//! Change notification
//!
//! Design: mutations queue plain `DomEvent` values; the document drains the
//! queue synchronously once the outermost mutation has finished. Handlers get
//! `&mut Document`, so they can inspect or mutate the graph; anything they
//! raise is queued behind the events still pending.

use crate::document::Document;
use crate::types::{ObjectId, Property, PropertyValue, SubscriptionId};
use std::collections::VecDeque;
use std::fmt;

/// Which ordered view of an owner changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionView {
    /// The owner's own children.
    Children,
    /// A page's flattened elements across all its steps.
    PageElements,
    /// A group's members.
    GroupMembers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionChange {
    Added,
    Removed,
    Replaced,
    Cleared,
}

impl CollectionChange {
    pub fn event_name(self) -> &'static str {
        match self {
            CollectionChange::Added => "ItemsAdded",
            CollectionChange::Removed => "ItemsRemoved",
            CollectionChange::Replaced => "ItemsReplaced",
            CollectionChange::Cleared => "CollectionCleared",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChangedArgs {
    pub property: Property,
    pub old: PropertyValue,
    pub new: PropertyValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChangedArgs {
    pub view: CollectionView,
    pub change: CollectionChange,
    /// Affected items. For `Replaced`, the new items; see `replaced`.
    pub items: Vec<ObjectId>,
    /// Items that were replaced, empty otherwise.
    pub replaced: Vec<ObjectId>,
    /// Index of the first affected item.
    pub index: usize,
}

/// Payload of the generic `Changed` event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeArgs {
    Property(PropertyChangedArgs),
    Collection(CollectionChangedArgs),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    PropertyChanged {
        source: ObjectId,
        args: PropertyChangedArgs,
    },
    CollectionChanged {
        source: ObjectId,
        args: CollectionChangedArgs,
    },
    Changed {
        source: ObjectId,
        operation: &'static str,
        args: ChangeArgs,
    },
    PathToDocumentChanged {
        source: ObjectId,
    },
    Disposed {
        source: ObjectId,
    },
}

impl DomEvent {
    pub fn source(&self) -> ObjectId {
        match self {
            DomEvent::PropertyChanged { source, .. }
            | DomEvent::CollectionChanged { source, .. }
            | DomEvent::Changed { source, .. }
            | DomEvent::PathToDocumentChanged { source }
            | DomEvent::Disposed { source } => *source,
        }
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Source(ObjectId),
    Property(ObjectId, Property),
    Changed(ObjectId),
    Collection(ObjectId, CollectionView),
    PathToDocument(ObjectId),
    Disposed(ObjectId),
}

impl EventFilter {
    pub fn matches(&self, event: &DomEvent) -> bool {
        match (*self, event) {
            (EventFilter::All, _) => true,
            (EventFilter::Source(id), e) => e.source() == id,
            (EventFilter::Property(id, property), DomEvent::PropertyChanged { source, args }) => {
                *source == id && args.property == property
            }
            (EventFilter::Changed(id), DomEvent::Changed { source, .. }) => *source == id,
            (EventFilter::Collection(id, view), DomEvent::CollectionChanged { source, args }) => {
                *source == id && args.view == view
            }
            (EventFilter::PathToDocument(id), DomEvent::PathToDocumentChanged { source }) => {
                *source == id
            }
            (EventFilter::Disposed(id), DomEvent::Disposed { source }) => *source == id,
            _ => false,
        }
    }

    /// The single object this filter is bound to, if any.
    pub fn source(&self) -> Option<ObjectId> {
        match *self {
            EventFilter::All => None,
            EventFilter::Source(id)
            | EventFilter::Property(id, _)
            | EventFilter::Changed(id)
            | EventFilter::Collection(id, _)
            | EventFilter::PathToDocument(id)
            | EventFilter::Disposed(id) => Some(id),
        }
    }
}

pub type EventHandler = Box<dyn FnMut(&mut Document, &DomEvent)>;

pub(crate) struct Listener {
    pub(crate) id: SubscriptionId,
    pub(crate) filter: EventFilter,
    pub(crate) handler: EventHandler,
}

/// Subscriber registry plus the pending-event queue.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    listeners: Vec<Listener>,
    pending: VecDeque<DomEvent>,
    next_id: SubscriptionId,
    dispatching: bool,
    removed_while_dispatching: Vec<SubscriptionId>,
}

impl EventDispatcher {
    pub(crate) fn subscribe(&mut self, filter: EventFilter, handler: EventHandler) -> SubscriptionId {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push(Listener {
            id,
            filter,
            handler,
        });
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        if self.dispatching {
            self.removed_while_dispatching.push(id);
            return true;
        }
        self.listeners.len() != before
    }

    /// Drop subscriptions bound to objects that no longer exist.
    pub(crate) fn prune<F>(&mut self, is_live: F)
    where
        F: Fn(ObjectId) -> bool,
    {
        self.listeners
            .retain(|l| l.filter.source().map_or(true, |source| is_live(source)));
    }

    /// Unsubscribed by a handler earlier in the current pass.
    pub(crate) fn is_removed(&self, id: SubscriptionId) -> bool {
        self.removed_while_dispatching.contains(&id)
    }

    pub(crate) fn subscriber_count(&self, source: ObjectId) -> usize {
        self.listeners
            .iter()
            .filter(|l| l.filter.source() == Some(source))
            .count()
    }

    pub(crate) fn queue(&mut self, event: DomEvent) {
        self.pending.push_back(event);
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Position to hand back to `discard_from`.
    pub(crate) fn mark(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything queued since `mark`.
    pub(crate) fn discard_from(&mut self, mark: usize) {
        self.pending.truncate(mark);
    }

    /// Start draining. Returns false when a drain is already running.
    pub(crate) fn begin_dispatch(&mut self) -> bool {
        if self.dispatching {
            return false;
        }
        self.dispatching = true;
        true
    }

    pub(crate) fn end_dispatch(&mut self) {
        self.dispatching = false;
        self.removed_while_dispatching.clear();
    }

    pub(crate) fn next_event(&mut self) -> Option<DomEvent> {
        self.pending.pop_front()
    }

    pub(crate) fn take_listeners(&mut self) -> Vec<Listener> {
        std::mem::take(&mut self.listeners)
    }

    /// Put listeners back after a handler pass, keeping any that were added
    /// meanwhile and dropping any that were removed.
    pub(crate) fn restore_listeners(&mut self, mut taken: Vec<Listener>) {
        let removed = &self.removed_while_dispatching;
        taken.retain(|l| !removed.contains(&l.id));
        taken.append(&mut self.listeners);
        self.listeners = taken;
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.pending.len())
            .field("dispatching", &self.dispatching)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property_event(source: ObjectId, property: Property) -> DomEvent {
        DomEvent::PropertyChanged {
            source,
            args: PropertyChangedArgs {
                property,
                old: PropertyValue::Bool(false),
                new: PropertyValue::Bool(true),
            },
        }
    }

    #[test]
    fn test_filter_matching() {
        let event = property_event(3, Property::IsVisible);

        assert!(EventFilter::All.matches(&event));
        assert!(EventFilter::Source(3).matches(&event));
        assert!(EventFilter::Property(3, Property::IsVisible).matches(&event));
        assert!(!EventFilter::Property(3, Property::IsGhosted).matches(&event));
        assert!(!EventFilter::Changed(3).matches(&event));
        assert!(!EventFilter::Source(4).matches(&event));
    }

    #[test]
    fn test_queue_order() {
        let mut dispatcher = EventDispatcher::default();
        dispatcher.queue(DomEvent::Disposed { source: 1 });
        dispatcher.queue(DomEvent::Disposed { source: 2 });

        assert_eq!(dispatcher.next_event().unwrap().source(), 1);
        assert_eq!(dispatcher.next_event().unwrap().source(), 2);
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_discard_from_mark() {
        let mut dispatcher = EventDispatcher::default();
        dispatcher.queue(DomEvent::Disposed { source: 1 });
        let mark = dispatcher.mark();
        dispatcher.queue(DomEvent::Disposed { source: 2 });
        dispatcher.queue(DomEvent::Disposed { source: 3 });
        dispatcher.discard_from(mark);

        assert_eq!(dispatcher.next_event().unwrap().source(), 1);
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_restore_keeps_new_and_drops_removed() {
        let mut dispatcher = EventDispatcher::default();
        let first = dispatcher.subscribe(EventFilter::All, Box::new(|_, _| {}));
        let second = dispatcher.subscribe(EventFilter::Source(9), Box::new(|_, _| {}));

        assert!(dispatcher.begin_dispatch());
        let taken = dispatcher.take_listeners();
        dispatcher.unsubscribe(first);
        let third = dispatcher.subscribe(EventFilter::All, Box::new(|_, _| {}));
        dispatcher.restore_listeners(taken);
        dispatcher.end_dispatch();

        let ids: Vec<_> = dispatcher.listeners.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![second, third]);
    }
}
