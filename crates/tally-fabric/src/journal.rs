use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use tally_types::LedgerTime;

use crate::error::{FabricError, Result};
use crate::event::{EventKind, EventPayload, EventSubject, LedgerEvent};

/// Filter for subscribing to a subset of ledger events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events about these subjects are delivered.
    pub subjects: Option<Vec<EventSubject>>,
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
    /// If set, only events stamped after this time are delivered.
    pub since: Option<LedgerTime>,
}

impl EventFilter {
    /// Returns `true` if the given event matches this filter.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(ref subjects) = self.subjects {
            if !subjects.contains(&event.subject) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(ref since) = self.since {
            if !event.at.is_after(since) {
                return false;
            }
        }
        true
    }
}

/// A broadcast channel receiver for ledger events.
pub type EventStream = broadcast::Receiver<LedgerEvent>;

struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<LedgerEvent>,
}

/// Fan-out router that delivers events to matching subscribers.
struct EventRouter {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventRouter {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    fn subscribe(&self, filter: EventFilter, capacity: usize) -> Result<EventStream> {
        let (tx, rx) = broadcast::channel(capacity);
        self.subscribers
            .write()
            .map_err(|_| FabricError::LockPoisoned)?
            .push(Subscriber { filter, sender: tx });
        Ok(rx)
    }

    /// Route an event to all matching subscribers, pruning closed channels.
    fn route(&self, event: &LedgerEvent) -> Result<()> {
        let mut subs = self.subscribers.write().map_err(|_| FabricError::LockPoisoned)?;
        subs.retain(|sub| {
            if sub.filter.matches(event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

/// Append-only journal of every ledger transition.
///
/// Sequence numbers start at 1 and are contiguous. Events are appended
/// before they are routed, so a subscriber never sees an event the journal
/// does not hold.
pub struct EventJournal {
    events: RwLock<Vec<LedgerEvent>>,
    router: EventRouter,
    channel_capacity: usize,
}

impl EventJournal {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            router: EventRouter::new(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Append an event and fan it out to matching subscribers.
    pub fn emit(
        &self,
        at: LedgerTime,
        subject: EventSubject,
        kind: EventKind,
        payload: EventPayload,
    ) -> Result<LedgerEvent> {
        let event = {
            let mut events = self.events.write().map_err(|_| FabricError::LockPoisoned)?;
            let seq = events.len() as u64 + 1;
            let event = LedgerEvent::new(seq, at, subject, kind, payload);
            events.push(event.clone());
            event
        };
        self.router.route(&event)?;
        debug!(id = %event.id, seq = event.seq, kind = %event.kind, subject = %event.subject, "event emitted");
        Ok(event)
    }

    /// All events in sequence order.
    pub fn events(&self) -> Result<Vec<LedgerEvent>> {
        let events = self.events.read().map_err(|_| FabricError::LockPoisoned)?;
        Ok(events.clone())
    }

    /// Events about a single subject, in sequence order.
    pub fn events_for(&self, subject: &EventSubject) -> Result<Vec<LedgerEvent>> {
        let events = self.events.read().map_err(|_| FabricError::LockPoisoned)?;
        Ok(events.iter().filter(|e| &e.subject == subject).cloned().collect())
    }

    /// Events matching a filter, in sequence order.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<LedgerEvent>> {
        let events = self.events.read().map_err(|_| FabricError::LockPoisoned)?;
        Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check sequence contiguity and every integrity hash.
    pub fn verify(&self) -> Result<()> {
        let events = self.events.read().map_err(|_| FabricError::LockPoisoned)?;
        for (index, event) in events.iter().enumerate() {
            let expected = index as u64 + 1;
            if event.seq != expected {
                return Err(FabricError::SequenceGap {
                    expected,
                    found: event.seq,
                });
            }
            if !event.verify_integrity() {
                return Err(FabricError::IntegrityViolation { seq: event.seq });
            }
        }
        Ok(())
    }

    /// Subscribe to future events matching the given filter.
    pub fn subscribe(&self, filter: EventFilter) -> Result<EventStream> {
        self.router.subscribe(filter, self.channel_capacity)
    }

    pub fn subscriber_count(&self) -> usize {
        self.router.subscriber_count()
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventJournal")
            .field("events", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
