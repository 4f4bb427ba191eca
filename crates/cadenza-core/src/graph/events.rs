//! Topology change notifications
//!
//! Listeners run synchronously on the thread that mutates the graph. A
//! listener that panics is logged and skipped; the remaining listeners still
//! see the event.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use super::node::{Connection, NodeKind};

/// A structural change to the routing graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded { id: String, kind: NodeKind },
    NodeRemoved { id: String, kind: NodeKind },
    Connected(Connection),
    Disconnected(Connection),
    ChannelAdded { id: String },
    ChannelRemoved { id: String },
    /// An insert effect joined a channel chain (or a send bus)
    EffectAdded { owner: String, effect: String },
    /// An insert effect left a channel chain (or a send bus)
    EffectRemoved { owner: String, effect: String },
}

/// Returned by `on_event`; pass to `remove_listener` to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&GraphEvent) + Send>;

#[derive(Default)]
pub(crate) struct Listeners {
    entries: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl Listeners {
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn emit(&self, event: &GraphEvent) {
        for (id, listener) in &self.entries {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::warn!("Graph listener {:?} panicked on {:?}", id, event);
            }
        }
    }
}
