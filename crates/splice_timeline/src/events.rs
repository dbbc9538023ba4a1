// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observer notifications.
//!
//! Elements and the timeline publish [`TimelineEvent`]s on an [`EventBus`].
//! Each subscriber owns the receiving end of an `mpsc` channel; subscribers
//! that hang up are dropped on the next publish.

use crate::clip::ClipId;
use crate::edit::{Edge, EditMode};
use crate::element::ElementId;
use crate::interval::ClockTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Arc;

/// Something observable happened in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimelineEvent {
    /// A keyframe track was bound to a child parameter
    ControlBindingAdded {
        /// Element owning the binding
        element: ElementId,
        /// Bound parameter, `owner::name`
        property: String,
    },
    /// A binding was removed or replaced
    ControlBindingRemoved {
        /// Element owning the binding
        element: ElementId,
        /// Bound parameter, `owner::name`
        property: String,
    },
    /// An element was switched on or off
    ActiveChanged {
        /// Element
        element: ElementId,
        /// New state
        active: bool,
    },
    /// An edit was applied
    Edited {
        /// Edited clip
        clip: ClipId,
        /// Edit mode
        mode: EditMode,
        /// Edge the edit worked on
        edge: Edge,
        /// Requested position, after snapping
        position: ClockTime,
    },
}

/// Fan-out channel for [`TimelineEvent`]s. Clones share subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<TimelineEvent>>>>,
}

impl EventBus {
    /// Create a bus without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> mpsc::Receiver<TimelineEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `event` to every subscriber
    pub fn publish(&self, event: TimelineEvent) {
        tracing::trace!(?event, "publish");
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}
