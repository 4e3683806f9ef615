//! Discrete signals emitted while mixing.

use serde::{Deserialize, Serialize};

use crate::ids::SourceId;
use crate::model::SourceKind;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    GatedByExitTime,
    CapacityExceeded,
    AlreadyRegistered,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum MixerEvent {
    LayerAdded {
        layer: usize,
    },
    SourceStarted {
        layer: usize,
        id: SourceId,
        kind: SourceKind,
        port: usize,
    },
    PlayRejected {
        layer: usize,
        reason: RejectReason,
    },
    SourceReclaimed {
        layer: usize,
        id: SourceId,
        port: usize,
    },
    GraphEvaluated {
        dt: f32,
    },
}

/// Bounded event buffer drained by the host.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<MixerEvent>,
    capacity: usize,
    dropped: usize,
}

impl EventLog {
    /// Log retaining at most `capacity` events. Storage grows on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            capacity,
            dropped: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, event: MixerEvent) {
        if self.events.len() < self.capacity {
            self.events.push(event);
        } else {
            self.dropped += 1;
        }
    }

    pub fn events(&self) -> &[MixerEvent] {
        &self.events
    }

    /// Events dropped since the last drain because the log was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, MixerEvent> {
        self.dropped = 0;
        self.events.drain(..)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
