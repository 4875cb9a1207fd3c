use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::image::Image;

/// Kind of mutation a change event describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
        }
    }
}

/// One mutation of the primary store, as delivered on the change feed.
///
/// Notes:
/// - The same record may arrive in more than one event (a retried insert
///   publishes again); consumers must be idempotent per record.
/// - `new_image` is the record state after the mutation (absent for removals).
/// - `sequence_number` is the feed position assigned at publish time; zero
///   until published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    event_id: Uuid,
    kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_image: Option<Image>,
    #[serde(default)]
    sequence_number: u64,
}

impl ChangeEvent {
    pub fn new(event_id: Uuid, kind: ChangeKind, new_image: Option<Image>) -> Self {
        Self {
            event_id,
            kind,
            new_image,
            sequence_number: 0,
        }
    }

    pub fn insert(new_image: Image) -> Self {
        Self::new(Uuid::now_v7(), ChangeKind::Insert, Some(new_image))
    }

    pub fn modify(new_image: Image) -> Self {
        Self::new(Uuid::now_v7(), ChangeKind::Modify, Some(new_image))
    }

    pub fn remove() -> Self {
        Self::new(Uuid::now_v7(), ChangeKind::Remove, None)
    }

    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn new_image(&self) -> Option<&Image> {
        self.new_image.as_ref()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }
}

/// A batch of change events delivered to the pipeline in one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromIterator<ChangeEvent> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
