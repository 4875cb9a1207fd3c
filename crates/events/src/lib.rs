//! Change-feed model: typed attribute images, change events, and the
//! publish/subscribe feed that carries them from the invoice table to the
//! document pipeline.

pub mod bus;
pub mod change;
pub mod image;
pub mod in_memory_bus;

pub use bus::{ChangeFeed, Subscription};
pub use change::{ChangeBatch, ChangeEvent, ChangeKind};
pub use image::{AttributeValue, Image};
pub use in_memory_bus::{InMemoryChangeFeed, InMemoryFeedError};
