//! Subscriber registry for the broadcast relay.
//!
//! Holds the set of chats that opted in to broadcasts. Every mutation is
//! written through to a [`store::SubscriberStore`] before it is reported as
//! successful; a failed save rolls the in-memory set back.

pub mod error;
pub mod registry;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use {
    error::{Error, Result},
    registry::{
        Migration, PruneOutcome, SubscribeOutcome, SubscriberRegistry, UnsubscribeOutcome,
    },
    store::SubscriberStore,
    store_file::FileStore,
    store_memory::InMemoryStore,
    types::{ChatKind, Destination, DestinationId},
};
