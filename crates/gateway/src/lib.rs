//! Trove Gateway - Chat platform collaborator interfaces
//!
//! The bot core never talks to a chat platform directly. Everything it
//! needs from the outside world is expressed by the traits in [`chat`];
//! [`memory`] provides an in-process implementation used by tests and
//! local dry runs.

pub mod chat;
pub mod memory;

pub use chat::{ActionEvent, ActionKind, ChatGateway, OfferContent, OfferHandle};
pub use memory::{MemoryGateway, MemoryOffer, OfferProbe};
