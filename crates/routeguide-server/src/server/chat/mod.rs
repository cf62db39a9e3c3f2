//! `RouteChat` relay.
//!
//! - [`relay`] - location-keyed registry of live chat participants and the
//!   broadcast logic between them.

pub mod relay;

pub use relay::{ChatRelay, Delivery, NoteSender, SubscriberId, Subscription};
