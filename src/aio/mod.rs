//! This module implements the same features as the main crate, but using async io.

mod client;
mod gateway;
mod search;
mod soap;

pub use self::client::Client;
pub use self::gateway::{ControlPoint, Gateway};
pub use self::search::{Discovery, Ssdp, SsdpSubscription, Subscription};
