//! This library is a UPnP Internet Gateway Device control point client.
//!
//! It finds the gateway on the local network with SSDP and asks it to add,
//! remove and list port mappings, or to report its external IP address.
//! Every operation runs its own search, so the client keeps no gateway state.
//!
//! The blocking client lives at the crate root. Enable the `aio` feature for
//! the same operations over tokio and hyper, in the [`aio`] module.

#[macro_use]
extern crate log;

// data structures
pub use self::client::{Client, Session};
pub use self::common::mapping::{DescriptionFilter, MappingEndpoint, MappingFilter, PortMapping};
pub use self::common::options::{
    normalize, resolve_ttl, Endpoint, EndpointSpec, Lease, NormalizedEndpoints, PortMappingOptions,
    PortMappingProtocol, SearchOptions, DEFAULT_DESCRIPTION, DEFAULT_TIMEOUT, DEFAULT_TTL,
};
pub use self::common::parsing::ControlService;
pub use self::common::response::{ActionResponse, Argument, FieldValue, Fields};
pub use self::gateway::{ControlPoint, Gateway};

// search of gateway
pub use self::common::messages::IGD_SEARCH_TARGET;
pub use self::search::{Announcement, Discovery, Ssdp, SsdpSubscription, Subscription};

// errors
pub use self::errors::{Error, RequestError, SearchError};

#[cfg(feature = "aio")]
pub mod aio;
mod client;
mod common;
mod errors;
mod gateway;
mod search;
mod soap;
