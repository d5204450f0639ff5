//! Chrome DevTools Protocol client: transport, protocol types, connection
//! lifecycle.

pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

pub use connection::{ConnectionManager, EventSubscription, NewTabWait};
pub use error::CdpError;
pub use protocol::{
    AxNode, AxProperty, AxValue, BoxModel, BrowserVersion, CdpEvent, PageInfo, TargetInfo,
};
pub use transport::{CdpTransport, WsTransport};
