//! # vibium-proxy
//!
//! WebSocket proxy that multiplexes automation clients onto isolated
//! browsers. Each connecting client gets its own browser and BiDi socket;
//! frames pass through verbatim in both directions, except that the proxy
//! understands three extension methods (`vibium:find`, `vibium:click`,
//! `vibium:type`) and answers those itself by issuing BiDi commands on the
//! same downstream socket, using a reserved id range (1,000,000 and up) to
//! keep its traffic apart from the client's.

mod client;
mod router;
mod server;
mod session;

pub use client::ClientHandle;
pub use router::Router;
pub use server::Server;
pub use session::Session;

pub use vibium::{Error, Result};
