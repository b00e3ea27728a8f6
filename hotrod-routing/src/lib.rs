//! **hotrod-routing** is the request routing layer of a remote cache client. It decides which
//! server each request goes to, keeps a bounded pool of connections per server and fails requests
//! over to other servers when a connection breaks.
//!
//! ## Getting started
//!
//! This example routes every request to the first server of the list, falling back to the next
//! ones only when it fails.
//!
//! ```no_run
//! use futures::FutureExt;
//! use hotrod_routing::cluster::{Router, RouterConfigBuilder};
//! use hotrod_routing::load_balancing::BalancingStrategyKind;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RouterConfigBuilder::new()
//!         .with_server_list("127.0.0.1:11222;127.0.0.1:11223")
//!         .with_balancing_strategy(BalancingStrategyKind::AlwaysFirst)
//!         .build()
//!         .unwrap();
//!     let router = Router::tcp(config);
//!
//!     let response = router
//!         .execute(|transport| {
//!             async move {
//!                 transport.write_all(b"PING").await?;
//!                 let mut response = [0u8; 4];
//!                 transport.read_exact(&mut response).await?;
//!                 Ok(response)
//!             }
//!             .boxed()
//!         })
//!         .await
//!         .expect("Request error");
//! }
//! ```
//!
//! ## Balancing and failover
//!
//! Requests are distributed by a [balancing strategy](crate::load_balancing) chosen in the
//! [`RouterConfig`](crate::cluster::RouterConfig). When a request fails with a transport error,
//! the [retry policy](crate::retry) decides whether it is sent to another server. Servers which
//! failed are skipped only for the rest of that request. Protocol errors are never retried.
//!
//! The server list can be replaced at any time with
//! [`Router::notify_topology_changed`](crate::cluster::Router::notify_topology_changed).

pub mod cluster;
pub mod error;
pub mod future;
pub mod load_balancing;
pub mod retry;
pub mod transport;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
