//! poolpatch-client: HTTP client library
//!
//! Talks to both sides of a pool: the host agent every member runs, and the
//! coordinator endpoints that manage repositories and drive updates.
//!
//! # Examples
//!
//! ```no_run
//! use poolpatch_client::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://coordinator:8080")?
//!     .login("pool-secret")
//!     .await?;
//!
//! let sync = client.sync_pool().await?;
//! if !sync.up_to_date {
//!     let report = client.pool_updates(None).await?;
//!     for host in &report.hosts {
//!         client.apply_updates(&host.host, &report.hash).await?;
//!     }
//! }
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;

pub use error::{ClientError, Result};
pub use http::{HttpClient, SESSION_HEADER};
