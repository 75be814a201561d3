//! pgline: a pipelined Postgres wire protocol client.
//!
//! The crate covers four layers:
//!
//! * `protocol` - length-prefixed packet framing and the message catalog
//! * `connection` - startup/authentication handshake and the [`Session`]
//! * `sink` - observers that receive every decoded wire event
//! * `types` - a static catalog of built-in type oids
//!
//! A [`Session`] accepts many outstanding requests at once. Responses are
//! consumed by a single reader task in the order the requests were written,
//! so each caller's [`Pending`] future resolves with its own response.
//!
//! ```no_run
//! # async fn example() -> pgline::Result<()> {
//! use pgline::{ConnectionConfig, Session};
//!
//! let config = ConnectionConfig::builder("postgres", "postgres")
//!     .password("secret")
//!     .build();
//! let session = Session::connect("localhost", 5432, &config, None).await?;
//!
//! let first = session.simple_query("SELECT 1").await?;
//! let second = session.simple_query("SELECT 2").await?;
//! let (first, second) = (first.await?, second.await?);
//! assert_eq!(first[0].rows.len(), 1);
//! assert_eq!(second[0].rows.len(), 1);
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod sink;
pub mod types;

pub use connection::{
    handshake, CancelToken, ConnectionConfig, ConnectionConfigBuilder, ConnectionProperties,
    ExtendedQuery, Inbound, Pending, Session,
};
pub use error::{Error, Result, ServerError};
pub use sink::{EventSink, QueryResult, ResultCollector};
