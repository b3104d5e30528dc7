//! Read-only HTTP exposure of the livegit published repository.
//!
//! [`PathTranslator`] decides which request paths belong to the repository;
//! [`PathRewritingServer`] wires it in front of a static file service so
//! that `git clone http://host:port/<prefix>` works over git's dumb HTTP
//! protocol.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod server;
pub mod translate;

pub use error::ServeError;
pub use server::PathRewritingServer;
pub use translate::{PathTranslator, Rejection, Resolved};
