//! # mvn-query
//!
//! Keeps a local copy of a Maven repository index fresh and queries it by
//! coordinates and recency.
//!
//! ## Architecture
//!
//! - **app**: The query pipeline tying the pieces below together
//! - **cli** / **config**: Command-line surface and resolved run configuration
//! - **freshness**: Decides whether the local index needs an update and records it
//! - **metadata** / **properties**: The per-repository `index.properties` file
//! - **repo_key**: Repository URL to cache directory key
//! - **index**: Collaborator traits (store, context, updater, search engine)
//! - **store**: LMDB-backed index contexts via heed
//! - **updater** / **index_data** / **transport**: Full and incremental index download
//! - **query** / **search**: Filter compilation and evaluation
//! - **format**: Result line rendering
//! - **error**: Error taxonomy

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod freshness;
pub mod index;
pub mod index_data;
pub mod metadata;
pub mod properties;
pub mod query;
pub mod repo_key;
pub mod search;
pub mod store;
pub mod transport;
pub mod updater;

pub use error::{Error, Result};
