//! Newsdesk - a caching news reader core and its API proxy
//!
//! The library side holds the TTL cache and the fetch coordinator that a
//! reader front end talks through. The binary runs the proxy that forwards
//! requests to the third-party news API.

pub mod article;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod routes;
pub mod upstream;
