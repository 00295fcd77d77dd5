//! Tessera: block rendering pipeline with a stale-while-revalidate block
//! cache, deadline-bound page builds and an embedded formula language.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
