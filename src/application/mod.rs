//! Application services: formula evaluation, block builds and page assembly.

pub mod build;
pub mod context;
pub mod error;
pub mod formula;
pub mod page;
pub mod pagination;
pub mod render;
pub mod repos;
