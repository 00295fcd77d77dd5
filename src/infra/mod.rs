//! Infrastructure adapters and runtime bootstrap.

pub mod content;
pub mod error;
pub mod mailer;
pub mod media;
pub mod telemetry;
pub mod templates;

pub use content::InMemoryContentRepository;
pub use mailer::LogMailer;
pub use media::PassthroughResizer;
pub use templates::MiniJinjaEngine;
