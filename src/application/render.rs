//! Template engine interface.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::entities::TemplateRef;

/// Structured errors surfaced by a template engine.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("template `{name}` not found")]
    NotFound { name: String },
    #[error("template syntax error: {message}")]
    Syntax { message: String },
    #[error("template rendering failed: {message}")]
    Render { message: String },
}

impl TemplateError {
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }
}

/// Renders a template against a JSON data context. The syntax of templates
/// is up to the implementation.
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(&self, template: &TemplateRef, context: &Value)
    -> Result<String, TemplateError>;
}

/// Drop lines that are empty or contain only whitespace.
pub fn strip_blank_lines(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_removed() {
        let rendered = "<ul>\n   \n  <li>a</li>\n\n\t\n  <li>b</li>\n</ul>\n";
        assert_eq!(
            strip_blank_lines(rendered),
            "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>"
        );
    }

    #[test]
    fn single_line_is_untouched() {
        assert_eq!(strip_blank_lines("<p>hi</p>"), "<p>hi</p>");
        assert_eq!(strip_blank_lines("  \n "), "");
    }
}
