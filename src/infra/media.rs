//! Image resizer that only builds URLs for an external resizing service.

use async_trait::async_trait;

use crate::application::repos::{ImageResizer, ResizeError};

#[derive(Debug, Clone)]
pub struct PassthroughResizer {
    base: String,
}

impl PassthroughResizer {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageResizer for PassthroughResizer {
    async fn resize(
        &self,
        source: &str,
        width: u32,
        height: Option<u32>,
    ) -> Result<String, ResizeError> {
        if source.is_empty() {
            return Err(ResizeError("empty image source".into()));
        }
        if width == 0 || height == Some(0) {
            return Err(ResizeError("dimensions must be positive".into()));
        }

        let source = source.trim_start_matches('/');
        let mut url = format!("{}/{source}?w={width}", self.base);
        if let Some(height) = height {
            url.push_str(&format!("&h={height}"));
        }
        Ok(url)
    }
}
