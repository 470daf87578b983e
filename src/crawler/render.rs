//! Headless rendering seam
//!
//! JavaScript-heavy pages can be handed to an external renderer. The engine
//! calls it when a caller asks for rendering, or when extraction from the raw
//! HTML comes back with low confidence.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    #[error("Rendering failed: {0}")]
    Failed(String),
}

/// Produces the post-JavaScript DOM of a page
#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    /// Renders `url`; `html` is the body already fetched over plain HTTP
    async fn render(&self, url: &Url, html: &str) -> Result<String, RenderError>;
}
