//! acton-views: plugin-namespaced MiniJinja views for Acton applications
//!
//! Templates are addressed as `plugin-name:path/to/template.html` and read
//! through a host-provided [`FileResolver`](template::FileResolver). Relative
//! `include`/`extends`/`import` targets resolve against the including
//! template and stay inside its plugin.
//!
//! - **Caching**: compiled templates are kept per reference unless
//!   `cache = false` is configured
//! - **Translation**: templates call `{{ "message.key"|__(arg) }}`, backed by
//!   an injected [`Translator`](i18n::Translator) and the render's locale
//! - **Async**: rendering is `async`; engine work runs on tokio's blocking pool
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_views::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     acton_views::observability::init()?;
//!
//!     let config = ViewsConfig::load_for_service("my-app")?;
//!     let resolver = PluginDirectories::new().with_plugin("blog", "./plugins/blog");
//!     let catalog = MessageCatalog::new("en").with_message("en", "title", "My Blog");
//!
//!     let views = ViewService::new(config, Arc::new(resolver), Arc::new(catalog));
//!     let html = views
//!         .render("blog:views/index.html", &serde_json::json!({ "posts": [] }), Some("en"))
//!         .await?;
//!     println!("{html}");
//!     Ok(())
//! }
//! ```

#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod i18n;
pub mod observability;
pub mod template;

pub use error::{ViewError, ViewResult};

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use acton_views::prelude::*;
    //! ```

    pub use crate::config::ViewsConfig;
    pub use crate::error::{ViewError, ViewResult};
    pub use crate::i18n::{MessageCatalog, Translator};
    pub use crate::template::{
        CompiledTemplate, FileResolver, PluginDirectories, TemplateRef, ViewService,
    };

    // Re-export the engine for building contexts
    pub use minijinja;
}
