//! MiniJinja integration for plugin-namespaced templates
//!
//! This module provides:
//! - [`TemplateRef`] and [`resolve`] for `namespace:path` references
//! - [`FileResolver`] and [`SourceLoader`] to read sources through the host
//! - [`TemplateRegistry`], the compiled template cache
//! - [`ViewService`], the async render entry point
//!
//! # Examples
//!
//! ```rust,no_run
//! use acton_views::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), ViewError> {
//! let views = ViewService::new(
//!     ViewsConfig::default(),
//!     Arc::new(PluginDirectories::new().with_plugin("shop", "./plugins/shop")),
//!     Arc::new(MessageCatalog::new("en")),
//! );
//!
//! // shop:views/cart.html may use {% extends "./layout.html" %}
//! let html = views
//!     .render("shop:views/cart.html", &serde_json::json!({ "items": [] }), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod reference;
pub mod registry;
pub mod service;

pub use loader::{FileResolver, PluginDirectories, SourceLoader, TemplateSource};
pub use reference::{is_relative, resolve, TemplateRef, NAMESPACE_SEPARATOR};
pub use registry::TemplateRegistry;
pub use service::{CompiledTemplate, ViewService};
