//! Configuration management for acton-views
//!
//! Settings live in the `[views]` table of the host application's
//! configuration. They are loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `ACTON_` prefix, `__` for nesting)
//! 2. `./config.toml` (development)
//! 3. `~/.config/acton-views/{service}/config.toml` (user config, XDG)
//! 4. `/etc/acton-views/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! Environment variable format: `ACTON_VIEWS__FIELD_NAME`, for example
//! `ACTON_VIEWS__CACHE=false`.
//!
//! # Example Configuration
//!
//! ```toml
//! # config.toml
//! [views]
//! cache = true
//! trim_blocks = true
//! lstrip_blocks = true
//! strict_undefined = false
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ViewResult;

/// Template rendering configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Keep compiled templates for the lifetime of the service
    pub cache: bool,

    /// Remove the first newline after a block tag
    pub trim_blocks: bool,

    /// Strip whitespace before a block tag on its line
    pub lstrip_blocks: bool,

    /// Keep the final newline of a template
    pub keep_trailing_newline: bool,

    /// Fail the render on any undefined variable instead of printing nothing
    pub strict_undefined: bool,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            cache: true,
            trim_blocks: false,
            lstrip_blocks: false,
            keep_trailing_newline: false,
            strict_undefined: false,
        }
    }
}

/// Shape of the host configuration file this crate reads from
#[derive(Debug, Default, Serialize, Deserialize)]
struct HostConfig {
    #[serde(default)]
    views: ViewsConfig,
}

impl ViewsConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the compiled template cache
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Enable or disable `trim_blocks`
    #[must_use]
    pub const fn with_trim_blocks(mut self, enabled: bool) -> Self {
        self.trim_blocks = enabled;
        self
    }

    /// Enable or disable `lstrip_blocks`
    #[must_use]
    pub const fn with_lstrip_blocks(mut self, enabled: bool) -> Self {
        self.lstrip_blocks = enabled;
        self
    }

    /// Enable or disable keeping the trailing newline
    #[must_use]
    pub const fn with_keep_trailing_newline(mut self, enabled: bool) -> Self {
        self.keep_trailing_newline = enabled;
        self
    }

    /// Enable or disable strict undefined handling
    #[must_use]
    pub const fn with_strict_undefined(mut self, enabled: bool) -> Self {
        self.strict_undefined = enabled;
        self
    }

    /// Load configuration for a specific service
    ///
    /// Searches for configuration in XDG-compliant locations with the
    /// precedence listed in the module docs.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be parsed or a value
    /// has the wrong type.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use acton_views::config::ViewsConfig;
    ///
    /// # fn example() -> Result<(), acton_views::ViewError> {
    /// let config = ViewsConfig::load_for_service("my-app")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_for_service(service_name: &str) -> ViewResult<Self> {
        let mut figment = Self::defaults()?;

        // 4. System config: /etc/acton-views/{service_name}/config.toml
        let system_config = PathBuf::from("/etc/acton-views")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        // 3. User config: ~/.config/acton-views/{service_name}/config.toml
        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        // 2. Local config: ./config.toml
        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or a value has the
    /// wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> ViewResult<Self> {
        let figment = Self::defaults()?.merge(Toml::file(path.as_ref()));
        Self::extract(figment)
    }

    /// Extract the `[views]` table from a host-provided figment
    ///
    /// Missing keys fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a value has the wrong type.
    pub fn from_figment(figment: &Figment) -> ViewResult<Self> {
        let host: HostConfig = Self::defaults()?.merge(figment.clone()).extract()?;
        Ok(host.views)
    }

    /// Get the recommended XDG config path for a service
    ///
    /// # Example
    ///
    /// ```rust
    /// use acton_views::config::ViewsConfig;
    ///
    /// let path = ViewsConfig::recommended_path("my-app");
    /// assert!(path.ends_with("my-app/config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| {
                config_dir
                    .join("acton-views")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }

    fn defaults() -> ViewResult<Figment> {
        Ok(Figment::new().merge(Toml::string(&toml::to_string(&HostConfig::default())?)))
    }

    fn extract(figment: Figment) -> ViewResult<Self> {
        // 1. Environment variables (highest priority, double underscore for nesting)
        let host: HostConfig = figment
            .merge(Env::prefixed("ACTON_").split("__").lowercase(true))
            .extract()?;

        tracing::debug!(cache = host.views.cache, "loaded views configuration");
        Ok(host.views)
    }
}
