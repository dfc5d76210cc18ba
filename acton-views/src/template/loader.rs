//! Template source loading through the host's plugin file resolver

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::runtime::Handle;

use super::reference::TemplateRef;
use crate::error::{ViewError, ViewResult};

/// Host collaborator that reads plugin files by logical reference
///
/// Implementations receive a fully-qualified `namespace:path` reference and
/// return the file's text. Errors are handed back to the caller of
/// [`SourceLoader::get_source`] without being reclassified.
///
/// # Examples
///
/// ```rust
/// use acton_views::template::FileResolver;
/// use async_trait::async_trait;
///
/// struct Inline;
///
/// #[async_trait]
/// impl FileResolver for Inline {
///     async fn read_file(&self, reference: &str) -> std::io::Result<String> {
///         Ok(format!("<p>{reference}</p>"))
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileResolver: Send + Sync {
    /// Read the contents of the file named by `reference`
    async fn read_file(&self, reference: &str) -> io::Result<String>;
}

/// Raw template text paired with the reference it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    /// Template text
    pub text: String,
    /// Reference the text was loaded from
    pub reference: TemplateRef,
}

/// Loads template sources for the engine
#[derive(Clone)]
pub struct SourceLoader {
    resolver: Arc<dyn FileResolver>,
}

impl std::fmt::Debug for SourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLoader").finish_non_exhaustive()
    }
}

impl SourceLoader {
    /// Create a loader backed by `resolver`
    #[must_use]
    pub fn new(resolver: Arc<dyn FileResolver>) -> Self {
        Self { resolver }
    }

    /// Fetch the source of `reference`
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::InvalidReference`] for a malformed reference and
    /// [`ViewError::Io`] carrying the resolver's error when the read fails.
    pub async fn get_source(&self, reference: &str) -> ViewResult<TemplateSource> {
        let reference = TemplateRef::parse(reference)?;

        let text = self
            .resolver
            .read_file(reference.as_str())
            .await
            .map_err(|source| ViewError::Io {
                reference: reference.to_string(),
                source: Arc::new(source),
            })?;

        tracing::debug!(reference = %reference, bytes = text.len(), "loaded template source");
        Ok(TemplateSource { text, reference })
    }

    /// Engine loader hook
    ///
    /// The engine loads synchronously, so this must only run on a blocking
    /// worker thread, never on an async task.
    pub(crate) fn load_blocking(&self, name: &str) -> Result<Option<String>, minijinja::Error> {
        let handle = Handle::try_current().map_err(|err| {
            minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                "template loader used outside of a tokio runtime",
            )
            .with_source(err)
        })?;

        handle
            .block_on(self.get_source(name))
            .map(|source| Some(source.text))
            .map_err(ViewError::into_engine_error)
    }
}

/// [`FileResolver`] that maps plugin namespaces to directories on disk
///
/// `blog:views/index.html` is read from `<blog root>/views/index.html`.
///
/// # Examples
///
/// ```rust,no_run
/// use acton_views::template::PluginDirectories;
///
/// let resolver = PluginDirectories::new()
///     .with_plugin("blog", "./plugins/blog")
///     .with_plugin("shop", "./plugins/shop");
/// assert!(resolver.root("blog").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PluginDirectories {
    roots: HashMap<String, PathBuf>,
}

impl PluginDirectories {
    /// Create an empty resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the root directory of a plugin
    #[must_use]
    pub fn with_plugin(mut self, namespace: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.register(namespace, root);
        self
    }

    /// Register the root directory of a plugin in place
    pub fn register(&mut self, namespace: impl Into<String>, root: impl Into<PathBuf>) {
        self.roots.insert(namespace.into(), root.into());
    }

    /// Root directory registered for `namespace`
    #[must_use]
    pub fn root(&self, namespace: &str) -> Option<&Path> {
        self.roots.get(namespace).map(PathBuf::as_path)
    }

    /// Filesystem path a reference points at
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` for malformed references or paths that
    /// climb out of the plugin root, and with `NotFound` for unknown plugins.
    pub fn locate(&self, reference: &str) -> io::Result<PathBuf> {
        let reference = TemplateRef::parse(reference)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        let relative = Path::new(reference.path());
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path escapes plugin root: {reference}"),
            ));
        }

        let root = self.root(reference.namespace()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown plugin: {}", reference.namespace()),
            )
        })?;

        Ok(root.join(reference.path().trim_start_matches('/')))
    }
}

#[async_trait]
impl FileResolver for PluginDirectories {
    async fn read_file(&self, reference: &str) -> io::Result<String> {
        let path = self.locate(reference)?;
        fs::read_to_string(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_source_returns_text_and_reference() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .times(1)
            .returning(|_| Ok("<h1>{{ title }}</h1>".to_string()));

        let loader = SourceLoader::new(Arc::new(resolver));
        let source = loader.get_source("app:views/index.html").await.unwrap();

        assert_eq!(source.text, "<h1>{{ title }}</h1>");
        assert_eq!(source.reference.as_str(), "app:views/index.html");
    }

    #[tokio::test]
    async fn test_get_source_propagates_resolver_error() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().times(1).returning(|_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        });

        let loader = SourceLoader::new(Arc::new(resolver));
        let err = loader.get_source("app:views/index.html").await.unwrap_err();

        let io_err = err.io_error().expect("io error");
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(io_err.to_string(), "denied");
    }

    #[tokio::test]
    async fn test_get_source_rejects_malformed_reference() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().never();

        let loader = SourceLoader::new(Arc::new(resolver));
        let err = loader.get_source("views/index.html").await.unwrap_err();
        assert!(matches!(err, ViewError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_plugin_directories_reads_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("views")).unwrap();
        std::fs::write(dir.path().join("views/index.html"), "hello").unwrap();

        let resolver = PluginDirectories::new().with_plugin("app", dir.path());
        let text = resolver.read_file("app:views/index.html").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_plugin_directories_unknown_plugin() {
        let resolver = PluginDirectories::new();
        let err = resolver.read_file("ghost:views/index.html").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_plugin_directories_rejects_escape() {
        let resolver = PluginDirectories::new().with_plugin("app", "/srv/app");
        let err = resolver.locate("app:../../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_plugin_directories_rejects_malformed_reference() {
        let resolver = PluginDirectories::new().with_plugin("app", "/srv/app");
        let err = resolver.locate("views/index.html").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_plugin_directories_locate() {
        let resolver = PluginDirectories::new().with_plugin("app", "/srv/app");
        let path = resolver.locate("app:views/pages/a.html").unwrap();
        assert_eq!(path, PathBuf::from("/srv/app/views/pages/a.html"));
    }
}
