//! Render service: the public entry point for rendering plugin templates

use std::sync::Arc;

use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::loader::{FileResolver, SourceLoader, TemplateSource};
use super::reference::join_template_name;
use super::registry::TemplateRegistry;
use crate::config::ViewsConfig;
use crate::error::{Stage, ViewError, ViewResult};
use crate::i18n::{self, Translator, LOCALE_KEY};

/// A parsed template together with the environment that owns it
///
/// The environment also keeps every template pulled in through `include`,
/// `extends` or `import` while rendering, so a cached template stops touching
/// the resolver once it has been rendered.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    reference: Arc<str>,
    env: Arc<Environment<'static>>,
}

impl CompiledTemplate {
    pub(crate) fn new(reference: &str, env: Environment<'static>) -> Self {
        Self {
            reference: Arc::from(reference),
            env: Arc::new(env),
        }
    }

    /// Reference this template was compiled from
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Render synchronously with a prepared context
    ///
    /// Blocks on the resolver when an `include`/`extends` target is not
    /// loaded yet, so this must not be called from an async task. Use
    /// [`ViewService::render`] from async code.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Render`] for evaluation failures and
    /// [`ViewError::Io`] when a referenced template cannot be read.
    pub fn render_blocking(&self, ctx: Value) -> ViewResult<String> {
        self.env
            .get_template(&self.reference)
            .and_then(|template| template.render(ctx))
            .map_err(|err| ViewError::from_engine(&self.reference, err, Stage::Render))
    }
}

/// Renders `namespace:path` templates through MiniJinja
///
/// Cloning is cheap; clones share the cache, resolver and translator.
///
/// # Examples
///
/// ```rust,no_run
/// use acton_views::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), ViewError> {
/// let resolver = PluginDirectories::new().with_plugin("blog", "./plugins/blog");
/// let catalog = MessageCatalog::new("en").with_message("en", "nav.home", "Home");
///
/// let views = ViewService::new(ViewsConfig::default(), Arc::new(resolver), Arc::new(catalog));
///
/// let html = views
///     .render("blog:views/posts/index.html", &serde_json::json!({ "posts": [] }), Some("en"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ViewService {
    config: Arc<ViewsConfig>,
    loader: SourceLoader,
    translator: Arc<dyn Translator>,
    registry: TemplateRegistry,
}

impl std::fmt::Debug for ViewService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewService")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ViewService {
    /// Create a service reading templates through `resolver`
    #[must_use]
    pub fn new(
        config: ViewsConfig,
        resolver: Arc<dyn FileResolver>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let registry = TemplateRegistry::with_caching(config.cache);
        Self {
            config: Arc::new(config),
            loader: SourceLoader::new(resolver),
            translator,
            registry,
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ViewsConfig {
        &self.config
    }

    /// The compiled template cache
    #[must_use]
    pub const fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Drop every cached template so the next render reads from the resolver
    pub fn clear_cache(&self) {
        self.registry.clear();
    }

    /// Render the template at `reference`
    ///
    /// `data` must serialize to a map (or to unit/`None` for an empty
    /// context). It is copied before the reserved `_locale` variable is added,
    /// so the caller's value is left untouched.
    ///
    /// # Errors
    ///
    /// - [`ViewError::InvalidReference`] for a malformed reference
    /// - [`ViewError::Io`] when the template or one it references cannot be read
    /// - [`ViewError::Compile`] for syntax errors
    /// - [`ViewError::Render`] for evaluation failures, including an invalid
    ///   message passed to the `__` filter
    /// - [`ViewError::InvalidContext`] when `data` is not a map
    #[tracing::instrument(level = "debug", skip(self, data), err)]
    pub async fn render<S>(
        &self,
        reference: &str,
        data: &S,
        locale: Option<&str>,
    ) -> ViewResult<String>
    where
        S: Serialize + ?Sized,
    {
        let template = self.get_template(reference).await?;
        let ctx = render_context(data, locale)?;

        let html = tokio::task::spawn_blocking(move || template.render_blocking(ctx)).await??;
        tracing::debug!(bytes = html.len(), "rendered template");
        Ok(html)
    }

    /// Render an inline template source
    ///
    /// `name` is used for error messages, auto-escaping and as the parent for
    /// relative includes, so it should be a `namespace:path` reference when the
    /// source includes other templates. Inline sources are never cached.
    ///
    /// # Errors
    ///
    /// Same as [`ViewService::render`].
    #[tracing::instrument(level = "debug", skip(self, source, data), err)]
    pub async fn render_str<S>(
        &self,
        name: &str,
        source: &str,
        data: &S,
        locale: Option<&str>,
    ) -> ViewResult<String>
    where
        S: Serialize + ?Sized,
    {
        let mut env = self.build_environment();
        env.add_template_owned(name.to_owned(), source.to_owned())
            .map_err(|err| ViewError::from_engine(name, err, Stage::Compile))?;
        let template = CompiledTemplate::new(name, env);
        let ctx = render_context(data, locale)?;

        Ok(tokio::task::spawn_blocking(move || template.render_blocking(ctx)).await??)
    }

    /// Return the compiled template for `reference`
    ///
    /// Served from the cache when caching is enabled and the template was
    /// compiled before; otherwise the source is loaded and compiled.
    ///
    /// # Errors
    ///
    /// Returns the loader or compile error. Failures are not cached.
    pub async fn get_template(&self, reference: &str) -> ViewResult<CompiledTemplate> {
        self.registry
            .get_or_compile(reference, || self.compile(reference))
            .await
    }

    /// Load the raw source of `reference` without compiling it
    ///
    /// # Errors
    ///
    /// See [`SourceLoader::get_source`].
    pub async fn get_source(&self, reference: &str) -> ViewResult<TemplateSource> {
        self.loader.get_source(reference).await
    }

    async fn compile(&self, reference: &str) -> ViewResult<CompiledTemplate> {
        let env = self.build_environment();
        let reference = reference.to_owned();

        let template = tokio::task::spawn_blocking(move || {
            env.get_template(&reference)
                .map(|_| ())
                .map_err(|err| ViewError::from_engine(&reference, err, Stage::Compile))?;
            Ok::<_, ViewError>(CompiledTemplate::new(&reference, env))
        })
        .await??;

        tracing::debug!(reference = template.reference(), "compiled template");
        Ok(template)
    }

    fn build_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_trim_blocks(self.config.trim_blocks);
        env.set_lstrip_blocks(self.config.lstrip_blocks);
        env.set_keep_trailing_newline(self.config.keep_trailing_newline);
        if self.config.strict_undefined {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        }

        env.set_path_join_callback(join_template_name);

        let loader = self.loader.clone();
        env.set_loader(move |name| loader.load_blocking(name));

        i18n::register_filter(&mut env, Arc::clone(&self.translator));
        env
    }
}

/// Copy `data` into a fresh context and add the reserved locale variable
fn render_context<S>(data: &S, locale: Option<&str>) -> ViewResult<Value>
where
    S: Serialize + ?Sized,
{
    let mut map = match serde_json::to_value(data)
        .map_err(|err| ViewError::InvalidContext(err.to_string()))?
    {
        JsonValue::Null => Map::new(),
        JsonValue::Object(map) => map,
        other => {
            return Err(ViewError::InvalidContext(format!(
                "expected a map of template variables, got {other}"
            )))
        }
    };

    map.insert(
        LOCALE_KEY.to_owned(),
        locale.map_or(JsonValue::Null, |locale| JsonValue::String(locale.to_owned())),
    );

    Ok(Value::from_serialize(&map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::loader::MockFileResolver;
    use serde_json::json;
    use std::io;

    fn no_translation(message: &str, _: Option<&str>, _: &[String]) -> String {
        message.to_string()
    }

    fn service(config: ViewsConfig, resolver: MockFileResolver) -> ViewService {
        ViewService::new(config, Arc::new(resolver), Arc::new(no_translation))
    }

    #[tokio::test]
    async fn test_render_substitutes_data() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .times(1)
            .returning(|_| Ok("<h1>test {{ var }}</h1>".to_string()));

        let views = service(ViewsConfig::default(), resolver);
        let html = views
            .render("app:views/a.html", &json!({ "var": "nunjucks" }), None)
            .await
            .unwrap();

        assert_eq!(html, "<h1>test nunjucks</h1>");
    }

    #[tokio::test]
    async fn test_cache_enabled_reads_once() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .times(1)
            .returning(|_| Ok("<p>{{ n }}</p>".to_string()));

        let views = service(ViewsConfig::default(), resolver);
        views.get_template("app:views/a.html").await.unwrap();
        views.get_template("app:views/a.html").await.unwrap();

        let first = views.render("app:views/a.html", &json!({ "n": 1 }), None).await.unwrap();
        let second = views.render("app:views/a.html", &json!({ "n": 1 }), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(views.registry().cache_size(), 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_reads_every_time() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .times(3)
            .returning(|_| Ok("<p>{{ n }}</p>".to_string()));

        let views = service(ViewsConfig::default().with_cache(false), resolver);
        views.get_template("app:views/a.html").await.unwrap();
        views.get_template("app:views/a.html").await.unwrap();
        views.render("app:views/a.html", &(), None).await.unwrap();

        assert_eq!(views.registry().cache_size(), 0);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_reload() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .times(2)
            .returning(|_| Ok("<p></p>".to_string()));

        let views = service(ViewsConfig::default(), resolver);
        views.get_template("app:views/a.html").await.unwrap();
        views.clear_cache();
        views.get_template("app:views/a.html").await.unwrap();
    }

    #[tokio::test]
    async fn test_cached_template_keeps_includes() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().times(2).returning(|reference| {
            Ok(match reference {
                "app:views/pages/a.html" => r#"{% include "../partials/b.html" %}"#.to_string(),
                _ => "partial".to_string(),
            })
        });

        let views = service(ViewsConfig::default(), resolver);
        for _ in 0..3 {
            let html = views.render("app:views/pages/a.html", &(), None).await.unwrap();
            assert_eq!(html, "partial");
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .times(1)
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "gone")));

        let views = service(ViewsConfig::default(), resolver);
        let err = views.render("app:views/missing.html", &(), None).await.unwrap_err();

        assert!(err.is_not_found(), "unexpected error: {err:?}");
        assert_eq!(views.registry().cache_size(), 0);
    }

    #[tokio::test]
    async fn test_missing_include_keeps_resolver_error() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().times(2).returning(|reference| match reference {
            "app:views/pages/a.html" => Ok(r#"{% include "./gone.html" %}"#.to_string()),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
        });

        let views = service(ViewsConfig::default(), resolver);
        let err = views.render("app:views/pages/a.html", &(), None).await.unwrap_err();

        match err {
            ViewError::Io { reference, source } => {
                assert_eq!(reference, "app:views/pages/gone.html");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_absolute_include_is_invalid_reference() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().times(1).returning(|reference| {
            assert_eq!(reference, "app:views/pages/a.html");
            Ok(r#"{% include "/shared/nav.html" %}"#.to_string())
        });

        let views = service(ViewsConfig::default(), resolver);
        let err = views.render("app:views/pages/a.html", &(), None).await.unwrap_err();

        match err {
            ViewError::InvalidReference(reference) => assert_eq!(reference, "/shared/nav.html"),
            other => panic!("expected InvalidReference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compile_failure_is_retried() {
        let mut resolver = MockFileResolver::new();
        let mut seq = mockall::Sequence::new();
        resolver
            .expect_read_file()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("{% if %}".to_string()));
        resolver
            .expect_read_file()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("fixed".to_string()));

        let views = service(ViewsConfig::default(), resolver);
        let err = views.render("app:views/a.html", &(), None).await.unwrap_err();
        assert!(matches!(err, ViewError::Compile { .. }), "unexpected error: {err:?}");

        let html = views.render("app:views/a.html", &(), None).await.unwrap();
        assert_eq!(html, "fixed");
    }

    #[tokio::test]
    async fn test_malformed_reference_never_reads() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().never();

        let views = service(ViewsConfig::default(), resolver);
        let err = views.render("views/a.html", &(), None).await.unwrap_err();
        assert!(matches!(err, ViewError::InvalidReference(_)), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_render_does_not_touch_caller_data() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .returning(|_| Ok("{{ _locale }}".to_string()));

        let views = service(ViewsConfig::default(), resolver);
        let data = json!({ "var": "x" });
        let html = views.render("app:views/a.html", &data, Some("fr")).await.unwrap();

        assert_eq!(html, "fr");
        assert_eq!(data, json!({ "var": "x" }));
    }

    #[tokio::test]
    async fn test_render_rejects_non_map_context() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .returning(|_| Ok("x".to_string()));

        let views = service(ViewsConfig::default(), resolver);
        let err = views.render("app:views/a.html", &json!([1, 2]), None).await.unwrap_err();
        assert!(matches!(err, ViewError::InvalidContext(_)));
    }

    #[tokio::test]
    async fn test_strict_undefined_fails_render() {
        let mut resolver = MockFileResolver::new();
        resolver
            .expect_read_file()
            .returning(|_| Ok("{{ missing }}".to_string()));

        let views = service(ViewsConfig::default().with_strict_undefined(true), resolver);
        let err = views.render("app:views/a.txt", &(), None).await.unwrap_err();
        assert!(matches!(err, ViewError::Render { .. }), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_render_str_resolves_relative_includes() {
        let mut resolver = MockFileResolver::new();
        resolver.expect_read_file().times(1).returning(|reference| {
            assert_eq!(reference, "app:views/partials/nav.html");
            Ok("<nav></nav>".to_string())
        });

        let views = service(ViewsConfig::default(), resolver);
        let html = views
            .render_str(
                "app:views/pages/inline.html",
                r#"{% include "../partials/nav.html" %}"#,
                &(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(html, "<nav></nav>");
        assert_eq!(views.registry().cache_size(), 0);
    }

    #[test]
    fn test_render_context_adds_locale() {
        let ctx = render_context(&json!({ "a": 1 }), Some("en")).unwrap();
        assert_eq!(ctx.get_attr("a").unwrap(), Value::from(1));
        assert_eq!(ctx.get_attr(LOCALE_KEY).unwrap(), Value::from("en"));

        let ctx = render_context(&(), None).unwrap();
        assert!(ctx.get_attr(LOCALE_KEY).unwrap().is_none());
    }
}
