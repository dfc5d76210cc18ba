//! Plugin-namespaced template references
//!
//! A reference names a template inside a plugin: `plugin-name:views/page.html`.
//! Relative references inside templates (`../layouts/base.html`) are joined
//! against the directory of the template that contains them and keep that
//! template's namespace.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{ViewError, ViewResult};

/// Separator between the namespace and the path of a reference
pub const NAMESPACE_SEPARATOR: char = ':';

/// A fully-qualified `namespace:path` template reference
///
/// # Examples
///
/// ```rust
/// use acton_views::template::TemplateRef;
///
/// let reference = TemplateRef::parse("blog:views/posts/index.html")?;
/// assert_eq!(reference.namespace(), "blog");
/// assert_eq!(reference.path(), "views/posts/index.html");
///
/// let layout = reference.join("../layouts/base.html")?;
/// assert_eq!(layout.as_str(), "blog:views/layouts/base.html");
/// # Ok::<(), acton_views::ViewError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRef {
    raw: String,
    separator: usize,
}

impl TemplateRef {
    /// Parse a reference, requiring exactly one `:` separator
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::InvalidReference`] when the reference has no
    /// separator or more than one.
    pub fn parse(reference: &str) -> ViewResult<Self> {
        let mut separators = reference.match_indices(NAMESPACE_SEPARATOR).map(|(i, _)| i);
        match (separators.next(), separators.next()) {
            (Some(separator), None) => Ok(Self {
                raw: reference.to_owned(),
                separator,
            }),
            _ => Err(ViewError::InvalidReference(reference.to_owned())),
        }
    }

    /// Build a reference from its two segments
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::InvalidReference`] if either segment contains a
    /// separator.
    pub fn new(namespace: &str, path: &str) -> ViewResult<Self> {
        Self::parse(&format!("{namespace}{NAMESPACE_SEPARATOR}{path}"))
    }

    /// Plugin namespace segment
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.raw[..self.separator]
    }

    /// Path segment, relative to the plugin root
    #[must_use]
    pub fn path(&self) -> &str {
        &self.raw[self.separator + 1..]
    }

    /// The full `namespace:path` string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Join `relative` against this reference's directory
    ///
    /// `.` and `..` segments are resolved, `..` stops at the plugin root and
    /// an absolute `relative` replaces the directory entirely. The namespace is
    /// always kept.
    ///
    /// Template `include`/`extends` tags only go through this for relative
    /// names; see [`is_relative`].
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::InvalidReference`] if `relative` contains a
    /// separator, since the result would no longer be a two-segment reference.
    pub fn join(&self, relative: &str) -> ViewResult<Self> {
        let path = join_path(self.path(), relative);
        Self::new(self.namespace(), &path)
            .map_err(|_| ViewError::InvalidReference(format!("{}+{relative}", self.raw)))
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TemplateRef {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for TemplateRef {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Resolve `relative` against the `parent` reference
///
/// # Errors
///
/// Returns [`ViewError::InvalidReference`] when `parent` is not a
/// two-segment reference.
///
/// # Examples
///
/// ```rust
/// use acton_views::template::resolve;
///
/// let resolved = resolve("shop:views/cart/show.html", "./items.html")?;
/// assert_eq!(resolved.as_str(), "shop:views/cart/items.html");
///
/// assert!(resolve("no-namespace.html", "./items.html").is_err());
/// # Ok::<(), acton_views::ViewError>(())
/// ```
pub fn resolve(parent: &str, relative: &str) -> ViewResult<TemplateRef> {
    TemplateRef::parse(parent)?.join(relative)
}

/// True unless `path` is filesystem-absolute
#[must_use]
pub fn is_relative(path: &str) -> bool {
    !path.starts_with('/')
}

/// Engine path-join hook
///
/// Only relative names without a namespace are joined against `parent`.
/// Fully-qualified names go to the loader untouched. Absolute names
/// (`/shared/nav.html`) are not supported inside templates: they also go to
/// the loader untouched and fail there as an invalid reference. Use a
/// relative path or a `namespace:path` reference instead. A parent that
/// cannot be parsed leaves the name as-is, and the loader then reports the
/// invalid reference.
pub(crate) fn join_template_name<'s>(name: &'s str, parent: &'s str) -> Cow<'s, str> {
    if !is_relative(name) || name.contains(NAMESPACE_SEPARATOR) {
        return Cow::Borrowed(name);
    }

    match resolve(parent, name) {
        Ok(resolved) => {
            tracing::trace!(parent, name, resolved = %resolved, "resolved relative template");
            Cow::Owned(resolved.raw)
        }
        Err(err) => {
            tracing::debug!(parent, name, error = %err, "cannot resolve relative template");
            Cow::Borrowed(name)
        }
    }
}

fn join_path(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    if is_relative(relative) {
        let base = base.trim_end_matches('/');
        if let Some((dir, _)) = base.rsplit_once('/') {
            push_segments(&mut segments, dir);
        }
    }
    push_segments(&mut segments, relative);

    segments.join("/")
}

fn push_segments<'a>(segments: &mut Vec<&'a str>, path: &'a str) {
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
}
