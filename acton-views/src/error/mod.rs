//! Error types and error handling
//!
//! Every public operation returns [`ViewError`]. Nothing in this crate
//! swallows or retries a failure: loader, engine and worker errors all reach
//! the caller of the operation that triggered them.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type ViewResult<T> = Result<T, ViewError>;

/// Framework error type for template loading and rendering
#[derive(Debug, Error)]
pub enum ViewError {
    /// Reference is not of the form `namespace:path`
    #[error("invalid template reference: '{0}'")]
    InvalidReference(String),

    /// The host resolver failed to read the template file
    ///
    /// `source` is the resolver's error as it was returned.
    #[error("failed to read template '{reference}': {source}")]
    Io {
        /// Reference that was being read
        reference: String,
        /// Underlying resolver error
        #[source]
        source: Arc<io::Error>,
    },

    /// Template failed to parse
    #[error("failed to compile template '{reference}': {source}")]
    Compile {
        /// Reference that was being compiled
        reference: String,
        /// Engine error
        #[source]
        source: minijinja::Error,
    },

    /// Template failed during evaluation
    #[error("failed to render template '{reference}': {source}")]
    Render {
        /// Reference that was being rendered
        reference: String,
        /// Engine error
        #[source]
        source: minijinja::Error,
    },

    /// Render data could not be turned into a template context
    #[error("invalid render context: {0}")]
    InvalidContext(String),

    /// Configuration could not be extracted
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Default configuration could not be serialized
    #[error("configuration defaults error: {0}")]
    ConfigDefaults(#[from] toml::ser::Error),

    /// The blocking engine worker panicked or was cancelled
    #[error("template worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Which engine step produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Compile,
    Render,
}

impl ViewError {
    /// Returns the underlying I/O error if this is a read failure
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Returns true if the template file could not be found
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.io_error()
            .is_some_and(|err| err.kind() == io::ErrorKind::NotFound)
    }

    /// Classify an engine error raised while compiling or rendering `reference`
    ///
    /// Loader failures travel through the engine as the source of a
    /// `minijinja::Error`; they are pulled back out so callers see the same
    /// `Io` or `InvalidReference` error the loader produced.
    pub(crate) fn from_engine(reference: &str, err: minijinja::Error, stage: Stage) -> Self {
        if let Some(load_error) = find_load_error(&err) {
            return load_error;
        }

        match stage {
            Stage::Compile => Self::Compile {
                reference: reference.to_owned(),
                source: err,
            },
            Stage::Render => Self::Render {
                reference: reference.to_owned(),
                source: err,
            },
        }
    }

    /// Wrap this error so it can be returned from an engine callback
    ///
    /// Always `InvalidOperation`: `{% include %}` replaces a `TemplateNotFound`
    /// error with its own and drops the source.
    pub(crate) fn into_engine_error(self) -> minijinja::Error {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, self.to_string())
            .with_source(self)
    }

    fn duplicate_load_error(&self) -> Option<Self> {
        match self {
            Self::InvalidReference(reference) => Some(Self::InvalidReference(reference.clone())),
            Self::Io { reference, source } => Some(Self::Io {
                reference: reference.clone(),
                source: Arc::clone(source),
            }),
            _ => None,
        }
    }
}

fn find_load_error(err: &minijinja::Error) -> Option<ViewError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(err) = current {
        if let Some(view_error) = err.downcast_ref::<ViewError>() {
            if let Some(load_error) = view_error.duplicate_load_error() {
                return Some(load_error);
            }
        }
        current = err.source();
    }
    None
}
