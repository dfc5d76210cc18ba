//! Translation filter for templates
//!
//! Templates translate message keys with the `__` filter:
//!
//! ```text
//! <h1>{{ "welcome.title"|__ }}</h1>
//! <p>{{ "welcome.greeting"|__(user.name) }}</p>
//! ```
//!
//! The filter reads the active locale from the reserved `_locale` context
//! variable, which [`ViewService::render`](crate::template::ViewService::render)
//! sets for every render, and hands the lookup to the injected [`Translator`].

use std::collections::HashMap;
use std::sync::Arc;

use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind, State};

/// Context variable holding the active locale during a render
pub const LOCALE_KEY: &str = "_locale";

/// Name of the translation filter inside templates
pub const FILTER_NAME: &str = "__";

/// Host collaborator that translates message keys
///
/// Called synchronously while a template is being evaluated. The returned
/// text is inserted verbatim (subject to the template's auto-escaping).
///
/// Any `Fn(&str, Option<&str>, &[String]) -> String` closure is a translator.
pub trait Translator: Send + Sync {
    /// Translate `message` for `locale`, interpolating `args`
    fn translate(&self, message: &str, locale: Option<&str>, args: &[String]) -> String;
}

impl<F> Translator for F
where
    F: Fn(&str, Option<&str>, &[String]) -> String + Send + Sync,
{
    fn translate(&self, message: &str, locale: Option<&str>, args: &[String]) -> String {
        self(message, locale, args)
    }
}

/// Install the `__` filter on `env`, bound to `translator`
pub(crate) fn register_filter(env: &mut Environment<'static>, translator: Arc<dyn Translator>) {
    env.add_filter(
        FILTER_NAME,
        move |state: &State, message: Value, args: Rest<Value>| -> Result<String, Error> {
            translate(translator.as_ref(), state, &message, &args)
        },
    );
}

fn translate(
    translator: &dyn Translator,
    state: &State,
    message: &Value,
    args: &[Value],
) -> Result<String, Error> {
    if !message.is_true() {
        return Err(Error::new(ErrorKind::InvalidOperation, "invalid message"));
    }

    let locale = state.lookup(LOCALE_KEY);
    let locale = locale.as_ref().and_then(Value::as_str);
    let message = message
        .as_str()
        .map_or_else(|| message.to_string(), str::to_owned);
    let args: Vec<String> = args.iter().map(ToString::to_string).collect();

    Ok(translator.translate(&message, locale, &args))
}

/// In-memory message catalog
///
/// Lookup order is the requested locale, its primary language (`fr` for
/// `fr-CA`), the default locale, and finally the message key itself. Each
/// `%s` in a message is replaced by the next argument.
///
/// # Examples
///
/// ```rust
/// use acton_views::i18n::{MessageCatalog, Translator};
///
/// let catalog = MessageCatalog::new("en")
///     .with_message("en", "greeting", "Hello %s")
///     .with_message("fr", "greeting", "Bonjour %s");
///
/// let args = ["Ada".to_string()];
/// assert_eq!(catalog.translate("greeting", Some("fr-CA"), &args), "Bonjour Ada");
/// assert_eq!(catalog.translate("greeting", None, &args), "Hello Ada");
/// assert_eq!(catalog.translate("missing.key", Some("fr"), &[]), "missing.key");
/// ```
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    default_locale: String,
    locales: HashMap<String, HashMap<String, String>>,
}

impl MessageCatalog {
    /// Create an empty catalog falling back to `default_locale`
    #[must_use]
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            locales: HashMap::new(),
        }
    }

    /// Add a message
    #[must_use]
    pub fn with_message(
        mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.insert(locale, key, text);
        self
    }

    /// Add every entry of a flat JSON object (`{"key": "text", ...}`) for `locale`
    ///
    /// # Errors
    ///
    /// Returns the parse error if `json` is not a string-to-string object.
    pub fn with_locale_json(
        mut self,
        locale: impl Into<String>,
        json: &str,
    ) -> Result<Self, serde_json::Error> {
        let messages: HashMap<String, String> = serde_json::from_str(json)?;
        self.locales
            .entry(locale.into())
            .or_default()
            .extend(messages);
        Ok(self)
    }

    /// Add a message in place
    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.locales
            .entry(locale.into())
            .or_default()
            .insert(key.into(), text.into());
    }

    /// The fallback locale
    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Raw message text for `key`, following the fallback order
    #[must_use]
    pub fn lookup(&self, locale: Option<&str>, key: &str) -> Option<&str> {
        let requested = locale.into_iter().flat_map(|locale| {
            let language = locale.split(['-', '_']).next().filter(|l| *l != locale);
            std::iter::once(locale).chain(language)
        });

        requested
            .chain(std::iter::once(self.default_locale.as_str()))
            .find_map(|locale| self.locales.get(locale)?.get(key))
            .map(String::as_str)
    }
}

impl Translator for MessageCatalog {
    fn translate(&self, message: &str, locale: Option<&str>, args: &[String]) -> String {
        let text = self.lookup(locale, message).unwrap_or(message);
        interpolate(text, args)
    }
}

fn interpolate(text: &str, args: &[String]) -> String {
    let mut args = args.iter();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find("%s") {
        out.push_str(&rest[..at]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("%s"),
        }
        rest = &rest[at + 2..];
    }
    out.push_str(rest);
    out
}
