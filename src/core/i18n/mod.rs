// Internationalization: locales, translation bundles and locale resolution.
//
// NO Discord dependencies here. Resolvers receive the raw locale strings the
// Discord layer pulls off the interaction and guild.

mod locale;
mod resolver;
mod translations;

pub use locale::Locale;
pub use resolver::{
    ClientLocaleResolver, GuildLocaleResolver, LocaleRequest, LocaleResolver,
    LocaleResolverChain, LocaleStore, StoredPreferenceResolver,
};
pub use translations::{format_template, Translations, TranslationsProvider};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum I18nError {
    #[error("`{0}` is not a valid locale")]
    InvalidLocale(String),

    #[error("Failed to read translations: {0}")]
    Io(String),

    #[error("Malformed translation file {file}: {reason}")]
    Format { file: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}
