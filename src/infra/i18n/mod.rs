// Implementations for the i18n ports.

pub mod in_memory;
pub mod json_translations;
pub mod sqlite_locale_store;

pub use in_memory::InMemoryLocaleStore;
pub use json_translations::JsonTranslationsProvider;
pub use sqlite_locale_store::SqliteLocaleStore;
