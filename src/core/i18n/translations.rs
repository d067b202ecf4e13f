use super::{I18nError, Locale};
use async_trait::async_trait;
use std::collections::HashMap;

/// Translation templates per locale.
///
/// Templates use `{name}` placeholders. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct Translations {
    default_locale: Locale,
    bundles: HashMap<Locale, HashMap<String, String>>,
}

impl Translations {
    pub fn new(default_locale: Locale) -> Self {
        Self {
            default_locale,
            bundles: HashMap::new(),
        }
    }

    pub fn default_locale(&self) -> &Locale {
        &self.default_locale
    }

    pub fn insert(&mut self, locale: &Locale, key: &str, template: &str) {
        self.bundles
            .entry(locale.clone())
            .or_default()
            .insert(key.to_string(), template.to_string());
    }

    /// Add every key from `other`, overwriting existing ones.
    pub fn merge(&mut self, other: Translations) {
        for (locale, bundle) in other.bundles {
            self.bundles.entry(locale).or_default().extend(bundle);
        }
    }

    pub fn locales(&self) -> Vec<&Locale> {
        let mut locales: Vec<&Locale> = self.bundles.keys().collect();
        locales.sort();
        locales
    }

    pub fn has_locale(&self, locale: &Locale) -> bool {
        self.bundles.contains_key(locale)
    }

    pub fn key_count(&self, locale: &Locale) -> usize {
        self.bundles.get(locale).map(|b| b.len()).unwrap_or(0)
    }

    fn lookup(&self, key: &str, locale: &Locale) -> Option<&str> {
        locale
            .fallbacks()
            .iter()
            .chain(self.default_locale.fallbacks().iter())
            .find_map(|candidate| {
                self.bundles
                    .get(candidate)
                    .and_then(|bundle| bundle.get(key))
            })
            .map(String::as_str)
    }

    /// Translate `key` for `locale`. Missing keys come back as the key itself
    /// so gaps are visible rather than blank.
    pub fn translate(&self, key: &str, locale: &Locale, args: &[(&str, String)]) -> String {
        match self.lookup(key, locale) {
            Some(template) => format_template(template, args),
            None => key.to_string(),
        }
    }

    /// Like `translate`, with an explicit fallback template for missing keys.
    pub fn translate_or(
        &self,
        key: &str,
        locale: &Locale,
        args: &[(&str, String)],
        fallback: &str,
    ) -> String {
        format_template(self.lookup(key, locale).unwrap_or(fallback), args)
    }
}

/// Fill `{name}` placeholders. Unknown placeholders are left as written.
pub fn format_template(template: &str, args: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(index) = rest.find(['{', '}']) {
        out.push_str(&rest[..index]);
        let tail = &rest[index..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            match tail.find('}') {
                Some(end) => {
                    let name = &tail[1..end];
                    match args.iter().find(|(arg, _)| *arg == name) {
                        Some((_, value)) => out.push_str(value),
                        None => out.push_str(&tail[..=end]),
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        } else {
            out.push('}');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Something that can produce a translation bundle (files, a database, ...).
#[async_trait]
pub trait TranslationsProvider: Send + Sync {
    async fn load(&self, default_locale: &Locale) -> Result<Translations, I18nError>;
}
