// Loads translation bundles from a directory of JSON files.
//
// One file per locale, named after it: `locales/en-US.json`, `locales/fr.json`.
// Nested objects flatten into dotted keys, so
//   { "errors": { "rate_limited": "Slow down!" } }
// defines `errors.rate_limited`.

use crate::core::i18n::{I18nError, Locale, Translations, TranslationsProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct JsonTranslationsProvider {
    dir: PathBuf,
}

impl JsonTranslationsProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_file(path: &Path, locale: &Locale, into: &mut Translations) -> Result<(), I18nError> {
        let file = std::fs::File::open(path)
            .map_err(|e| I18nError::Io(format!("{}: {}", path.display(), e)))?;
        let root: Value = serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            I18nError::Format {
                file: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        if !root.is_object() {
            return Err(I18nError::Format {
                file: path.display().to_string(),
                reason: "top level must be an object".to_string(),
            });
        }

        let mut entries = Vec::new();
        flatten("", &root, &mut entries).map_err(|reason| I18nError::Format {
            file: path.display().to_string(),
            reason,
        })?;
        for (key, template) in entries {
            into.insert(locale, &key, &template);
        }
        Ok(())
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let full = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&full, child, out)?;
            }
            Ok(())
        }
        Value::String(text) => {
            out.push((prefix.to_string(), text.clone()));
            Ok(())
        }
        Value::Number(n) => {
            out.push((prefix.to_string(), n.to_string()));
            Ok(())
        }
        Value::Bool(b) => {
            out.push((prefix.to_string(), b.to_string()));
            Ok(())
        }
        Value::Array(_) | Value::Null => Err(format!("`{}` must be a string or object", prefix)),
    }
}

#[async_trait]
impl TranslationsProvider for JsonTranslationsProvider {
    async fn load(&self, default_locale: &Locale) -> Result<Translations, I18nError> {
        let mut translations = Translations::new(default_locale.clone());

        if !self.dir.exists() {
            warn!(
                dir = %self.dir.display(),
                "Locales directory not found, only built-in messages will be used"
            );
            return Ok(translations);
        }

        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| I18nError::Io(format!("{}: {}", self.dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let locale = match Locale::parse(stem) {
                Ok(locale) => locale,
                Err(_) => {
                    warn!(file = %path.display(), "Skipping translation file with no locale name");
                    continue;
                }
            };

            Self::load_file(&path, &locale, &mut translations)?;
            info!(
                locale = %locale,
                keys = translations.key_count(&locale),
                "Loaded translations"
            );
        }

        Ok(translations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn en() -> Locale {
        Locale::parse("en-US").unwrap()
    }

    #[tokio::test]
    async fn nested_keys_flatten_with_dots() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("en-US.json"),
            r#"{ "errors": { "rate_limited": "Wait {seconds}s" }, "ping": "Pong!" }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("fr.json"), r#"{ "ping": "Pong !" }"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let translations = JsonTranslationsProvider::new(dir.path())
            .load(&en())
            .await
            .unwrap();

        assert_eq!(
            translations.translate("errors.rate_limited", &en(), &[("seconds", "3".into())]),
            "Wait 3s"
        );
        let fr_ca = Locale::parse("fr-CA").unwrap();
        assert_eq!(translations.translate("ping", &fr_ca, &[]), "Pong !");
        // Missing in French, falls back to the default locale.
        assert_eq!(
            translations.translate("errors.rate_limited", &fr_ca, &[]),
            "Wait {seconds}s"
        );
        assert_eq!(translations.locales().len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_is_not_fatal() {
        let dir = tempdir().unwrap();
        let translations = JsonTranslationsProvider::new(dir.path().join("nope"))
            .load(&en())
            .await
            .unwrap();
        assert!(translations.locales().is_empty());
    }

    #[tokio::test]
    async fn malformed_files_are_errors() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("en-US.json"), r#"{ "list": ["a", "b"] }"#).unwrap();

        let err = JsonTranslationsProvider::new(dir.path())
            .load(&en())
            .await
            .unwrap_err();
        assert!(matches!(err, I18nError::Format { .. }));
    }
}
