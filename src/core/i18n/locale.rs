use super::I18nError;
use std::fmt;
use std::str::FromStr;

/// A normalized locale tag: `en`, `en-US`, `pt-BR`, `zh-Hant-TW`.
///
/// Language subtags are lowercased, regions uppercased and scripts
/// title-cased. `_` is accepted as a separator (`pt_BR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locale(String);

impl Locale {
    pub fn parse(raw: &str) -> Result<Self, I18nError> {
        let invalid = || I18nError::InvalidLocale(raw.to_string());
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = Vec::new();
        for (index, part) in trimmed.split(['-', '_']).enumerate() {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(invalid());
            }

            let normalized = match (index, part.len()) {
                (0, 2..=3) if part.chars().all(|c| c.is_ascii_alphabetic()) => {
                    part.to_ascii_lowercase()
                }
                (0, _) => return Err(invalid()),
                // Script, e.g. Hant
                (_, 4) if part.chars().all(|c| c.is_ascii_alphabetic()) => {
                    let mut chars = part.chars();
                    let first = chars.next().map(|c| c.to_ascii_uppercase());
                    first
                        .into_iter()
                        .chain(chars.map(|c| c.to_ascii_lowercase()))
                        .collect()
                }
                // Region, e.g. US or 419
                (_, 2) if part.chars().all(|c| c.is_ascii_alphabetic()) => {
                    part.to_ascii_uppercase()
                }
                (_, 3) if part.chars().all(|c| c.is_ascii_digit()) => part.to_string(),
                (_, 5..=8) => part.to_ascii_lowercase(),
                _ => return Err(invalid()),
            };
            parts.push(normalized);
        }

        Ok(Locale(parts.join("-")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag (`pt` for `pt-BR`).
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// This locale followed by each shorter prefix:
    /// `zh-Hant-TW`, `zh-Hant`, `zh`.
    pub fn fallbacks(&self) -> Vec<Locale> {
        let parts: Vec<&str> = self.0.split('-').collect();
        (1..=parts.len())
            .rev()
            .map(|len| Locale(parts[..len].join("-")))
            .collect()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale("en-US".to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Locale {
    type Err = I18nError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_separators() {
        assert_eq!(Locale::parse("EN-us").unwrap().as_str(), "en-US");
        assert_eq!(Locale::parse("pt_br").unwrap().as_str(), "pt-BR");
        assert_eq!(Locale::parse("zh-hant-tw").unwrap().as_str(), "zh-Hant-TW");
        assert_eq!(Locale::parse("es-419").unwrap().as_str(), "es-419");
        assert_eq!(Locale::parse(" fr ").unwrap().as_str(), "fr");
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "english", "e", "en--US", "en-U$", "12-US"] {
            assert!(Locale::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn fallbacks_shorten_the_tag() {
        let locale = Locale::parse("zh-Hant-TW").unwrap();
        let fallbacks: Vec<String> = locale
            .fallbacks()
            .into_iter()
            .map(|l| l.to_string())
            .collect();
        assert_eq!(fallbacks, vec!["zh-Hant-TW", "zh-Hant", "zh"]);
        assert_eq!(locale.language(), "zh");
    }
}
