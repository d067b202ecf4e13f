// The converter contract: raw token in, typed value out.

use std::time::Duration;
use thiserror::Error;

/// What kind of Discord entity a snowflake refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MentionKind {
    User,
    Channel,
    Role,
    Any,
}

impl MentionKind {
    pub fn label(&self) -> &'static str {
        match self {
            MentionKind::User => "user",
            MentionKind::Channel => "channel",
            MentionKind::Role => "role",
            MentionKind::Any => "id",
        }
    }
}

/// A converted argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Duration(Duration),
    Snowflake { kind: MentionKind, id: u64 },
    Colour(u32),
    Choice(String),
    List(Vec<ArgumentValue>),
}

impl ArgumentValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgumentValue::Text(text) | ArgumentValue::Choice(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ArgumentValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Integers widen to decimals.
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            ArgumentValue::Decimal(value) => Some(*value),
            ArgumentValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgumentValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ArgumentValue::Duration(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_snowflake(&self) -> Option<u64> {
        match self {
            ArgumentValue::Snowflake { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn as_colour(&self) -> Option<u32> {
        match self {
            ArgumentValue::Colour(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgumentValue]> {
        match self {
            ArgumentValue::List(values) => Some(values),
            _ => None,
        }
    }

    /// Human-readable rendering, used when echoing arguments back to users.
    pub fn display(&self) -> String {
        match self {
            ArgumentValue::Text(text) | ArgumentValue::Choice(text) => text.clone(),
            ArgumentValue::Integer(value) => value.to_string(),
            ArgumentValue::Decimal(value) => value.to_string(),
            ArgumentValue::Boolean(value) => value.to_string(),
            ArgumentValue::Duration(value) => format_duration(*value),
            ArgumentValue::Snowflake { kind, id } => match kind {
                MentionKind::User => format!("<@{}>", id),
                MentionKind::Channel => format!("<#{}>", id),
                MentionKind::Role => format!("<@&{}>", id),
                MentionKind::Any => id.to_string(),
            },
            ArgumentValue::Colour(value) => format!("#{:06x}", value),
            ArgumentValue::List(values) => values
                .iter()
                .map(ArgumentValue::display)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("Expected {expected}, got `{found}`")]
    Invalid {
        expected: &'static str,
        found: String,
    },

    #[error("`{found}` must be at least {min}")]
    TooSmall { found: String, min: String },

    #[error("`{found}` must be at most {max}")]
    TooLarge { found: String, max: String },

    #[error("Must be at least {min} characters long")]
    TooShort { min: usize },

    #[error("Must be at most {max} characters long")]
    TooLong { max: usize },

    #[error("`{found}` is not one of: {}", .choices.join(", "))]
    NotAChoice { found: String, choices: Vec<String> },
}

impl ConversionError {
    pub fn invalid(expected: &'static str, found: &str) -> Self {
        ConversionError::Invalid {
            expected,
            found: found.to_string(),
        }
    }

    pub fn translation_key(&self) -> &'static str {
        match self {
            ConversionError::Invalid { .. } => "converters.invalid",
            ConversionError::TooSmall { .. } => "converters.too_small",
            ConversionError::TooLarge { .. } => "converters.too_large",
            ConversionError::TooShort { .. } => "converters.too_short",
            ConversionError::TooLong { .. } => "converters.too_long",
            ConversionError::NotAChoice { .. } => "converters.not_a_choice",
        }
    }

    pub fn translation_args(&self) -> Vec<(&'static str, String)> {
        match self {
            ConversionError::Invalid { expected, found } => {
                vec![("expected", expected.to_string()), ("found", found.clone())]
            }
            ConversionError::TooSmall { found, min } => {
                vec![("found", found.clone()), ("min", min.clone())]
            }
            ConversionError::TooLarge { found, max } => {
                vec![("found", found.clone()), ("max", max.clone())]
            }
            ConversionError::TooShort { min } => vec![("min", min.to_string())],
            ConversionError::TooLong { max } => vec![("max", max.to_string())],
            ConversionError::NotAChoice { found, choices } => {
                vec![("found", found.clone()), ("choices", choices.join(", "))]
            }
        }
    }
}

/// Maps a raw token into a typed [`ArgumentValue`].
pub trait Converter: Send + Sync {
    /// Short name used in usage strings and error messages ("number", "duration").
    fn type_name(&self) -> &'static str;

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError>;

    /// Value used when the argument is passed as a bare `--flag`.
    /// Only converters where that makes sense (booleans) return one.
    fn flag_value(&self) -> Option<ArgumentValue> {
        None
    }
}

/// Format a Duration into a human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{} second{}", total_secs, plural(total_secs))
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        format!("{} minute{}", mins, plural(mins))
    } else if total_secs < 86400 {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!(
                "{} hour{} and {} minute{}",
                hours,
                plural(hours),
                mins,
                plural(mins)
            )
        } else {
            format!("{} hour{}", hours, plural(hours))
        }
    } else {
        let days = total_secs / 86400;
        let hours = (total_secs % 86400) / 3600;
        if hours > 0 {
            format!(
                "{} day{} and {} hour{}",
                days,
                plural(days),
                hours,
                plural(hours)
            )
        } else {
            format!("{} day{}", days, plural(days))
        }
    }
}

fn plural(count: u64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_to_decimals() {
        assert_eq!(ArgumentValue::Integer(3).as_decimal(), Some(3.0));
        assert_eq!(ArgumentValue::Text("3".into()).as_decimal(), None);
    }

    #[test]
    fn display_renders_mentions_and_lists() {
        let user = ArgumentValue::Snowflake {
            kind: MentionKind::User,
            id: 42,
        };
        let role = ArgumentValue::Snowflake {
            kind: MentionKind::Role,
            id: 7,
        };
        assert_eq!(user.display(), "<@42>");
        assert_eq!(
            ArgumentValue::List(vec![user, role]).display(),
            "<@42>, <@&7>"
        );
        assert_eq!(ArgumentValue::Colour(0x5865f2).display(), "#5865f2");
    }

    #[test]
    fn durations_format_for_humans() {
        assert_eq!(format_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(format_duration(Duration::from_secs(90)), "1 minute");
        assert_eq!(
            format_duration(Duration::from_secs(3600 + 120)),
            "1 hour and 2 minutes"
        );
        assert_eq!(format_duration(Duration::from_secs(2 * 86400)), "2 days");
    }

    #[test]
    fn conversion_errors_expose_translation_args() {
        let err = ConversionError::NotAChoice {
            found: "purple".into(),
            choices: vec!["red".into(), "blue".into()],
        };
        assert_eq!(err.translation_key(), "converters.not_a_choice");
        assert!(err
            .translation_args()
            .contains(&("choices", "red, blue".to_string())));
        assert_eq!(err.to_string(), "`purple` is not one of: red, blue");
    }
}
