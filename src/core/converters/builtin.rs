// Built-in converters for the argument types commands ask for most.

use super::converter::{ArgumentValue, ConversionError, Converter, MentionKind};
use std::time::Duration;

// ============================================================================
// TEXT
// ============================================================================

/// Accepts any text. Length limits count characters, not bytes.
#[derive(Debug, Clone, Default)]
pub struct StringConverter {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl StringConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }
}

impl Converter for StringConverter {
    fn type_name(&self) -> &'static str {
        "text"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        let length = raw.chars().count();
        if let Some(min) = self.min_length {
            if length < min {
                return Err(ConversionError::TooShort { min });
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(ConversionError::TooLong { max });
            }
        }
        Ok(ArgumentValue::Text(raw.to_string()))
    }
}

// ============================================================================
// NUMBERS
// ============================================================================

/// Whole numbers. Underscores are allowed as digit separators (`1_000`).
#[derive(Debug, Clone, Default)]
pub struct IntegerConverter {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl IntegerConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

impl Converter for IntegerConverter {
    fn type_name(&self) -> &'static str {
        "number"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
        let value: i64 = cleaned
            .parse()
            .map_err(|_| ConversionError::invalid("a whole number", raw))?;

        if let Some(min) = self.min {
            if value < min {
                return Err(ConversionError::TooSmall {
                    found: raw.to_string(),
                    min: min.to_string(),
                });
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(ConversionError::TooLarge {
                    found: raw.to_string(),
                    max: max.to_string(),
                });
            }
        }

        Ok(ArgumentValue::Integer(value))
    }
}

/// Finite decimal numbers.
#[derive(Debug, Clone, Default)]
pub struct DecimalConverter {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DecimalConverter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Converter for DecimalConverter {
    fn type_name(&self) -> &'static str {
        "decimal"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        let value: f64 = raw
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| ConversionError::invalid("a number", raw))?;

        if let Some(min) = self.min {
            if value < min {
                return Err(ConversionError::TooSmall {
                    found: raw.to_string(),
                    min: min.to_string(),
                });
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(ConversionError::TooLarge {
                    found: raw.to_string(),
                    max: max.to_string(),
                });
            }
        }

        Ok(ArgumentValue::Decimal(value))
    }
}

// ============================================================================
// BOOLEANS
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn type_name(&self) -> &'static str {
        "yes/no"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "on" | "1" | "enable" | "enabled" => {
                Ok(ArgumentValue::Boolean(true))
            }
            "false" | "no" | "n" | "off" | "0" | "disable" | "disabled" => {
                Ok(ArgumentValue::Boolean(false))
            }
            _ => Err(ConversionError::invalid("yes or no", raw)),
        }
    }

    fn flag_value(&self) -> Option<ArgumentValue> {
        Some(ArgumentValue::Boolean(true))
    }
}

// ============================================================================
// DURATIONS
// ============================================================================

/// Durations like `30s`, `5m`, `1h30m`, `2 days` or `1 week`.
#[derive(Debug, Clone, Default)]
pub struct DurationConverter {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl DurationConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(min: Duration, max: Duration) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

impl Converter for DurationConverter {
    fn type_name(&self) -> &'static str {
        "duration"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        let duration = parse_duration(raw)
            .ok_or_else(|| ConversionError::invalid("a duration like `10m` or `2 hours`", raw))?;

        if let Some(min) = self.min {
            if duration < min {
                return Err(ConversionError::TooSmall {
                    found: raw.to_string(),
                    min: super::converter::format_duration(min),
                });
            }
        }
        if let Some(max) = self.max {
            if duration > max {
                return Err(ConversionError::TooLarge {
                    found: raw.to_string(),
                    max: super::converter::format_duration(max),
                });
            }
        }

        Ok(ArgumentValue::Duration(duration))
    }
}

/// Parse a chain of `<number><unit>` pairs. Whitespace between parts is ignored,
/// so `1h30m`, `1h 30m` and `90 minutes` all work. Zero is rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    if compact.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut chars = compact.chars().peekable();

    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            number.push(c);
            chars.next();
        }

        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_alphabetic()) {
            unit.push(c);
            chars.next();
        }

        if number.is_empty() || unit.is_empty() {
            return None;
        }

        let amount: u64 = number.parse().ok()?;
        let multiplier = unit_seconds(&unit)?;
        total = total.checked_add(amount.checked_mul(multiplier)?)?;
    }

    if total == 0 {
        return None;
    }

    Some(Duration::from_secs(total))
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let seconds = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86400,
        "w" | "week" | "weeks" => 604800,
        _ => return None,
    };
    Some(seconds)
}

// ============================================================================
// SNOWFLAKES & MENTIONS
// ============================================================================

/// Discord ids, either raw (`123`) or as a mention (`<@123>`, `<#123>`, `<@&123>`).
#[derive(Debug, Clone, Copy)]
pub struct SnowflakeConverter {
    pub kind: MentionKind,
}

impl SnowflakeConverter {
    pub fn new(kind: MentionKind) -> Self {
        Self { kind }
    }

    pub fn user() -> Self {
        Self::new(MentionKind::User)
    }

    pub fn channel() -> Self {
        Self::new(MentionKind::Channel)
    }

    pub fn role() -> Self {
        Self::new(MentionKind::Role)
    }
}

impl Converter for SnowflakeConverter {
    fn type_name(&self) -> &'static str {
        self.kind.label()
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        let invalid = || ConversionError::invalid(self.expected(), raw);
        let trimmed = raw.trim();

        let (kind, digits) = match trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
        {
            Some(inner) => {
                if let Some(id) = inner.strip_prefix("@&") {
                    (MentionKind::Role, id)
                } else if let Some(id) = inner.strip_prefix("@!") {
                    (MentionKind::User, id)
                } else if let Some(id) = inner.strip_prefix('@') {
                    (MentionKind::User, id)
                } else if let Some(id) = inner.strip_prefix('#') {
                    (MentionKind::Channel, id)
                } else {
                    return Err(invalid());
                }
            }
            None => (self.kind, trimmed),
        };

        if self.kind != MentionKind::Any && kind != self.kind {
            return Err(invalid());
        }

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let id: u64 = digits.parse().map_err(|_| invalid())?;
        if id == 0 {
            return Err(invalid());
        }

        Ok(ArgumentValue::Snowflake { kind, id })
    }
}

impl SnowflakeConverter {
    fn expected(&self) -> &'static str {
        match self.kind {
            MentionKind::User => "a user mention or id",
            MentionKind::Channel => "a channel mention or id",
            MentionKind::Role => "a role mention or id",
            MentionKind::Any => "a mention or id",
        }
    }
}

// ============================================================================
// COLOURS
// ============================================================================

const NAMED_COLOURS: &[(&str, u32)] = &[
    ("blurple", 0x5865F2),
    ("green", 0x57F287),
    ("yellow", 0xFEE75C),
    ("fuchsia", 0xEB459E),
    ("red", 0xED4245),
    ("white", 0xFFFFFF),
    ("black", 0x000000),
];

/// Hex colours (`#ff8800`, `0xff8800`, `ff8800`) or a few Discord palette names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColourConverter;

impl Converter for ColourConverter {
    fn type_name(&self) -> &'static str {
        "colour"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        let lowered = raw.trim().to_lowercase();

        if let Some((_, value)) = NAMED_COLOURS.iter().find(|(name, _)| *name == lowered) {
            return Ok(ArgumentValue::Colour(*value));
        }

        let hex = lowered
            .strip_prefix('#')
            .or_else(|| lowered.strip_prefix("0x"))
            .unwrap_or(lowered.as_str());

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConversionError::invalid("a hex colour like `#5865f2`", raw));
        }

        u32::from_str_radix(hex, 16)
            .map(ArgumentValue::Colour)
            .map_err(|_| ConversionError::invalid("a hex colour like `#5865f2`", raw))
    }
}

// ============================================================================
// CHOICES
// ============================================================================

/// One of a fixed set of values, matched case-insensitively.
/// Returns the canonical spelling from the choice list.
#[derive(Debug, Clone)]
pub struct ChoiceConverter {
    pub choices: Vec<String>,
}

impl ChoiceConverter {
    pub fn new<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}

impl Converter for ChoiceConverter {
    fn type_name(&self) -> &'static str {
        "choice"
    }

    fn convert(&self, raw: &str) -> Result<ArgumentValue, ConversionError> {
        self.choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(raw.trim()))
            .map(|choice| ArgumentValue::Choice(choice.clone()))
            .ok_or_else(|| ConversionError::NotAChoice {
                found: raw.to_string(),
                choices: self.choices.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_length_counts_chars() {
        let converter = StringConverter::new().min_length(2).max_length(3);
        assert!(converter.convert("ää").is_ok());
        assert_eq!(
            converter.convert("a").unwrap_err(),
            ConversionError::TooShort { min: 2 }
        );
        assert_eq!(
            converter.convert("abcd").unwrap_err(),
            ConversionError::TooLong { max: 3 }
        );
    }

    #[test]
    fn integers_allow_separators_and_enforce_range() {
        let converter = IntegerConverter::range(-5, 1_000);
        assert_eq!(converter.convert("1_000").unwrap(), ArgumentValue::Integer(1000));
        assert_eq!(converter.convert("-5").unwrap(), ArgumentValue::Integer(-5));
        assert!(matches!(
            converter.convert("-6"),
            Err(ConversionError::TooSmall { .. })
        ));
        assert!(matches!(
            converter.convert("1001"),
            Err(ConversionError::TooLarge { .. })
        ));
        assert!(matches!(
            converter.convert("1.5"),
            Err(ConversionError::Invalid { .. })
        ));
    }

    #[test]
    fn decimals_reject_non_finite_values() {
        let converter = DecimalConverter::new();
        assert_eq!(converter.convert("2.5").unwrap(), ArgumentValue::Decimal(2.5));
        assert!(converter.convert("NaN").is_err());
        assert!(converter.convert("inf").is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for yes in ["yes", "Y", "on", "TRUE", "1", "enabled"] {
            assert_eq!(BooleanConverter.convert(yes).unwrap(), ArgumentValue::Boolean(true));
        }
        for no in ["no", "n", "Off", "false", "0", "disable"] {
            assert_eq!(BooleanConverter.convert(no).unwrap(), ArgumentValue::Boolean(false));
        }
        assert!(BooleanConverter.convert("maybe").is_err());
        assert_eq!(BooleanConverter.flag_value(), Some(ArgumentValue::Boolean(true)));
    }

    #[test]
    fn durations_parse_compact_chained_and_verbose_forms() {
        assert_eq!(parse_duration("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1h 30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2 hours"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1 Week"), Some(Duration::from_secs(604800)));
        assert_eq!(parse_duration("0m"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("m10"), None);
        assert_eq!(parse_duration("5 fortnights"), None);
        assert_eq!(parse_duration("99999999999999999999w"), None);
    }

    #[test]
    fn duration_bounds_are_enforced() {
        let converter =
            DurationConverter::between(Duration::from_secs(10), Duration::from_secs(3600));
        assert!(matches!(
            converter.convert("5s"),
            Err(ConversionError::TooSmall { .. })
        ));
        assert!(matches!(
            converter.convert("2h"),
            Err(ConversionError::TooLarge { .. })
        ));
        assert_eq!(
            converter.convert("30m").unwrap(),
            ArgumentValue::Duration(Duration::from_secs(1800))
        );
    }

    #[test]
    fn snowflakes_accept_ids_and_matching_mentions() {
        let users = SnowflakeConverter::user();
        assert_eq!(
            users.convert("<@!80351110224678912>").unwrap(),
            ArgumentValue::Snowflake {
                kind: MentionKind::User,
                id: 80351110224678912
            }
        );
        assert_eq!(users.convert("123").unwrap().as_snowflake(), Some(123));
        assert!(users.convert("<#123>").is_err());
        assert!(users.convert("<@abc>").is_err());
        assert!(users.convert("0").is_err());

        let any = SnowflakeConverter::new(MentionKind::Any);
        assert_eq!(
            any.convert("<@&55>").unwrap(),
            ArgumentValue::Snowflake {
                kind: MentionKind::Role,
                id: 55
            }
        );
        assert_eq!(
            any.convert("<#9>").unwrap(),
            ArgumentValue::Snowflake {
                kind: MentionKind::Channel,
                id: 9
            }
        );
    }

    #[test]
    fn colours_accept_hex_and_names() {
        assert_eq!(ColourConverter.convert("#FF8800").unwrap(), ArgumentValue::Colour(0xff8800));
        assert_eq!(ColourConverter.convert("0x00ff00").unwrap(), ArgumentValue::Colour(0x00ff00));
        assert_eq!(ColourConverter.convert("abcdef").unwrap(), ArgumentValue::Colour(0xabcdef));
        assert_eq!(ColourConverter.convert("Blurple").unwrap(), ArgumentValue::Colour(0x5865F2));
        assert!(ColourConverter.convert("#12345").is_err());
        assert!(ColourConverter.convert("#gggggg").is_err());
    }

    #[test]
    fn choices_return_canonical_spelling() {
        let converter = ChoiceConverter::new(["Rock", "Paper", "Scissors"]);
        assert_eq!(
            converter.convert("paper").unwrap(),
            ArgumentValue::Choice("Paper".into())
        );
        assert!(matches!(
            converter.convert("lizard"),
            Err(ConversionError::NotAChoice { .. })
        ));
    }
}
