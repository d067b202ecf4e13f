// Argument schemas: declare what a command takes, then bind raw input to it.
//
// Binding happens in two passes. Named flags (`--time 10m`) are matched by
// name first; whatever is left is handed to the positional specs in
// declaration order.

use super::converter::{ArgumentValue, ConversionError, Converter};
use crate::core::parsing::{self, NamedToken, ParseError, ParsedInput, Token};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// SPECS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentMode {
    /// Must be present.
    Required,
    /// May be absent. With `ignore_errors`, a token that fails to convert is
    /// left for the next argument instead of failing the command.
    Optional { ignore_errors: bool },
    /// Like `Optional`, but records the given value when absent.
    Defaulting(ArgumentValue),
    /// Consumes tokens for as long as they convert.
    List { min: usize },
    /// Converts all remaining text as a single value. Must come last.
    Coalescing,
}

#[derive(Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub description: String,
    pub converter: Arc<dyn Converter>,
    pub mode: ArgumentMode,
}

impl std::fmt::Debug for ArgumentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentSpec")
            .field("name", &self.name)
            .field("type", &self.converter.type_name())
            .field("mode", &self.mode)
            .finish()
    }
}

impl ArgumentSpec {
    fn new(
        name: &str,
        description: &str,
        converter: impl Converter + 'static,
        mode: ArgumentMode,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            converter: Arc::new(converter),
            mode,
        }
    }

    pub fn required(name: &str, description: &str, converter: impl Converter + 'static) -> Self {
        Self::new(name, description, converter, ArgumentMode::Required)
    }

    pub fn optional(name: &str, description: &str, converter: impl Converter + 'static) -> Self {
        Self::new(
            name,
            description,
            converter,
            ArgumentMode::Optional {
                ignore_errors: false,
            },
        )
    }

    pub fn defaulting(
        name: &str,
        description: &str,
        converter: impl Converter + 'static,
        default: ArgumentValue,
    ) -> Self {
        Self::new(name, description, converter, ArgumentMode::Defaulting(default))
    }

    pub fn list(
        name: &str,
        description: &str,
        converter: impl Converter + 'static,
        min: usize,
    ) -> Self {
        Self::new(name, description, converter, ArgumentMode::List { min })
    }

    pub fn coalescing(name: &str, description: &str, converter: impl Converter + 'static) -> Self {
        Self::new(name, description, converter, ArgumentMode::Coalescing)
    }

    /// Let an optional argument skip tokens it can't convert.
    pub fn ignore_errors(mut self) -> Self {
        if let ArgumentMode::Optional { ignore_errors } = &mut self.mode {
            *ignore_errors = true;
        }
        self
    }

    fn is_required(&self) -> bool {
        match self.mode {
            ArgumentMode::Required => true,
            ArgumentMode::List { min } => min > 0,
            _ => false,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Argument `{0}` is declared twice")]
    DuplicateName(String),

    #[error("Argument name `{0}` must be lowercase letters, digits, `-` or `_`")]
    InvalidName(String),

    #[error("Argument `{0}` consumes the rest of the input and must be last")]
    NotLast(String),

    #[error("Required argument `{0}` cannot follow an optional one")]
    RequiredAfterOptional(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Missing required argument `{argument}`")]
    Missing { argument: String },

    #[error("Invalid value for `{argument}` at position {position}: {source}")]
    Conversion {
        argument: String,
        token: String,
        position: usize,
        #[source]
        source: ConversionError,
    },

    #[error("Expected at least {min} value(s) for `{argument}`, got {found}")]
    NotEnough {
        argument: String,
        min: usize,
        found: usize,
    },

    #[error("Unexpected argument `{token}` at position {position}")]
    TooMany { token: String, position: usize },

    #[error("Unknown option `--{name}`")]
    UnknownNamed { name: String },

    #[error("Option `--{name}` was given more than once")]
    DuplicateNamed { name: String },

    #[error("Option `--{name}` needs a value")]
    MissingValue { name: String },
}

impl ArgumentError {
    pub fn translation_key(&self) -> &'static str {
        match self {
            ArgumentError::Parse(ParseError::UnterminatedQuote { .. }) => {
                "arguments.unterminated_quote"
            }
            ArgumentError::Parse(ParseError::DanglingEscape { .. }) => "arguments.dangling_escape",
            ArgumentError::Missing { .. } => "arguments.missing",
            ArgumentError::Conversion { .. } => "arguments.conversion",
            ArgumentError::NotEnough { .. } => "arguments.not_enough",
            ArgumentError::TooMany { .. } => "arguments.too_many",
            ArgumentError::UnknownNamed { .. } => "arguments.unknown_named",
            ArgumentError::DuplicateNamed { .. } => "arguments.duplicate_named",
            ArgumentError::MissingValue { .. } => "arguments.missing_value",
        }
    }

    pub fn translation_args(&self) -> Vec<(&'static str, String)> {
        match self {
            ArgumentError::Parse(err) => vec![("position", err.position().to_string())],
            ArgumentError::Missing { argument } => vec![("argument", argument.clone())],
            ArgumentError::Conversion {
                argument,
                token,
                position,
                source,
            } => vec![
                ("argument", argument.clone()),
                ("token", token.clone()),
                ("position", position.to_string()),
                ("reason", source.to_string()),
            ],
            ArgumentError::NotEnough {
                argument,
                min,
                found,
            } => vec![
                ("argument", argument.clone()),
                ("min", min.to_string()),
                ("found", found.to_string()),
            ],
            ArgumentError::TooMany { token, position } => {
                vec![("token", token.clone()), ("position", position.to_string())]
            }
            ArgumentError::UnknownNamed { name }
            | ArgumentError::DuplicateNamed { name }
            | ArgumentError::MissingValue { name } => vec![("name", name.clone())],
        }
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// Converted arguments keyed by argument name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArguments {
    values: HashMap<String, ArgumentValue>,
}

impl ParsedArguments {
    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgumentValue::as_text)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgumentValue::as_integer)
    }

    pub fn decimal(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ArgumentValue::as_decimal)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ArgumentValue::as_bool)
    }

    pub fn duration(&self, name: &str) -> Option<std::time::Duration> {
        self.get(name).and_then(ArgumentValue::as_duration)
    }

    pub fn snowflake(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(ArgumentValue::as_snowflake)
    }

    pub fn colour(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(ArgumentValue::as_colour)
    }

    /// List values; empty when the argument is absent.
    pub fn list(&self, name: &str) -> &[ArgumentValue] {
        self.get(name)
            .and_then(ArgumentValue::as_list)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone)]
pub struct ArgumentSchema {
    specs: Vec<ArgumentSpec>,
}

/// Collects specs; validation happens in `build`.
#[derive(Debug, Default)]
pub struct ArgumentSchemaBuilder {
    specs: Vec<ArgumentSpec>,
}

impl ArgumentSchemaBuilder {
    pub fn arg(mut self, spec: ArgumentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn required(
        self,
        name: &str,
        description: &str,
        converter: impl Converter + 'static,
    ) -> Self {
        self.arg(ArgumentSpec::required(name, description, converter))
    }

    pub fn optional(
        self,
        name: &str,
        description: &str,
        converter: impl Converter + 'static,
    ) -> Self {
        self.arg(ArgumentSpec::optional(name, description, converter))
    }

    pub fn list(
        self,
        name: &str,
        description: &str,
        converter: impl Converter + 'static,
        min: usize,
    ) -> Self {
        self.arg(ArgumentSpec::list(name, description, converter, min))
    }

    pub fn rest(self, name: &str, description: &str, converter: impl Converter + 'static) -> Self {
        self.arg(ArgumentSpec::coalescing(name, description, converter))
    }

    pub fn build(self) -> Result<ArgumentSchema, SchemaError> {
        ArgumentSchema::new(self.specs)
    }
}

impl ArgumentSchema {
    pub fn new(specs: Vec<ArgumentSpec>) -> Result<Self, SchemaError> {
        let mut seen_optional = false;

        for (index, spec) in specs.iter().enumerate() {
            let valid_name = !spec.name.is_empty()
                && spec
                    .name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
            if !valid_name {
                return Err(SchemaError::InvalidName(spec.name.clone()));
            }

            if specs[..index].iter().any(|other| other.name == spec.name) {
                return Err(SchemaError::DuplicateName(spec.name.clone()));
            }

            if spec.mode == ArgumentMode::Coalescing && index + 1 != specs.len() {
                return Err(SchemaError::NotLast(spec.name.clone()));
            }

            if spec.is_required() {
                if seen_optional {
                    return Err(SchemaError::RequiredAfterOptional(spec.name.clone()));
                }
            } else {
                seen_optional = true;
            }
        }

        Ok(Self { specs })
    }

    pub fn builder() -> ArgumentSchemaBuilder {
        ArgumentSchemaBuilder::default()
    }

    /// A schema for commands that take no arguments.
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    pub fn specs(&self) -> &[ArgumentSpec] {
        &self.specs
    }

    /// Usage line, e.g. `<time> [count] <message...>`.
    pub fn usage(&self) -> String {
        let mut usage = String::new();
        for spec in &self.specs {
            if !usage.is_empty() {
                usage.push(' ');
            }
            let _ = match &spec.mode {
                ArgumentMode::Required => write!(usage, "<{}>", spec.name),
                ArgumentMode::Optional { .. } | ArgumentMode::Defaulting(_) => {
                    write!(usage, "[{}]", spec.name)
                }
                ArgumentMode::List { min } if *min > 0 => write!(usage, "<{}...>", spec.name),
                ArgumentMode::List { .. } => write!(usage, "[{}...]", spec.name),
                ArgumentMode::Coalescing => write!(usage, "<{}...>", spec.name),
            };
        }
        usage
    }

    /// Parse `input` and convert every argument.
    ///
    /// Flags are only read up to where a coalescing argument starts; from
    /// there on `--words` are part of its text.
    pub fn bind(&self, input: &str) -> Result<ParsedArguments, ArgumentError> {
        let parsed = parsing::parse(input)?;
        let bound = self.bind_parsed(&parsed)?;

        match bound.coalesced_at {
            Some(start) if flags_from(&parsed, start) => {
                // Dropping those flags can only push the coalescing start
                // later, so one more pass settles it.
                let parsed = parsing::parse_flags_before(input, start)?;
                self.bind_parsed(&parsed)?.finish()
            }
            _ => bound.finish(),
        }
    }

    fn bind_parsed(&self, parsed: &ParsedInput) -> Result<Bound, ArgumentError> {
        let mut values: HashMap<String, ArgumentValue> = HashMap::new();
        // Flag errors wait until it's known whether the flag is really text.
        let mut deferred: Option<ArgumentError> = None;

        // Pass 1: named flags.
        for named in &parsed.named {
            if let Err(e) = self.bind_named(named, &mut values) {
                deferred.get_or_insert(e);
            }
        }

        match self.bind_positional(parsed, &mut values) {
            Ok(coalesced_at) => Ok(Bound {
                values,
                coalesced_at,
                deferred,
            }),
            Err(e) => Err(deferred.unwrap_or(e)),
        }
    }

    fn bind_named(
        &self,
        named: &NamedToken,
        values: &mut HashMap<String, ArgumentValue>,
    ) -> Result<(), ArgumentError> {
        let spec = self
            .specs
            .iter()
            .find(|spec| spec.name == named.name)
            .ok_or_else(|| ArgumentError::UnknownNamed {
                name: named.name.clone(),
            })?;

        let value = match &named.value {
            Some(token) => convert(spec, token)?,
            None => spec
                .converter
                .flag_value()
                .ok_or_else(|| ArgumentError::MissingValue {
                    name: named.name.clone(),
                })?,
        };

        match (&spec.mode, values.get_mut(&spec.name)) {
            (ArgumentMode::List { .. }, Some(ArgumentValue::List(items))) => items.push(value),
            (ArgumentMode::List { .. }, None) => {
                values.insert(spec.name.clone(), ArgumentValue::List(vec![value]));
            }
            (_, Some(_)) => {
                return Err(ArgumentError::DuplicateNamed {
                    name: named.name.clone(),
                })
            }
            (_, None) => {
                values.insert(spec.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Fill the remaining arguments from positional tokens. Returns the byte
    /// offset where a coalescing argument started, if one took input.
    fn bind_positional(
        &self,
        parsed: &ParsedInput,
        values: &mut HashMap<String, ArgumentValue>,
    ) -> Result<Option<usize>, ArgumentError> {
        // Pass 2: positional tokens, in declaration order.
        let tokens = &parsed.positional;
        let mut index = 0;
        let mut coalesced_at = None;

        for spec in &self.specs {
            if let Some(ArgumentValue::List(items)) = values.get(&spec.name) {
                if let ArgumentMode::List { min } = spec.mode {
                    if items.len() < min {
                        return Err(ArgumentError::NotEnough {
                            argument: spec.name.clone(),
                            min,
                            found: items.len(),
                        });
                    }
                }
                continue;
            }
            if values.contains_key(&spec.name) {
                continue;
            }

            match &spec.mode {
                ArgumentMode::Required => {
                    let token = tokens.get(index).ok_or_else(|| ArgumentError::Missing {
                        argument: spec.name.clone(),
                    })?;
                    values.insert(spec.name.clone(), convert(spec, token)?);
                    index += 1;
                }
                ArgumentMode::Optional { ignore_errors } => {
                    if let Some(token) = tokens.get(index) {
                        match spec.converter.convert(&token.value) {
                            Ok(value) => {
                                values.insert(spec.name.clone(), value);
                                index += 1;
                            }
                            Err(_) if *ignore_errors => {}
                            Err(source) => return Err(conversion_error(spec, token, source)),
                        }
                    }
                }
                ArgumentMode::Defaulting(default) => {
                    let value = match tokens.get(index) {
                        Some(token) => {
                            index += 1;
                            convert(spec, token)?
                        }
                        None => default.clone(),
                    };
                    values.insert(spec.name.clone(), value);
                }
                ArgumentMode::List { min } => {
                    let mut items = Vec::new();
                    let mut failure = None;
                    while let Some(token) = tokens.get(index) {
                        match spec.converter.convert(&token.value) {
                            Ok(value) => {
                                items.push(value);
                                index += 1;
                            }
                            Err(source) => {
                                failure = Some(conversion_error(spec, token, source));
                                break;
                            }
                        }
                    }

                    if items.len() < *min {
                        return Err(failure.unwrap_or(ArgumentError::NotEnough {
                            argument: spec.name.clone(),
                            min: *min,
                            found: items.len(),
                        }));
                    }
                    values.insert(spec.name.clone(), ArgumentValue::List(items));
                }
                ArgumentMode::Coalescing => {
                    let rest = parsed.rest_from(index).ok_or_else(|| ArgumentError::Missing {
                        argument: spec.name.clone(),
                    })?;
                    let position = tokens[index].span.start;
                    let value =
                        spec.converter
                            .convert(&rest)
                            .map_err(|source| ArgumentError::Conversion {
                                argument: spec.name.clone(),
                                token: rest.clone(),
                                position,
                                source,
                            })?;
                    values.insert(spec.name.clone(), value);
                    coalesced_at = Some(position);
                    index = tokens.len();
                }
            }
        }

        if let Some(extra) = tokens.get(index) {
            return Err(ArgumentError::TooMany {
                token: extra.value.clone(),
                position: extra.span.start,
            });
        }

        Ok(coalesced_at)
    }
}

struct Bound {
    values: HashMap<String, ArgumentValue>,
    coalesced_at: Option<usize>,
    deferred: Option<ArgumentError>,
}

impl Bound {
    fn finish(self) -> Result<ParsedArguments, ArgumentError> {
        match self.deferred {
            Some(e) => Err(e),
            None => Ok(ParsedArguments {
                values: self.values,
            }),
        }
    }
}

/// Whether any flag (or `--`) sits at or after byte `start`.
fn flags_from(parsed: &ParsedInput, start: usize) -> bool {
    parsed.named.iter().any(|named| named.span.start >= start)
        || parsed.separator.is_some_and(|sep| sep >= start)
}

fn convert(spec: &ArgumentSpec, token: &Token) -> Result<ArgumentValue, ArgumentError> {
    spec.converter
        .convert(&token.value)
        .map_err(|source| conversion_error(spec, token, source))
}

fn conversion_error(spec: &ArgumentSpec, token: &Token, source: ConversionError) -> ArgumentError {
    ArgumentError::Conversion {
        argument: spec.name.clone(),
        token: token.value.clone(),
        position: token.span.start,
        source,
    }
}
