// Typed argument conversion for chat commands.

mod arguments;
mod builtin;
mod converter;

pub use arguments::{
    ArgumentError, ArgumentMode, ArgumentSchema, ArgumentSchemaBuilder, ArgumentSpec,
    ParsedArguments, SchemaError,
};
pub use builtin::{
    parse_duration, BooleanConverter, ChoiceConverter, ColourConverter, DecimalConverter,
    DurationConverter, IntegerConverter, SnowflakeConverter, StringConverter,
};
pub use converter::{format_duration, ArgumentValue, ConversionError, Converter, MentionKind};
