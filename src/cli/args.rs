//! Named argument extraction for operator commands
//!
//! Commands look like `READ COILS --startAddress 10 --numberToRead 5`. An
//! argument token is the indicator (`--` by default) immediately followed by
//! word characters; its value is the next whitespace-delimited token.
//!
//! Names are matched exactly, ignoring ASCII case: `--ADDRESS` never matches
//! `--STARTADDRESS`. A name given more than once is rejected rather than
//! resolved by position.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    borrow::Cow,
    net::{IpAddr, Ipv4Addr},
};

pub const DEFAULT_INDICATOR: &str = "--";
pub const DEFAULT_SEPARATOR: char = ',';

/// Result of parsing one argument value
///
/// `value` holds the converted value, or the type's fallback when any error
/// was recorded. Errors are operator-facing messages in the order they occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArgument<T> {
    pub value: T,
    pub errors: Vec<String>,
}

impl<T> ParsedArgument<T> {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-type conversion from the raw argument text
pub trait ArgumentValue: Sized {
    /// Name used in conversion error messages
    const TYPE_NAME: &'static str;

    fn parse_value(raw: &str) -> Option<Self>;

    /// Value reported when parsing fails
    fn fallback() -> Self;
}

macro_rules! impl_numeric_argument {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl ArgumentValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn parse_value(raw: &str) -> Option<Self> {
                    raw.parse().ok()
                }

                fn fallback() -> Self {
                    Default::default()
                }
            }
        )*
    };
}

impl_numeric_argument!(
    u8 => "u8 (0-255)",
    u16 => "u16 (0-65535)",
    u32 => "u32",
    i32 => "i32",
    f32 => "f32",
);

impl ArgumentValue for bool {
    const TYPE_NAME: &'static str = "bool (true/false)";

    fn parse_value(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("true") {
            Some(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    fn fallback() -> Self {
        false
    }
}

impl ArgumentValue for String {
    const TYPE_NAME: &'static str = "string";

    fn parse_value(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn fallback() -> Self {
        String::new()
    }
}

impl ArgumentValue for IpAddr {
    const TYPE_NAME: &'static str = "IP address";

    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn fallback() -> Self {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

/// Where an argument's raw value was found (or why it was not)
struct Located {
    raw: Option<String>,
    errors: Vec<String>,
}

fn build_pattern(indicator: &str) -> Regex {
    // The indicator is escaped, so the pattern is always valid
    Regex::new(&format!(r"^{}(\w+)$", regex::escape(indicator)))
        .unwrap_or_else(|_| unreachable!("escaped indicator forms a valid pattern"))
}

static DEFAULT_PATTERN: Lazy<Regex> = Lazy::new(|| build_pattern(DEFAULT_INDICATOR));

fn argument_pattern(indicator: &str) -> Cow<'static, Regex> {
    if indicator == DEFAULT_INDICATOR {
        Cow::Borrowed(&*DEFAULT_PATTERN)
    } else {
        Cow::Owned(build_pattern(indicator))
    }
}

fn locate(command: &str, argument_name: &str, indicator: &str) -> Located {
    let pattern = argument_pattern(indicator);
    let tokens = command.split_whitespace().collect::<Vec<_>>();
    let display_name = format!("{indicator}{argument_name}");

    let positions = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| {
            pattern
                .captures(token)
                .and_then(|caps| caps.get(1))
                .is_some_and(|name| name.as_str().eq_ignore_ascii_case(argument_name))
        })
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let position = match positions.as_slice() {
        [] => {
            return Located {
                raw: None,
                errors: vec![format!("Missing argument {display_name}")],
            }
        }
        [position] => *position,
        many => {
            return Located {
                raw: None,
                errors: vec![format!(
                    "Missing argument {display_name} (given {} times, expected once)",
                    many.len()
                )],
            }
        }
    };

    match tokens.get(position + 1) {
        Some(value) if !pattern.is_match(value) => Located {
            raw: Some(value.to_string()),
            errors: Vec::new(),
        },
        _ => Located {
            raw: None,
            errors: vec![format!("Missing value for argument {display_name}")],
        },
    }
}

fn convert<T: ArgumentValue>(raw: &str, display_name: &str) -> ParsedArgument<T> {
    match T::parse_value(raw) {
        Some(value) => ParsedArgument {
            value,
            errors: Vec::new(),
        },
        None => ParsedArgument {
            value: T::fallback(),
            errors: vec![format!(
                "Unable to parse value {raw} to type {} for argument {display_name}",
                T::TYPE_NAME
            )],
        },
    }
}

/// Parse the single value of `argument_name` with a custom indicator.
pub fn parse_with<T: ArgumentValue>(
    command: &str,
    argument_name: &str,
    indicator: &str,
) -> ParsedArgument<T> {
    let located = locate(command, argument_name, indicator);
    match located.raw {
        Some(raw) => convert(&raw, &format!("{indicator}{argument_name}")),
        None => ParsedArgument {
            value: T::fallback(),
            errors: located.errors,
        },
    }
}

/// Parse the single value of `argument_name` (indicator `--`).
pub fn parse<T: ArgumentValue>(command: &str, argument_name: &str) -> ParsedArgument<T> {
    parse_with(command, argument_name, DEFAULT_INDICATOR)
}

/// Parse a separated list of values with a custom indicator and separator.
///
/// Each piece becomes its own result. When the argument itself cannot be
/// located, a single result carrying that error is returned so the failure is
/// never lost; an empty raw value yields no results.
pub fn parse_multiple_with<T: ArgumentValue>(
    command: &str,
    argument_name: &str,
    indicator: &str,
    separator: char,
) -> Vec<ParsedArgument<T>> {
    let located = locate(command, argument_name, indicator);
    let Some(raw) = located.raw else {
        return vec![ParsedArgument {
            value: T::fallback(),
            errors: located.errors,
        }];
    };
    if raw.is_empty() {
        return Vec::new();
    }

    let display_name = format!("{indicator}{argument_name}");
    raw.split(separator)
        .map(|piece| convert(piece, &display_name))
        .collect()
}

/// Parse a comma separated list of values (indicator `--`).
pub fn parse_multiple<T: ArgumentValue>(
    command: &str,
    argument_name: &str,
) -> Vec<ParsedArgument<T>> {
    parse_multiple_with(command, argument_name, DEFAULT_INDICATOR, DEFAULT_SEPARATOR)
}

/// Gather every error from a group of results, in order.
pub fn collect_errors<'a, I>(results: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    results.into_iter().flatten().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_present_argument() {
        let result = parse::<u16>(
            "READ COILS --startAddress 10 --numberToRead 5",
            "STARTADDRESS",
        );
        assert_eq!(result.value, 10);
        assert!(result.is_valid());
    }

    #[test]
    fn test_parse_missing_argument() {
        let result = parse::<u16>("READ COILS --numberToRead 5", "STARTADDRESS");
        assert!(!result.is_valid());
        assert_eq!(result.value, 0);
        assert_eq!(result.errors, vec!["Missing argument --STARTADDRESS"]);
    }

    #[test]
    fn test_substring_names_do_not_match() {
        let command = "WRITE COIL --STARTADDRESS 3 --VALUE TRUE";
        let result = parse::<u16>(command, "ADDRESS");
        assert_eq!(result.errors, vec!["Missing argument --ADDRESS"]);

        let values = parse_multiple::<bool>("WRITE COILS --VALUE TRUE", "VALUES");
        assert_eq!(values.len(), 1);
        assert!(!values[0].is_valid());
    }

    #[test]
    fn test_duplicate_argument_is_rejected() {
        let result = parse::<u16>("WRITE HOLDREG --ADDRESS 1 --ADDRESS 2 --VALUE 3", "ADDRESS");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("given 2 times"));
    }

    #[test]
    fn test_missing_value() {
        let at_end = parse::<u16>("READ COILS --NUMBERTOREAD 5 --STARTADDRESS", "STARTADDRESS");
        assert_eq!(
            at_end.errors,
            vec!["Missing value for argument --STARTADDRESS"]
        );

        let followed_by_argument =
            parse::<u16>("READ COILS --STARTADDRESS --NUMBERTOREAD 5", "STARTADDRESS");
        assert_eq!(
            followed_by_argument.errors,
            vec!["Missing value for argument --STARTADDRESS"]
        );
    }

    #[test]
    fn test_conversion_failure() {
        let result = parse::<u16>("READ COILS --STARTADDRESS 70000", "STARTADDRESS");
        assert_eq!(result.value, 0);
        assert_eq!(
            result.errors,
            vec!["Unable to parse value 70000 to type u16 (0-65535) for argument --STARTADDRESS"]
        );
    }

    #[test]
    fn test_typed_values() {
        assert!(parse::<bool>("WRITE COIL --VALUE TRUE", "VALUE").value);
        assert!(!parse::<bool>("WRITE COIL --VALUE false", "value").value);
        assert!(!parse::<bool>("WRITE COIL --VALUE 1", "VALUE").is_valid());
        assert_eq!(parse::<u8>("SET SLAVEID --SLAVEID 247", "SLAVEID").value, 247);
        assert_eq!(
            parse::<IpAddr>("CONNECT --IPADDRESS 192.168.1.20", "IPADDRESS").value,
            "192.168.1.20".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse::<IpAddr>("CONNECT --IPADDRESS FE80::1", "IPADDRESS").value,
            "fe80::1".parse::<IpAddr>().unwrap()
        );
        let bad_ip = parse::<IpAddr>("CONNECT --IPADDRESS 300.1.1.1", "IPADDRESS");
        assert_eq!(bad_ip.value, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(!bad_ip.is_valid());
    }

    #[test]
    fn test_parse_multiple_bools() {
        let values = parse_multiple::<bool>(
            "WRITE COILS --startAddress 0 --values true,false,true",
            "VALUES",
        );
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(ParsedArgument::is_valid));
        assert_eq!(
            values.iter().map(|v| v.value).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_parse_multiple_reports_each_piece() {
        let values = parse_multiple::<u16>("WRITE HOLDREGS --VALUES 1,X,,3", "VALUES");
        assert_eq!(values.len(), 4);
        assert!(values[0].is_valid());
        assert!(!values[1].is_valid());
        assert!(!values[2].is_valid());
        assert!(values[3].is_valid());
        let errors = collect_errors(values.iter().map(|v| &v.errors));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_parse_multiple_missing_argument_surfaces_error() {
        let values = parse_multiple::<bool>("WRITE COILS --STARTADDRESS 0", "VALUES");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].errors, vec!["Missing argument --VALUES"]);
    }

    #[test]
    fn test_custom_indicator_and_separator() {
        let result = parse_with::<u16>("READ COILS /START 4", "START", "/");
        assert_eq!(result.value, 4);
        let values = parse_multiple_with::<u16>("WRITE /VALUES 1;2;3", "VALUES", "/", ';');
        assert_eq!(values.iter().map(|v| v.value).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_collect_errors_keeps_order() {
        let first = parse::<u16>("CMD", "A");
        let second = parse::<u16>("CMD --B X", "B");
        let errors = collect_errors([&first.errors, &second.errors]);
        assert_eq!(
            errors,
            vec![
                "Missing argument --A".to_string(),
                "Unable to parse value X to type u16 (0-65535) for argument --B".to_string(),
            ]
        );
    }
}
