// ── Thing config validation ──
//
// LIVR-style rules keyed by field. A field maps to one rule or a list of
// them; a rule is a bare name (`"required"`) or a one-key object carrying
// its argument (`{ "max_length": 32 }`). Only `required` fails on a missing
// or empty value, every other rule lets it through.

use serde_json::{Map, Value};

use crate::ConfigError;

/// One validation rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    NotEmpty,
    String,
    Integer,
    PositiveInteger,
    Decimal,
    MinLength(usize),
    MaxLength(usize),
    NumberBetween(f64, f64),
    OneOf(Vec<Value>),
}

impl Rule {
    fn parse(field: &str, raw: &Value) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::Validation {
            field: format!("validation.{field}"),
            reason: format!("unsupported rule {raw}"),
        };

        match raw {
            Value::String(name) => match name.as_str() {
                "required" => Ok(Self::Required),
                "not_empty" => Ok(Self::NotEmpty),
                "string" => Ok(Self::String),
                "integer" => Ok(Self::Integer),
                "positive_integer" => Ok(Self::PositiveInteger),
                "decimal" => Ok(Self::Decimal),
                _ => Err(unknown()),
            },
            Value::Object(rule) if rule.len() == 1 => {
                let Some((name, arg)) = rule.iter().next() else {
                    return Err(unknown());
                };
                let length = || {
                    arg.as_u64()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(unknown)
                };
                match name.as_str() {
                    "min_length" => Ok(Self::MinLength(length()?)),
                    "max_length" => Ok(Self::MaxLength(length()?)),
                    "number_between" => match arg.as_array().map(Vec::as_slice) {
                        Some([low, high]) => match (low.as_f64(), high.as_f64()) {
                            (Some(low), Some(high)) => Ok(Self::NumberBetween(low, high)),
                            _ => Err(unknown()),
                        },
                        _ => Err(unknown()),
                    },
                    "one_of" => match arg {
                        Value::Array(allowed) => Ok(Self::OneOf(allowed.clone())),
                        _ => Err(unknown()),
                    },
                    _ => Err(unknown()),
                }
            }
            _ => Err(unknown()),
        }
    }

    /// The LIVR error code for `value`, if it breaks this rule.
    pub fn check(&self, value: Option<&Value>) -> Option<&'static str> {
        let value = match value {
            None | Some(Value::Null) => {
                return matches!(self, Self::Required).then_some("REQUIRED");
            }
            Some(Value::String(s)) if s.is_empty() => {
                return match self {
                    Self::Required => Some("REQUIRED"),
                    Self::NotEmpty => Some("CANNOT_BE_EMPTY"),
                    _ => None,
                };
            }
            Some(value) => value,
        };

        match self {
            Self::Required | Self::NotEmpty => None,
            Self::String => (!matches!(value, Value::String(_) | Value::Number(_)))
                .then_some("FORMAT_ERROR"),
            Self::Integer => integer(value).is_none().then_some("NOT_INTEGER"),
            Self::PositiveInteger => match integer(value) {
                Some(n) if n > 0 => None,
                _ => Some("NOT_POSITIVE_INTEGER"),
            },
            Self::Decimal => number(value).is_none().then_some("NOT_DECIMAL"),
            Self::MinLength(min) => match value.as_str() {
                Some(s) if s.chars().count() < *min => Some("TOO_SHORT"),
                Some(_) => None,
                None => Some("FORMAT_ERROR"),
            },
            Self::MaxLength(max) => match value.as_str() {
                Some(s) if s.chars().count() > *max => Some("TOO_LONG"),
                Some(_) => None,
                None => Some("FORMAT_ERROR"),
            },
            Self::NumberBetween(low, high) => match number(value) {
                Some(n) if n < *low => Some("TOO_LOW"),
                Some(n) if n > *high => Some("TOO_HIGH"),
                Some(_) => None,
                None => Some("NOT_NUMBER"),
            },
            Self::OneOf(allowed) => (!allowed.contains(value)).then_some("NOT_ALLOWED_VALUE"),
        }
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Validation rules for the thing config, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rules {
    fields: Vec<(String, Vec<Rule>)>,
}

impl Rules {
    /// Parse the `validation` object of a schema file.
    pub fn from_json(rules: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut fields = Vec::with_capacity(rules.len());
        for (field, raw) in rules {
            let parsed = match raw {
                Value::Array(raws) => raws
                    .iter()
                    .map(|raw| Rule::parse(field, raw))
                    .collect::<Result<Vec<_>, _>>()?,
                raw => vec![Rule::parse(field, raw)?],
            };
            fields.push((field.clone(), parsed));
        }
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check `config`, reporting the first broken rule of every field.
    pub fn check(&self, config: &Map<String, Value>) -> Result<(), ConfigError> {
        let errors: Vec<ConfigError> = self
            .fields
            .iter()
            .filter_map(|(field, rules)| {
                let value = config.get(field);
                rules
                    .iter()
                    .find_map(|rule| rule.check(value))
                    .map(|code| ConfigError::Validation {
                        field: field.clone(),
                        reason: code.to_owned(),
                    })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidThingConfig { errors })
        }
    }
}
