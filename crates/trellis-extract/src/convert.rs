//! Conversion of raw request strings to typed argument values.

use serde_json::{Number, Value};
use trellis_core::{ActionArguments, MapResult, ParameterDescriptor, ParameterType};

/// Converts one raw value to `parameter_type`.
///
/// The error is the message of the resulting bad request.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::ParameterType;
/// use trellis_extract::convert::convert;
///
/// assert_eq!(convert("id", "42", &ParameterType::Integer).unwrap(), json!(42));
/// assert!(convert("id", "forty-two", &ParameterType::Integer).is_err());
/// ```
pub fn convert(name: &str, raw: &str, parameter_type: &ParameterType) -> Result<Value, String> {
    let invalid = |expected: &str| format!("Value '{raw}' of parameter '{name}' is not a valid {expected}");

    match parameter_type {
        ParameterType::String => Ok(Value::String(raw.to_string())),
        ParameterType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("integer")),
        ParameterType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("number")),
        ParameterType::Boolean => match raw.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            s if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            s if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        ParameterType::Json => serde_json::from_str(raw).map_err(|_| invalid("JSON value")),
        ParameterType::List(inner) => {
            let items = raw
                .split(',')
                .filter(|item| !item.is_empty())
                .map(|item| convert(name, item, inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
    }
}

/// Converts every value supplied for a parameter.
///
/// Lists collect all values (each may itself be comma separated); scalar
/// types take the first one. Returns `Ok(None)` when `raw` is empty.
pub fn convert_all(
    name: &str,
    raw: &[&str],
    parameter_type: &ParameterType,
) -> Result<Option<Value>, String> {
    let Some(first) = raw.first() else {
        return Ok(None);
    };

    match parameter_type {
        ParameterType::List(_) => {
            let mut items = Vec::new();
            for value in raw {
                if let Value::Array(converted) = convert(name, value, parameter_type)? {
                    items.extend(converted);
                }
            }
            Ok(Some(Value::Array(items)))
        }
        scalar => convert(name, first, scalar).map(Some),
    }
}

/// Binds every parameter in `parameters` from `source`.
///
/// `source` returns the raw values supplied for a name; `kind` names the
/// source in failure messages. Stops at the first missing required value or
/// conversion failure.
pub(crate) fn bind_parameters<'a, F>(
    parameters: &[ParameterDescriptor],
    kind: &str,
    source: F,
    arguments: &mut ActionArguments,
) -> MapResult
where
    F: Fn(&str) -> Vec<&'a str>,
{
    for parameter in parameters {
        let raw = source(&parameter.name);
        match convert_all(&parameter.name, &raw, &parameter.parameter_type) {
            Ok(Some(value)) => arguments.insert(parameter.name.clone(), value),
            Ok(None) if parameter.optional => {}
            Ok(None) => {
                return MapResult::Failure(format!(
                    "Missing {kind} parameter '{}'",
                    parameter.name
                ))
            }
            Err(message) => return MapResult::Failure(message),
        }
    }
    MapResult::Success(())
}
