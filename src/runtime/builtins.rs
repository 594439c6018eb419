use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::{Error, Result};
use crate::location::Location;
use crate::runtime::env::Env;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::output::value_to_string;
use crate::runtime::value::{BuiltinFunction, Value};

/// Install every intrinsic into the root environment. Called once per
/// session before any program runs.
pub fn install_builtins(env: &mut Env) {
    for builtin in BUILTINS {
        env.set_local(builtin.name, Value::Builtin(*builtin));
    }
}

const BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction { name: "type", callback: builtin_type },
    BuiltinFunction { name: "tostring", callback: builtin_tostring },
    BuiltinFunction { name: "nl2br", callback: builtin_nl2br },
    BuiltinFunction { name: "len", callback: builtin_len },
    BuiltinFunction { name: "lower", callback: builtin_lower },
    BuiltinFunction { name: "upper", callback: builtin_upper },
    BuiltinFunction { name: "trim", callback: builtin_trim },
    BuiltinFunction { name: "replace", callback: builtin_replace },
    BuiltinFunction { name: "split", callback: builtin_split },
    BuiltinFunction { name: "contains", callback: builtin_contains },
    BuiltinFunction { name: "starts_with", callback: builtin_starts_with },
    BuiltinFunction { name: "ends_with", callback: builtin_ends_with },
    BuiltinFunction { name: "count", callback: builtin_count },
    BuiltinFunction { name: "push", callback: builtin_push },
    BuiltinFunction { name: "pop", callback: builtin_pop },
    BuiltinFunction { name: "join", callback: builtin_join },
    BuiltinFunction { name: "range", callback: builtin_range },
    BuiltinFunction { name: "keys", callback: builtin_keys },
    BuiltinFunction { name: "has_key", callback: builtin_has_key },
    BuiltinFunction { name: "get", callback: builtin_get },
    BuiltinFunction { name: "set", callback: builtin_set },
    BuiltinFunction { name: "abs", callback: builtin_abs },
    BuiltinFunction { name: "floor", callback: builtin_floor },
    BuiltinFunction { name: "ceil", callback: builtin_ceil },
    BuiltinFunction { name: "round", callback: builtin_round },
    BuiltinFunction { name: "min", callback: builtin_min },
    BuiltinFunction { name: "max", callback: builtin_max },
    BuiltinFunction { name: "is_null", callback: builtin_is_null },
    BuiltinFunction { name: "is_bool", callback: builtin_is_bool },
    BuiltinFunction { name: "is_number", callback: builtin_is_number },
    BuiltinFunction { name: "is_string", callback: builtin_is_string },
    BuiltinFunction { name: "is_array", callback: builtin_is_array },
    BuiltinFunction { name: "is_object", callback: builtin_is_object },
    BuiltinFunction { name: "is_function", callback: builtin_is_function },
    BuiltinFunction { name: "now", callback: builtin_now },
    BuiltinFunction { name: "date_parts", callback: builtin_date_parts },
    BuiltinFunction { name: "date_format", callback: builtin_date_format },
];

fn error(interp: &Interpreter, location: &Location, message: String) -> Error {
    Error::runtime(message, interp.path(), *location)
}

fn argument<'a>(
    name: &str,
    index: usize,
    args: &'a [Value],
    interp: &Interpreter,
    location: &Location,
) -> Result<&'a Value> {
    args.get(index).ok_or_else(|| {
        error(
            interp,
            location,
            format!("{name}: expected at least {} argument(s)", index + 1),
        )
    })
}

fn number_argument(
    name: &str,
    index: usize,
    args: &[Value],
    interp: &Interpreter,
    location: &Location,
) -> Result<f64> {
    match argument(name, index, args, interp, location)? {
        Value::Number(number) => Ok(*number),
        _ => Err(error(interp, location, format!("{name}: expected number"))),
    }
}

fn string_form(
    name: &str,
    index: usize,
    args: &[Value],
    interp: &Interpreter,
    location: &Location,
) -> Result<String> {
    Ok(value_to_string(argument(name, index, args, interp, location)?))
}

fn builtin_type(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let value = argument("type", 0, args, interp, location)?;
    Ok(Value::String(value.type_name().to_string()))
}

fn builtin_tostring(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let value = argument("tostring", 0, args, interp, location)?;
    Ok(Value::String(value_to_string(value)))
}

fn builtin_nl2br(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let input = string_form("nl2br", 0, args, interp, location)?;
    // Collapse `\r\n` first so it produces a single break.
    let output = input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "<br>\n");
    Ok(Value::String(output))
}

fn builtin_len(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let text = string_form("len", 0, args, interp, location)?;
    Ok(Value::Number(text.len() as f64))
}

fn builtin_lower(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let text = string_form("lower", 0, args, interp, location)?;
    Ok(Value::String(text.to_ascii_lowercase()))
}

fn builtin_upper(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let text = string_form("upper", 0, args, interp, location)?;
    Ok(Value::String(text.to_ascii_uppercase()))
}

fn builtin_trim(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let text = string_form("trim", 0, args, interp, location)?;
    let trimmed = text.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
    Ok(Value::String(trimmed.to_string()))
}

fn builtin_replace(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let text = string_form("replace", 0, args, interp, location)?;
    let from = string_form("replace", 1, args, interp, location)?;
    let to = string_form("replace", 2, args, interp, location)?;
    if from.is_empty() {
        return Ok(Value::String(text));
    }
    Ok(Value::String(text.replace(&from, &to)))
}

fn builtin_split(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let text = string_form("split", 0, args, interp, location)?;
    let sep = string_form("split", 1, args, interp, location)?;
    if sep.is_empty() {
        return Ok(Value::array(vec![Value::String(text)]));
    }
    let parts = text
        .split(&sep)
        .map(|part| Value::String(part.to_string()))
        .collect();
    Ok(Value::array(parts))
}

fn builtin_contains(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let text = string_form("contains", 0, args, interp, location)?;
    let needle = string_form("contains", 1, args, interp, location)?;
    Ok(Value::Bool(text.contains(&needle)))
}

fn builtin_starts_with(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let text = string_form("starts_with", 0, args, interp, location)?;
    let prefix = string_form("starts_with", 1, args, interp, location)?;
    Ok(Value::Bool(text.starts_with(&prefix)))
}

fn builtin_ends_with(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let text = string_form("ends_with", 0, args, interp, location)?;
    let suffix = string_form("ends_with", 1, args, interp, location)?;
    Ok(Value::Bool(text.ends_with(&suffix)))
}

fn builtin_count(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    match argument("count", 0, args, interp, location)? {
        Value::Array(items) => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Object(map) => Ok(Value::Number(map.borrow().len() as f64)),
        _ => Err(error(
            interp,
            location,
            "count: expected array or object".to_string(),
        )),
    }
}

fn builtin_push(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let array = argument("push", 0, args, interp, location)?;
    let element = argument("push", 1, args, interp, location)?.clone();
    match array {
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            items.push(element);
            Ok(Value::Number(items.len() as f64))
        }
        _ => Err(error(interp, location, "push: expected array".to_string())),
    }
}

fn builtin_pop(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    match argument("pop", 0, args, interp, location)? {
        Value::Array(items) => Ok(items.borrow_mut().pop().unwrap_or(Value::Null)),
        _ => Err(error(interp, location, "pop: expected array".to_string())),
    }
}

fn builtin_join(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let array = argument("join", 0, args, interp, location)?;
    let sep = string_form("join", 1, args, interp, location)?;
    match array {
        Value::Array(items) => {
            let joined = items
                .borrow()
                .iter()
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(&sep);
            Ok(Value::String(joined))
        }
        _ => Err(error(interp, location, "join: expected array".to_string())),
    }
}

fn builtin_range(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let count = number_argument("range", 0, args, interp, location)?;
    let mut values = Vec::new();
    if count > 0.0 {
        for i in 0..count as usize {
            values.push(Value::Number(i as f64));
        }
    }
    Ok(Value::array(values))
}

fn builtin_keys(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    match argument("keys", 0, args, interp, location)? {
        // Sorted storage keeps this lexicographic without an extra sort.
        Value::Object(map) => Ok(Value::array(
            map.borrow()
                .keys()
                .map(|key| Value::String(key.clone()))
                .collect(),
        )),
        _ => Err(error(interp, location, "keys: expected object".to_string())),
    }
}

fn builtin_has_key(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let object = argument("has_key", 0, args, interp, location)?;
    let key = string_form("has_key", 1, args, interp, location)?;
    match object {
        Value::Object(map) => Ok(Value::Bool(map.borrow().contains_key(&key))),
        _ => Err(error(
            interp,
            location,
            "has_key: expected object".to_string(),
        )),
    }
}

fn builtin_get(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let object = argument("get", 0, args, interp, location)?;
    let key = string_form("get", 1, args, interp, location)?;
    let default = args.get(2).cloned().unwrap_or(Value::Null);
    match object {
        Value::Object(map) => Ok(map.borrow().get(&key).cloned().unwrap_or(default)),
        _ => Err(error(interp, location, "get: expected object".to_string())),
    }
}

fn builtin_set(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let object = argument("set", 0, args, interp, location)?;
    let key = string_form("set", 1, args, interp, location)?;
    let value = argument("set", 2, args, interp, location)?.clone();
    match object {
        Value::Object(map) => {
            map.borrow_mut().insert(key, value.clone());
            Ok(value)
        }
        _ => Err(error(interp, location, "set: expected object".to_string())),
    }
}

fn builtin_abs(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let number = number_argument("abs", 0, args, interp, location)?;
    Ok(Value::Number(number.abs()))
}

fn builtin_floor(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let number = number_argument("floor", 0, args, interp, location)?;
    Ok(Value::Number(number.floor()))
}

fn builtin_ceil(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let number = number_argument("ceil", 0, args, interp, location)?;
    Ok(Value::Number(number.ceil()))
}

fn builtin_round(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let number = number_argument("round", 0, args, interp, location)?;
    // Ties round away from zero.
    Ok(Value::Number(number.round()))
}

fn numeric_pair(
    name: &str,
    args: &[Value],
    interp: &Interpreter,
    location: &Location,
) -> Result<(f64, f64)> {
    if args.len() != 2 {
        return Err(error(
            interp,
            location,
            format!("{name}: expected 2 arguments"),
        ));
    }
    match (&args[0], &args[1]) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(error(interp, location, format!("{name}: expected numbers"))),
    }
}

fn builtin_min(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let (a, b) = numeric_pair("min", args, interp, location)?;
    Ok(Value::Number(a.min(b)))
}

fn builtin_max(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let (a, b) = numeric_pair("max", args, interp, location)?;
    Ok(Value::Number(a.max(b)))
}

fn builtin_is_null(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let value = argument("is_null", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(value, Value::Null)))
}

fn builtin_is_bool(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    let value = argument("is_bool", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(value, Value::Bool(_))))
}

fn builtin_is_number(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let value = argument("is_number", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(value, Value::Number(_))))
}

fn builtin_is_string(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let value = argument("is_string", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(value, Value::String(_))))
}

fn builtin_is_array(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let value = argument("is_array", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(value, Value::Array(_))))
}

fn builtin_is_object(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let value = argument("is_object", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(value, Value::Object(_))))
}

fn builtin_is_function(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let value = argument("is_function", 0, args, interp, location)?;
    Ok(Value::Bool(matches!(
        value,
        Value::Function(_) | Value::Builtin(_)
    )))
}

fn builtin_now(interp: &mut Interpreter, args: &[Value], location: &Location) -> Result<Value> {
    if !args.is_empty() {
        return Err(error(
            interp,
            location,
            "now: expected 0 arguments".to_string(),
        ));
    }
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as f64)
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}

fn utc_datetime(
    name: &str,
    epoch: f64,
    interp: &Interpreter,
    location: &Location,
) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(epoch.floor() as i64, 0)
        .ok_or_else(|| error(interp, location, format!("{name}: time out of range")))
}

fn builtin_date_parts(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let epoch = match argument("date_parts", 0, args, interp, location)? {
        Value::Number(number) => *number,
        _ => {
            return Err(error(
                interp,
                location,
                "date_parts: expected number".to_string(),
            ));
        }
    };
    let datetime = utc_datetime("date_parts", epoch, interp, location)?;
    let mut result = BTreeMap::new();
    result.insert("year".to_string(), Value::Number(datetime.year() as f64));
    result.insert("month".to_string(), Value::Number(datetime.month() as f64));
    result.insert("day".to_string(), Value::Number(datetime.day() as f64));
    result.insert("hour".to_string(), Value::Number(datetime.hour() as f64));
    result.insert("minute".to_string(), Value::Number(datetime.minute() as f64));
    result.insert("second".to_string(), Value::Number(datetime.second() as f64));
    Ok(Value::object(result))
}

/// Zero-pad to `width`; a sign comes first and counts toward the width.
fn format_component(value: i64, width: usize) -> String {
    format!("{value:0width$}")
}

fn builtin_date_format(
    interp: &mut Interpreter,
    args: &[Value],
    location: &Location,
) -> Result<Value> {
    let epoch = match argument("date_format", 0, args, interp, location)? {
        Value::Number(number) => *number,
        _ => {
            return Err(error(
                interp,
                location,
                "date_format: expected number".to_string(),
            ));
        }
    };
    let fmt = string_form("date_format", 1, args, interp, location)?;
    let datetime = utc_datetime("date_format", epoch, interp, location)?;
    let mut output = fmt;
    for (token, component) in [
        ("YYYY", format_component(datetime.year() as i64, 4)),
        ("MM", format_component(datetime.month() as i64, 2)),
        ("DD", format_component(datetime.day() as i64, 2)),
        ("HH", format_component(datetime.hour() as i64, 2)),
        ("mm", format_component(datetime.minute() as i64, 2)),
        ("SS", format_component(datetime.second() as i64, 2)),
    ] {
        output = output.replace(token, &component);
    }
    Ok(Value::String(output))
}
