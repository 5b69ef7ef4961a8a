//! Minimal evaluator for the filter expressions this workspace emits.
//!
//! Supported operators: `all`, `any`, `!`, `==`, `!=`, `get`, `has`,
//! `geometry-type`, `literal`. Anything else evaluates to `null`, which a
//! filter treats as "no match".

use formats::Feature;
use serde_json::Value;

pub fn matches(filter: &Value, feature: &Feature) -> bool {
    evaluate(filter, feature) == Value::Bool(true)
}

pub fn evaluate(expr: &Value, feature: &Feature) -> Value {
    let Some(items) = expr.as_array() else {
        return expr.clone();
    };
    let Some((op, args)) = items.split_first() else {
        return Value::Null;
    };
    let Some(op) = op.as_str() else {
        return Value::Null;
    };

    match op {
        "all" => Value::Bool(args.iter().all(|a| matches(a, feature))),
        "any" => Value::Bool(args.iter().any(|a| matches(a, feature))),
        "!" => match args.first().map(|a| evaluate(a, feature)) {
            Some(Value::Bool(b)) => Value::Bool(!b),
            _ => Value::Null,
        },
        "==" | "!=" => {
            let [a, b] = args else {
                return Value::Null;
            };
            let eq = values_equal(&evaluate(a, feature), &evaluate(b, feature));
            Value::Bool(if op == "==" { eq } else { !eq })
        }
        "get" => match args.first().and_then(|k| k.as_str()) {
            Some(key) => feature.properties.get(key).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        },
        "has" => match args.first().and_then(|k| k.as_str()) {
            Some(key) => Value::Bool(feature.properties.contains_key(key)),
            None => Value::Null,
        },
        "geometry-type" => Value::String(feature.geometry.type_name().to_string()),
        "literal" => args.first().cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

// Numbers compare by value so `1` and `1.0` are equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
