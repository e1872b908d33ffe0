//! Path parsing and evaluation.
//!
//! Grammar:
//!
//! ```text
//! expression := literal | path
//! literal    := "true" | "false" | "null" | "undefined" | "NaN"
//!             | "Infinity" | number
//! path       := ident ( "." ident | "[" index "]" )*
//! index      := digits | 'string' | "string" | ident
//! ```
//!
//! A bracketed identifier is a dynamic segment: it is looked up on the
//! evaluation context and its value becomes the key.

use tracing::warn;

use crate::error::{Error, Result};
use crate::observer;
use crate::value::{Array, Value};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
    Dynamic(String),
}

#[derive(Debug)]
pub(crate) enum Parsed {
    Literal(Value),
    Path(Vec<Segment>),
}

/// A resolved property key.
enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    fn name(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(index) => index.to_string(),
        }
    }
}

pub(crate) fn parse(source: &str) -> Result<Parsed> {
    let source = source.trim();
    if source.is_empty() {
        return Err(Error::invalid(source, "empty expression"));
    }

    if let Some(literal) = literal(source) {
        return Ok(Parsed::Literal(literal));
    }

    let mut parser = Parser {
        source,
        chars: source.char_indices().peekable(),
    };
    let mut segments = vec![Segment::Key(parser.ident()?)];

    while let Some((_, c)) = parser.chars.next() {
        match c {
            '.' => segments.push(Segment::Key(parser.ident()?)),
            '[' => {
                segments.push(parser.bracket()?);
                parser.expect(']')?;
            }
            other => {
                return Err(Error::invalid(source, format!("unexpected `{other}`")));
            }
        }
    }

    Ok(Parsed::Path(segments))
}

fn literal(source: &str) -> Option<Value> {
    match source {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        "undefined" => Some(Value::Undefined),
        "NaN" => Some(Value::Number(f64::NAN)),
        "Infinity" => Some(Value::Number(f64::INFINITY)),
        _ => {
            let first = source.chars().next()?;
            if first.is_ascii_digit() || first == '-' || first == '.' {
                source.parse::<f64>().ok().map(Value::Number)
            } else {
                None
            }
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn ident(&mut self) -> Result<String> {
        let mut ident = String::new();

        match self.chars.peek() {
            Some(&(_, c)) if is_ident_start(c) => {}
            Some(&(_, c)) => {
                return Err(Error::invalid(self.source, format!("unexpected `{c}`")));
            }
            None => return Err(Error::invalid(self.source, "unexpected end")),
        }

        while let Some(&(_, c)) = self.chars.peek() {
            if !is_ident_continue(c) {
                break;
            }
            ident.push(c);
            self.chars.next();
        }
        Ok(ident)
    }

    fn bracket(&mut self) -> Result<Segment> {
        match self.chars.peek().copied() {
            Some((_, quote @ ('\'' | '"'))) => {
                self.chars.next();
                let mut key = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == quote => return Ok(Segment::Key(key)),
                        Some((_, c)) => key.push(c),
                        None => return Err(Error::invalid(self.source, "unterminated string")),
                    }
                }
            }
            Some((_, c)) if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&(_, c)) = self.chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    digits.push(c);
                    self.chars.next();
                }
                digits
                    .parse()
                    .map(Segment::Index)
                    .map_err(|_| Error::invalid(self.source, "index out of range"))
            }
            _ => self.ident().map(Segment::Dynamic),
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((_, c)) => Err(Error::invalid(
                self.source,
                format!("expected `{expected}`, found `{c}`"),
            )),
            None => Err(Error::invalid(self.source, format!("expected `{expected}`"))),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn resolve(segment: &Segment, context: &Value) -> Result<Key> {
    match segment {
        Segment::Key(name) => Ok(Key::Name(name.clone())),
        Segment::Index(index) => Ok(Key::Index(*index)),
        Segment::Dynamic(ident) => match read(context, &Key::Name(ident.clone()))? {
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Key::Index(n as usize)),
            Value::String(s) => Ok(Key::Name(s.to_string())),
            Value::Object(_) | Value::Array(_) => Err(Error::eval(format!(
                "`{ident}` cannot be used as a property key"
            ))),
            other => Ok(Key::Name(format!("{other:?}"))),
        },
    }
}

/// Tracked property read.
fn read(target: &Value, key: &Key) -> Result<Value> {
    match (target, key) {
        (Value::Object(object), key) => Ok(object.get(&key.name())),
        (Value::Array(array), Key::Index(index)) => Ok(array.get(*index)),
        (Value::Array(array), Key::Name(name)) => Ok(match name.as_str() {
            "length" => Value::from(array.len()),
            other => other
                .parse::<usize>()
                .map(|index| array.get(index))
                .unwrap_or_default(),
        }),
        (other, key) => Err(Error::NotAnObject {
            key: key.name(),
            found: other.type_name(),
        }),
    }
}

pub(crate) fn get(parsed: &Parsed, context: &Value) -> Result<Value> {
    match parsed {
        Parsed::Literal(value) => Ok(value.clone()),
        Parsed::Path(segments) => {
            let mut current = context.clone();
            for segment in segments {
                let key = resolve(segment, context)?;
                current = read(&current, &key)?;
            }
            Ok(current)
        }
    }
}

/// Assign `value` at the end of the path, creating missing intermediate
/// objects on the way.
pub(crate) fn set(source: &str, parsed: &Parsed, context: &Value, value: Value) -> Result<()> {
    let Parsed::Path(segments) = parsed else {
        return Err(Error::NotAssignable(source.to_string()));
    };
    if !context.is_object_like() {
        return Err(Error::NotAnObject {
            key: source.to_string(),
            found: context.type_name(),
        });
    }

    let mut current = context.clone();
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        let key = resolve(segment, context)?;

        if i < last {
            let next = read(&current, &key)?;
            current = if next.is_object_like() {
                next
            } else {
                if i == 0 {
                    warn!(path = source, "setting a non-existent path");
                }
                let created = Value::object();
                assign(&current, &key, created.clone())?;
                created
            };
        } else {
            match (&current, &key) {
                (Value::Object(object), key) if object.contains_key(&key.name()) => {
                    object.set(&key.name(), value.clone());
                }
                _ => {
                    if i == 0 {
                        warn!(path = source, "setting a non-existent path");
                    }
                    assign(&current, &key, value.clone())?;
                }
            }
        }
    }

    Ok(())
}

fn assign(target: &Value, key: &Key, value: Value) -> Result<()> {
    let index = match (target, key) {
        (Value::Array(_), Key::Index(index)) => Some(*index),
        (Value::Array(_), Key::Name(name)) => name.parse::<usize>().ok(),
        _ => None,
    };

    match target {
        Value::Array(array) => {
            if let Some(index) = index {
                if index >= Array::MAX_LENGTH {
                    return Err(Error::eval(format!("invalid array index {index}")));
                }
                array.set(index, value);
            }
        }
        Value::Object(object) => observer::set(object, &key.name(), value),
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(source: &str) -> Vec<Segment> {
        match parse(source).unwrap() {
            Parsed::Path(segments) => segments,
            Parsed::Literal(value) => panic!("expected a path, got {value:?}"),
        }
    }

    #[test]
    fn parses_segments() {
        assert_eq!(
            path("a.b[0]['c']"),
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(0),
                Segment::Key("c".into()),
            ]
        );
        assert_eq!(
            path(r#"$data["x y"][key]"#),
            vec![
                Segment::Key("$data".into()),
                Segment::Key("x y".into()),
                Segment::Dynamic("key".into()),
            ]
        );
    }

    #[test]
    fn parses_literals() {
        assert!(matches!(parse("true").unwrap(), Parsed::Literal(Value::Bool(true))));
        assert!(matches!(parse("undefined").unwrap(), Parsed::Literal(Value::Undefined)));
        match parse("-1.5").unwrap() {
            Parsed::Literal(value) => assert_eq!(value, Value::from(-1.5)),
            Parsed::Path(_) => panic!("expected a literal"),
        }
    }

    #[test]
    fn rejects_malformed_paths() {
        for source in ["", "a..b", "a[", "a['x", "a[0", "1a", "a b", "a.0"] {
            assert!(parse(source).is_err(), "`{source}` should not parse");
        }
    }

    #[test]
    fn reads_nested_values() {
        let context = Value::from(json!({ "a": { "list": [10, { "c": 3 }] }, "key": "a" }));

        let read = |source: &str| get(&parse(source).unwrap(), &context).unwrap();
        assert_eq!(read("a.list[0]"), Value::from(10));
        assert_eq!(read("a.list[1].c"), Value::from(3));
        assert_eq!(read("a.list.length"), Value::from(2));
        assert!(read("missing").is_undefined());
    }

    #[test]
    fn reading_through_a_primitive_fails() {
        let context = Value::from(json!({ "a": 1 }));
        let err = get(&parse("a.b").unwrap(), &context).unwrap_err();
        assert!(matches!(err, Error::NotAnObject { found: "number", .. }));

        let err = get(&parse("missing.b").unwrap(), &context).unwrap_err();
        assert!(matches!(err, Error::NotAnObject { found: "undefined", .. }));
    }

    #[test]
    fn dynamic_segments_read_the_context() {
        let context = Value::from(json!({ "items": ["x", "y"], "i": 1 }));
        assert_eq!(
            get(&parse("items[i]").unwrap(), &context).unwrap(),
            Value::from("y")
        );
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let context = Value::from(json!({ "a": {} }));
        observer::observe(&context);

        set("a.b.c", &parse("a.b.c").unwrap(), &context, Value::from(1)).unwrap();
        assert_eq!(context.to_json(), json!({ "a": { "b": { "c": 1 } } }));

        let b = context.as_object().unwrap().peek("a").as_object().unwrap().peek("b");
        assert!(b.as_object().unwrap().is_reactive("c"));
    }

    #[test]
    fn set_through_arrays() {
        let context = Value::from(json!({ "list": [1, 2] }));
        set("list[3]", &parse("list[3]").unwrap(), &context, Value::from(4)).unwrap();
        assert_eq!(context.to_json(), json!({ "list": [1, 2, null, 4] }));
    }

    #[test]
    fn huge_array_indices_are_rejected() {
        let context = Value::from(json!({ "list": [1] }));

        for source in ["list[18446744073709551615]", "list[4294967295]", "list['4294967296']"] {
            let err = set(source, &parse(source).unwrap(), &context, Value::from(1)).unwrap_err();
            assert!(matches!(err, Error::Eval(_)), "{source}: {err}");
        }
        assert_eq!(context.to_json(), json!({ "list": [1] }));
    }

    #[test]
    fn literals_are_not_assignable() {
        let context = Value::object();
        let err = set("true", &parse("true").unwrap(), &context, Value::Null).unwrap_err();
        assert!(matches!(err, Error::NotAssignable(_)));
    }
}
