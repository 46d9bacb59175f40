//! Codec for the host platform's `serialize()` text format.
//!
//! Scalars and arrays decode exactly. Objects decode to a map of their
//! properties (class name dropped), enum cases to their `Class:Case` string,
//! and references and custom-serialized payloads to `Null`. Encoding
//! produces scalars and arrays only. String lengths
//! are byte lengths; string payloads are decoded as UTF-8 with invalid
//! sequences replaced.

use crate::{error::CodecError, store::Value};
use indexmap::IndexMap;
use regex::Regex;
use std::fmt::Write as _;

const MAX_DEPTH: usize = 64;

/// Decode one serialized value. The whole input must be consumed.
///
/// # Errors
/// Returns a [`CodecError`] for truncated, malformed or unsupported input.
pub fn unserialize(input: &str) -> Result<Value, CodecError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    let value = parser.value(0)?;
    if parser.pos != parser.bytes.len() {
        return Err(CodecError::TrailingData { offset: parser.pos });
    }
    Ok(value)
}

#[must_use]
pub fn serialize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Decode `raw` when it looks serialized, otherwise keep it as a string.
///
/// # Errors
/// Returns a [`CodecError`] when the input looks serialized but fails to decode.
pub fn maybe_unserialize(raw: &str) -> Result<Value, CodecError> {
    if is_serialized(raw) {
        unserialize(raw.trim())
    } else {
        Ok(Value::Str(raw.to_string()))
    }
}

/// Storage form of a value: containers (and strings that already look
/// serialized) are serialized, scalars keep their plain string form.
#[must_use]
pub fn maybe_serialize(value: &Value) -> String {
    match value {
        Value::List(_) | Value::Map(_) => serialize(value),
        Value::Str(text) if is_serialized(text) => serialize(value),
        Value::Str(text) => text.clone(),
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Int(number) => number.to_string(),
        Value::Float(number) => format_float(*number),
    }
}

/// Whether `data` looks like the output of `serialize()`.
#[must_use]
pub fn is_serialized(data: &str) -> bool {
    let data = data.trim();
    if data == "N;" {
        return true;
    }
    if data.len() < 4 || data.as_bytes()[1] != b':' {
        return false;
    }

    let Some(last) = data.chars().last() else {
        return false;
    };
    if last != ';' && last != '}' {
        return false;
    }

    match data.as_bytes()[0] {
        b's' => data.ends_with("\";") && matches_pattern(r"^s:[0-9]+:", data),
        b'a' | b'O' => last == '}' && matches_pattern(r"^[aO]:[0-9]+:", data),
        b'E' => last == ';' && matches_pattern(r"^E:[0-9]+:", data),
        b'b' | b'i' | b'd' => matches_pattern(r"^[bid]:[0-9.E+\-INFA]+;$", data),
        _ => false,
    }
}

fn matches_pattern(pattern: &str, data: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(data))
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

enum Key {
    Int(i64),
    Str(String),
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<u8, CodecError> {
        let byte = self.peek().ok_or(CodecError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), CodecError> {
        let offset = self.pos;
        if self.bump()? == byte {
            Ok(())
        } else {
            Err(CodecError::Unexpected { expected, offset })
        }
    }

    /// Raw text up to (not including) `terminator`, which is consumed.
    fn until(&mut self, terminator: u8) -> Result<&str, CodecError> {
        let bytes = self.bytes;
        let start = self.pos;
        let rest = &bytes[start..];
        let len = rest
            .iter()
            .position(|&b| b == terminator)
            .ok_or(CodecError::UnexpectedEnd)?;
        self.pos += len + 1;
        std::str::from_utf8(&rest[..len]).map_err(|_| CodecError::InvalidNumber { offset: start })
    }

    fn integer(&mut self, terminator: u8) -> Result<i64, CodecError> {
        let offset = self.pos;
        self.until(terminator)?
            .parse::<i64>()
            .map_err(|_| CodecError::InvalidNumber { offset })
    }

    fn length(&mut self, terminator: u8) -> Result<usize, CodecError> {
        let offset = self.pos;
        self.until(terminator)?
            .parse::<usize>()
            .map_err(|_| CodecError::InvalidNumber { offset })
    }

    fn string_body(&mut self) -> Result<String, CodecError> {
        let len = self.length(b':')?;
        self.expect(b'"', "opening quote")?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::UnexpectedEnd)?;
        let text = String::from_utf8_lossy(&self.bytes[self.pos..end]).into_owned();
        self.pos = end;
        self.expect(b'"', "closing quote")?;
        Ok(text)
    }

    fn value(&mut self, depth: usize) -> Result<Value, CodecError> {
        let offset = self.pos;
        let tag = self.bump()?;
        if tag == b'N' {
            self.expect(b';', "';'")?;
            return Ok(Value::Null);
        }
        if !matches!(
            tag,
            b'b' | b'i' | b'd' | b's' | b'a' | b'O' | b'C' | b'E' | b'r' | b'R'
        ) {
            return Err(CodecError::UnsupportedType {
                tag: char::from(tag),
                offset,
            });
        }
        self.expect(b':', "':'")?;

        match tag {
            b'b' => {
                let flag_offset = self.pos;
                match self.until(b';')? {
                    "0" => Ok(Value::Bool(false)),
                    "1" => Ok(Value::Bool(true)),
                    _ => Err(CodecError::InvalidNumber {
                        offset: flag_offset,
                    }),
                }
            }
            b'i' => self.integer(b';').map(Value::Int),
            b'd' => {
                let number_offset = self.pos;
                parse_float(self.until(b';')?)
                    .map(Value::Float)
                    .ok_or(CodecError::InvalidNumber {
                        offset: number_offset,
                    })
            }
            b's' | b'E' => {
                let text = self.string_body()?;
                self.expect(b';', "';'")?;
                Ok(Value::Str(text))
            }
            b'r' | b'R' => self.integer(b';').map(|_| Value::Null),
            b'O' => {
                self.string_body()?;
                self.expect(b':', "':'")?;
                self.object(depth)
            }
            b'C' => {
                self.string_body()?;
                self.expect(b':', "':'")?;
                self.opaque_payload()
            }
            _ => self.array(depth),
        }
    }

    /// `count` key/value pairs between braces, in input order.
    fn entries(&mut self, depth: usize) -> Result<(IndexMap<String, Value>, bool), CodecError> {
        if depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH));
        }

        let count = self.length(b':')?;
        self.expect(b'{', "'{'")?;

        let mut entries: IndexMap<String, Value> = IndexMap::new();
        let mut sequential = true;
        for index in 0..count {
            let key = self.key()?;
            let value = self.value(depth + 1)?;
            let name = match key {
                Key::Int(number) => {
                    sequential &= i64::try_from(index).is_ok_and(|i| i == number);
                    number.to_string()
                }
                Key::Str(text) => {
                    sequential = false;
                    text
                }
            };
            entries.insert(name, value);
        }
        self.expect(b'}', "'}'")?;

        let sequential = sequential && entries.len() == count;
        Ok((entries, sequential))
    }

    fn array(&mut self, depth: usize) -> Result<Value, CodecError> {
        let (entries, sequential) = self.entries(depth)?;
        if sequential {
            Ok(Value::List(entries.into_values().collect()))
        } else {
            Ok(Value::Map(entries))
        }
    }

    /// Object properties; private and protected names lose their
    /// `\0Class\0` / `\0*\0` mangling.
    fn object(&mut self, depth: usize) -> Result<Value, CodecError> {
        let (entries, _) = self.entries(depth)?;
        Ok(Value::Map(
            entries
                .into_iter()
                .map(|(name, value)| (unmangle(&name).to_string(), value))
                .collect(),
        ))
    }

    /// Skip a `Serializable` payload, `<len>:{<len bytes>}`.
    fn opaque_payload(&mut self) -> Result<Value, CodecError> {
        let len = self.length(b':')?;
        self.expect(b'{', "'{'")?;
        self.pos = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::UnexpectedEnd)?;
        self.expect(b'}', "'}'")?;
        Ok(Value::Null)
    }

    fn key(&mut self) -> Result<Key, CodecError> {
        let offset = self.pos;
        match self.bump()? {
            b'i' => {
                self.expect(b':', "':'")?;
                self.integer(b';').map(Key::Int)
            }
            b's' => {
                self.expect(b':', "':'")?;
                let text = self.string_body()?;
                self.expect(b';', "';'")?;
                Ok(match canonical_int(&text) {
                    Some(number) => Key::Int(number),
                    None => Key::Str(text),
                })
            }
            _ => Err(CodecError::Unexpected {
                expected: "array key",
                offset,
            }),
        }
    }
}

fn unmangle(name: &str) -> &str {
    match name.strip_prefix('\0') {
        Some(rest) => rest.split_once('\0').map_or(name, |(_, prop)| prop),
        None => name,
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NAN" => Some(f64::NAN),
        _ => text.parse::<f64>().ok(),
    }
}

fn format_float(number: f64) -> String {
    if number.is_nan() {
        "NAN".to_string()
    } else if number == f64::INFINITY {
        "INF".to_string()
    } else if number == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        number.to_string()
    }
}

/// Integer value of a key written in canonical decimal form (`"7"`, `"-3"`,
/// but not `"07"`, `"-0"` or `"+1"`).
fn canonical_int(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
        && text != "-0";
    if canonical {
        text.parse().ok()
    } else {
        None
    }
}

fn write_str(out: &mut String, text: &str) {
    let _ = write!(out, "s:{}:\"{}\";", text.len(), text);
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(flag) => {
            let _ = write!(out, "b:{};", u8::from(*flag));
        }
        Value::Int(number) => {
            let _ = write!(out, "i:{number};");
        }
        Value::Float(number) => {
            let _ = write!(out, "d:{};", format_float(*number));
        }
        Value::Str(text) => write_str(out, text),
        Value::List(items) => {
            let _ = write!(out, "a:{}:{{", items.len());
            for (index, item) in items.iter().enumerate() {
                let _ = write!(out, "i:{index};");
                write_value(out, item);
            }
            out.push('}');
        }
        Value::Map(entries) => {
            let _ = write!(out, "a:{}:{{", entries.len());
            for (key, item) in entries {
                match canonical_int(key) {
                    Some(number) => {
                        let _ = write!(out, "i:{number};");
                    }
                    None => write_str(out, key),
                }
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_scalars() {
        assert_eq!(unserialize("N;"), Ok(Value::Null));
        assert_eq!(unserialize("b:1;"), Ok(Value::Bool(true)));
        assert_eq!(unserialize("i:-42;"), Ok(Value::Int(-42)));
        assert_eq!(unserialize("d:0.5;"), Ok(Value::Float(0.5)));
        assert_eq!(unserialize("d:INF;"), Ok(Value::Float(f64::INFINITY)));
        assert_eq!(unserialize("s:5:\"hello\";"), Ok(Value::from("hello")));
    }

    #[test]
    fn string_length_counts_bytes() {
        assert_eq!(unserialize("s:2:\"é\";"), Ok(Value::from("é")));
        assert_eq!(serialize(&Value::from("é")), "s:2:\"é\";");
        assert_eq!(unserialize("s:5:\"a\"b;c\";"), Ok(Value::from("a\"b;c")));
    }

    #[test]
    fn decodes_nested_arrays_in_order() {
        let raw = "a:2:{s:6:\"editor\";a:2:{s:4:\"name\";s:6:\"Editor\";s:12:\"capabilities\";a:2:{s:10:\"edit_posts\";b:1;s:12:\"delete_posts\";b:0;}}s:6:\"author\";a:1:{s:4:\"name\";s:6:\"Author\";}}";
        let value = unserialize(raw).expect("decodes");
        let roles = value.as_map().expect("map");
        assert_eq!(
            roles.keys().collect::<Vec<_>>(),
            vec!["editor", "author"]
        );
        let caps = value
            .get("editor")
            .and_then(|role| role.get("capabilities"))
            .and_then(Value::as_map)
            .expect("capabilities");
        assert_eq!(
            caps.iter().map(|(k, v)| (k.as_str(), v.is_truthy())).collect::<Vec<_>>(),
            vec![("edit_posts", true), ("delete_posts", false)]
        );
    }

    #[test]
    fn sequential_integer_keys_become_a_list() {
        assert_eq!(
            unserialize("a:2:{i:0;s:1:\"a\";i:1;s:1:\"b\";}"),
            Ok(Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        let sparse = unserialize("a:2:{i:0;s:1:\"a\";i:5;s:1:\"b\";}").expect("decodes");
        assert_eq!(
            sparse.as_map().map(|m| m.keys().cloned().collect::<Vec<_>>()),
            Some(vec!["0".to_string(), "5".to_string()])
        );
        assert_eq!(unserialize("a:0:{}"), Ok(Value::List(Vec::new())));
    }

    #[test]
    fn duplicate_keys_keep_first_position() {
        let value = unserialize("a:3:{s:1:\"a\";i:1;s:1:\"b\";i:2;s:1:\"a\";i:3;}").expect("decodes");
        let map = value.as_map().expect("map");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_index(0), Some((&"a".to_string(), &Value::Int(3))));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(unserialize("s:10:\"short\";"), Err(CodecError::UnexpectedEnd));
        assert_eq!(unserialize("a:2:{i:0;i:1;"), Err(CodecError::UnexpectedEnd));
        assert_eq!(unserialize("i:1;x"), Err(CodecError::TrailingData { offset: 4 }));
        assert!(matches!(
            unserialize("x:1;"),
            Err(CodecError::UnsupportedType { tag: 'x', .. })
        ));
        assert_eq!(
            unserialize("C:11:\"ArrayObject\":30:{short}"),
            Err(CodecError::UnexpectedEnd)
        );
        assert!(matches!(unserialize("b:2;"), Err(CodecError::InvalidNumber { .. })));
        let deep = format!("{}i:1;{}", "a:1:{i:0;".repeat(70), "}".repeat(70));
        assert_eq!(unserialize(&deep), Err(CodecError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn objects_decode_to_their_properties() {
        let raw = "a:2:{i:1700000000;a:1:{s:4:\"hook\";O:8:\"stdClass\":0:{}}s:7:\"version\";i:2;}";
        let cron = unserialize(raw).expect("decodes");
        assert_eq!(
            cron.get("1700000000").and_then(|event| event.get("hook")),
            Some(&Value::Map(IndexMap::new()))
        );
        assert_eq!(cron.get("version"), Some(&Value::Int(2)));

        let object = unserialize(
            "O:4:\"Task\":3:{s:4:\"name\";s:4:\"sync\";s:12:\"\0Task\0hidden\";b:1;s:7:\"\0*\0kept\";i:3;}",
        )
        .expect("decodes");
        assert_eq!(
            object,
            Value::from_iter([
                ("name", Value::from("sync")),
                ("hidden", Value::Bool(true)),
                ("kept", Value::Int(3)),
            ])
        );
        assert!(is_serialized("O:8:\"stdClass\":0:{}"));
    }

    #[test]
    fn references_and_opaque_payloads_become_null() {
        assert_eq!(
            unserialize("a:2:{i:0;s:1:\"a\";i:1;r:2;}"),
            Ok(Value::List(vec![Value::from("a"), Value::Null]))
        );
        assert_eq!(
            unserialize("a:1:{s:1:\"x\";R:1;}"),
            Ok(Value::from_iter([("x", Value::Null)]))
        );
        assert_eq!(
            unserialize("a:1:{i:0;C:11:\"ArrayObject\":5:{x:i:0}}"),
            Ok(Value::List(vec![Value::Null]))
        );
        assert_eq!(
            unserialize("E:11:\"Suit:Hearts\";"),
            Ok(Value::from("Suit:Hearts"))
        );
    }

    #[test]
    fn serializes_maps_with_integer_keys() {
        let value = Value::from_iter([("3", Value::Bool(true)), ("name", Value::Null)]);
        assert_eq!(serialize(&value), "a:2:{i:3;b:1;s:4:\"name\";N;}");
        assert_eq!(unserialize(&serialize(&value)), Ok(value));
    }

    #[test]
    fn detects_serialized_text() {
        assert!(is_serialized("N;"));
        assert!(is_serialized("b:0;"));
        assert!(is_serialized("i:12;"));
        assert!(is_serialized("d:-1.5E+3;"));
        assert!(is_serialized("s:3:\"abc\";"));
        assert!(is_serialized(" a:0:{} "));
        assert!(!is_serialized("hello"));
        assert!(!is_serialized("i:12"));
        assert!(!is_serialized("s:3:\"abc\""));
        assert!(!is_serialized("2024-01-01"));
    }

    #[test]
    fn maybe_helpers() {
        assert_eq!(maybe_unserialize("plain"), Ok(Value::from("plain")));
        assert_eq!(maybe_unserialize("i:5;"), Ok(Value::Int(5)));
        assert!(maybe_unserialize("a:1:{broken}").is_err());

        assert_eq!(maybe_serialize(&Value::Int(5)), "5");
        assert_eq!(maybe_serialize(&Value::Bool(false)), "");
        assert_eq!(maybe_serialize(&Value::from("i:5;")), "s:4:\"i:5;\";");
        assert_eq!(maybe_serialize(&Value::List(Vec::new())), "a:0:{}");
    }
}
