//! Wire grammar serialize/deserialize and the re-nesting algorithm
//! (spec §4.1).
//!
//! The data section is a flat list of `[name,type,value];` triples.
//! Container-typed triples (`type == e`) declare how many of the
//! *following* triples are their direct children, but the list itself
//! carries no bracket nesting — parsing walks the flat list once with a
//! single "current container" cursor, popping back up to an ancestor
//! whenever that ancestor's declared child count is reached.

use super::{invalid, ValueContainer};
use crate::error::Result;
use crate::value::{Value, ValueData, ValueRef, ValueType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use std::fmt::Write as _;

const ESCAPED_SEMICOLON: &str = "&#59;";
const ESCAPED_COMMA: &str = "&#44;";

fn escape_delimiters(s: &str) -> String {
    s.replace(';', ESCAPED_SEMICOLON).replace(',', ESCAPED_COMMA)
}

fn unescape_delimiters(s: &str) -> String {
    s.replace(ESCAPED_SEMICOLON, ";").replace(ESCAPED_COMMA, ",")
}

pub fn serialize(container: &ValueContainer) -> String {
    let mut out = String::new();
    out.push_str("@header={");
    // Address fields (keys 1..4) are suppressed when message_type is the
    // default "data_container" (spec §3, scenario S1).
    if container.message_type != super::DEFAULT_MESSAGE_TYPE {
        let _ = write!(out, "[1,{}];", escape_delimiters(&container.target_id));
        let _ = write!(out, "[2,{}];", escape_delimiters(&container.target_sub_id));
        let _ = write!(out, "[3,{}];", escape_delimiters(&container.source_id));
        let _ = write!(out, "[4,{}];", escape_delimiters(&container.source_sub_id));
    }
    let _ = write!(out, "[5,{}];", escape_delimiters(&container.message_type));
    let _ = write!(out, "[6,{}];", escape_delimiters(&container.version));
    out.push_str("};@data={");
    for root in container.roots() {
        serialize_value(&mut out, root);
    }
    out.push_str("};");
    out
}

fn serialize_value(out: &mut String, value: &ValueRef) {
    let v = value.lock();
    let tag = v.value_type().tag();
    let text = match v.data() {
        ValueData::Container(n) => n.to_string(),
        ValueData::Bytes(b) => BASE64.encode(b),
        ValueData::String(s) => escape_delimiters(s),
        other => scalar_text(other),
    };
    let _ = write!(out, "[{},{},{}];", escape_delimiters(v.name()), tag, text);
    drop(v);
    let is_container = value.lock().is_container();
    if is_container {
        let children = value.lock().children().to_vec();
        for child in &children {
            serialize_value(out, child);
        }
    }
}

fn scalar_text(data: &ValueData) -> String {
    match data {
        ValueData::Null => String::new(),
        ValueData::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        ValueData::Short(v) => v.to_string(),
        ValueData::UShort(v) => v.to_string(),
        ValueData::Int(v) => v.to_string(),
        ValueData::UInt(v) => v.to_string(),
        ValueData::Long(v) => v.to_string(),
        ValueData::ULong(v) => v.to_string(),
        ValueData::LLong(v) => v.to_string(),
        ValueData::ULLong(v) => v.to_string(),
        ValueData::Float(v) => v.to_string(),
        ValueData::Double(v) => v.to_string(),
        _ => String::new(),
    }
}

/// A single flattened data triple as read off the wire, before
/// re-nesting.
struct RawTriple {
    name: String,
    ty: ValueType,
    text: String,
}

pub fn deserialize(text: &str) -> Result<ValueContainer> {
    let header_re = Regex::new(r"@header=\{(?P<body>.*?)\};").unwrap();
    let data_re = Regex::new(r"@data=\{(?P<body>.*)\};\s*$").unwrap();

    let mut container = ValueContainer::new();

    if let Some(caps) = header_re.captures(text) {
        for (k, v) in parse_pairs(&caps["body"])? {
            let v = v.trim_end().to_string();
            match k.as_str() {
                "1" => container.target_id = v,
                "2" => container.target_sub_id = v,
                "3" => container.source_id = v,
                "4" => container.source_sub_id = v,
                "5" => container.message_type = v,
                "6" => container.version = v,
                other => {
                    tracing::error!(key = other, "unrecognized header key, ignoring");
                }
            }
        }
    }

    if let Some(caps) = data_re.captures(text) {
        let triples = parse_triples(&caps["body"])?;
        let roots = renest(triples)?;
        for root in roots {
            container.add_root(root);
        }
    }

    Ok(container)
}

/// Scans `[K,V];[K,V];...` pairs. Hand-rolled rather than a second regex
/// because values may themselves contain escaped delimiters that a
/// naive split would mis-tokenize.
fn parse_pairs(body: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for chunk in split_bracketed(body)? {
        let parts = split_fields(&chunk, 2)?;
        pairs.push((
            unescape_delimiters(&parts[0]),
            unescape_delimiters(&parts[1]),
        ));
    }
    Ok(pairs)
}

fn parse_triples(body: &str) -> Result<Vec<RawTriple>> {
    let mut triples = Vec::new();
    for chunk in split_bracketed(body)? {
        let parts = split_fields(&chunk, 3)?;
        let name = unescape_delimiters(&parts[0]);
        let ty = ValueType::from_tag(parts[1].chars().next().unwrap_or('0'));
        triples.push(RawTriple {
            name,
            ty,
            text: parts[2].clone(),
        });
    }
    Ok(triples)
}

/// Splits `[a,b];[c,d];...` into `["a,b", "c,d", ...]`, respecting
/// bracket nesting depth 1 (the grammar never nests brackets within a
/// single triple).
fn split_bracketed(body: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '[' => {
                depth += 1;
                if depth > 1 {
                    return Err(invalid("unexpected nested '[' in data section"));
                }
            }
            ']' => {
                depth -= 1;
                if depth == 0 {
                    out.push(current.clone());
                    current.clear();
                }
            }
            _ if depth > 0 => current.push(ch),
            _ => {}
        }
    }
    Ok(out)
}

/// Splits a single bracket's inner text into exactly `n` comma-separated
/// fields, where the final field may itself contain escaped commas
/// already protected by [`escape_delimiters`] — so a plain `split(',')`
/// capped at `n` pieces is safe.
fn split_fields(inner: &str, n: usize) -> Result<Vec<String>> {
    let parts: Vec<&str> = inner.splitn(n, ',').collect();
    if parts.len() != n {
        return Err(invalid(format!(
            "expected {} fields, found {} in '{}'",
            n,
            parts.len(),
            inner
        )));
    }
    Ok(parts.into_iter().map(str::to_string).collect())
}

/// Rebuilds the tree from the flat triple list.
///
/// Each triple becomes a [`Value`]. A container triple pushes a new
/// "current" frame with its declared child count; every subsequent
/// triple is attached to the innermost frame whose count has not yet
/// been satisfied, popping frames whose count is reached before
/// attaching. Triples left over after the last frame pops (more top
/// level siblings than an ancestor declared) become additional roots
/// rather than being silently dropped — more useful than a legacy
/// "drop orphaned trailing leaves" behavior, and still lossless.
fn renest(triples: Vec<RawTriple>) -> Result<Vec<ValueRef>> {
    struct Frame {
        value: ValueRef,
        remaining: i32,
    }

    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for triple in triples {
        // Pop any ancestor frames already fully populated before placing
        // this triple, so it lands under the correct (still-open) parent.
        // Popped frames were already attached to their own parent (or
        // pushed to `roots`) at the moment they were created, so popping
        // here is bookkeeping only — it must not attach them again.
        while matches!(stack.last(), Some(top) if top.remaining == 0) {
            stack.pop();
        }

        if let Some(top) = stack.last_mut() {
            top.remaining -= 1;
        }

        let value = build_value(&triple);
        let is_container = triple.ty == ValueType::Container;

        match stack.last() {
            Some(parent) => Value::attach_unchecked(&parent.value, value.clone()),
            None => roots.push(value.clone()),
        }

        if is_container {
            let count = value.lock().declared_count();
            stack.push(Frame {
                value,
                remaining: count,
            });
        }
    }

    Ok(roots)
}

fn build_value(triple: &RawTriple) -> ValueRef {
    match triple.ty {
        ValueType::Null => Value::null(triple.name.clone()),
        ValueType::Bool => Value::boolean(triple.name.clone(), triple.text == "true"),
        ValueType::Short => Value::short(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::UShort => Value::ushort(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::Int => Value::int(triple.name.clone(), parse_or_log(&triple.name, &triple.text)),
        ValueType::UInt => Value::uint(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::Long => Value::long(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::ULong => Value::ulong(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::LLong => Value::llong(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::ULLong => Value::ullong(triple.name.clone(), triple.text.parse().unwrap_or(0)),
        ValueType::Float => Value::float(triple.name.clone(), triple.text.parse().unwrap_or(0.0)),
        ValueType::Double => Value::double(triple.name.clone(), triple.text.parse().unwrap_or(0.0)),
        ValueType::Bytes => Value::bytes(
            triple.name.clone(),
            BASE64.decode(&triple.text).unwrap_or_default(),
        ),
        ValueType::String => Value::string_escaped(triple.name.clone(), unescape_delimiters(&triple.text)),
        ValueType::Container => {
            let count: i32 = triple.text.parse().unwrap_or(0);
            Value::container_with_count(triple.name.clone(), count)
        }
    }
}

/// Parses a decimal integer, falling back to zero and logging at error
/// level on failure — preserving the legacy `atoi`-on-garbage behavior
/// called out in spec §9 rather than rejecting the whole container.
fn parse_or_log(field: &str, text: &str) -> i32 {
    match text.parse() {
        Ok(v) => v,
        Err(_) => {
            tracing::error!(field, text, "non-numeric value, defaulting to 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::values_equal;

    #[test]
    fn serializes_flat_scalars() {
        let mut c = ValueContainer::new();
        c.add_root(Value::int("count", 3));
        c.add_root(Value::string("label", "hi there"));
        let text = c.serialize();
        assert!(text.starts_with("@header={[5,data_container];[6,1.0.0.0];};@data={"));
        assert!(text.contains("[count,4,3];"));
    }

    /// S1 from spec §8: a default-addressed container with one bool leaf
    /// serializes to the literal wire text, byte for byte.
    #[test]
    fn s1_container_wire_round_trip() {
        let mut c = ValueContainer::new();
        c.add_root(Value::boolean("flag", true));
        let text = c.serialize();
        assert_eq!(
            text,
            "@header={[5,data_container];[6,1.0.0.0];};@data={[flag,1,true];};"
        );
        let parsed = ValueContainer::deserialize(&text).unwrap();
        assert_eq!(parsed.roots().len(), 1);
        let flag = &parsed.roots()[0];
        assert_eq!(flag.lock().name(), "flag");
        assert!(flag.lock().to_bool());
    }

    #[test]
    fn addressed_container_emits_all_six_header_fields() {
        let c = ValueContainer::addressed("request_connection", "src", "0", "tgt", "0");
        let text = c.serialize();
        assert!(text.starts_with(
            "@header={[1,tgt];[2,0];[3,src];[4,0];[5,request_connection];[6,1.0.0.0];};"
        ));
        let parsed = ValueContainer::deserialize(&text).unwrap();
        assert_eq!(parsed.message_type, "request_connection");
        assert_eq!(parsed.source_id, "src");
        assert_eq!(parsed.target_id, "tgt");
    }

    #[test]
    fn round_trips_scalars_and_header() {
        let mut c = ValueContainer::new();
        c.add_root(Value::int("n", 42));
        c.add_root(Value::string("s", "a b"));
        let text = c.serialize();
        let parsed = ValueContainer::deserialize(&text).unwrap();
        assert_eq!(parsed.message_type, "data_container");
        assert!(values_equal(&parsed.roots()[0], &Value::int("n", 42)));
        assert_eq!(parsed.roots()[1].lock().to_string(true), "a b");
    }

    /// S2 from spec §8: `@data={[outer,e,2];[a,4,1];[b,4,2];}` re-nests
    /// into a container `outer` with two direct children.
    #[test]
    fn renests_flat_container_children() {
        let text = "@header={};@data={[outer,e,2];[a,4,1];[b,4,2];};";
        let parsed = ValueContainer::deserialize(text).unwrap();
        assert_eq!(parsed.roots().len(), 1);
        let outer = &parsed.roots()[0];
        assert!(outer.lock().is_container());
        assert_eq!(outer.lock().children().len(), 2);
        assert_eq!(outer.lock().children()[0].lock().name(), "a");
        assert_eq!(outer.lock().children()[0].lock().to_i64(), 1);
        assert_eq!(outer.lock().children()[1].lock().name(), "b");
        assert_eq!(outer.lock().children()[1].lock().to_i64(), 2);
    }

    #[test]
    fn renests_nested_containers() {
        let text = "@header={};@data={[outer,e,1];[inner,e,1];[leaf,4,9];};";
        let parsed = ValueContainer::deserialize(text).unwrap();
        let outer = &parsed.roots()[0];
        assert_eq!(outer.lock().children().len(), 1);
        let inner = outer.lock().children()[0].clone();
        assert_eq!(inner.lock().name(), "inner");
        assert_eq!(inner.lock().children().len(), 1);
        assert_eq!(inner.lock().children()[0].lock().name(), "leaf");
    }

    #[test]
    fn trailing_siblings_after_closed_container_become_roots() {
        let text = "@header={};@data={[outer,e,1];[a,4,1];[c,4,5];};";
        let parsed = ValueContainer::deserialize(text).unwrap();
        assert_eq!(parsed.roots().len(), 2);
        assert_eq!(parsed.roots()[0].lock().name(), "outer");
        assert_eq!(parsed.roots()[0].lock().children().len(), 1);
        assert_eq!(parsed.roots()[1].lock().name(), "c");
    }

    #[test]
    fn bytes_round_trip_via_base64() {
        let mut c = ValueContainer::new();
        c.add_root(Value::bytes("blob", vec![0, 1, 2, 255]));
        let text = c.serialize();
        let parsed = ValueContainer::deserialize(&text).unwrap();
        assert_eq!(parsed.roots()[0].lock().to_bytes(), vec![0, 1, 2, 255]);
    }

    #[test]
    fn malformed_bracket_nesting_is_an_error() {
        let text = "@header={};@data={[a,[4,1];};";
        assert!(ValueContainer::deserialize(text).is_err());
    }
}
