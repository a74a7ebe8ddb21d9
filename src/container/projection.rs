//! XML and JSON renderings of a container (spec §4.1). These are
//! read-only projections for logging/debugging and external interop —
//! the wire grammar in `wire.rs` remains the only round-trippable
//! format.

use super::ValueContainer;
use crate::value::{ValueData, ValueRef};

pub struct XmlProjection;

impl XmlProjection {
    pub fn render(container: &ValueContainer) -> String {
        let mut out = String::new();
        out.push_str("<container>");
        out.push_str("<header>");
        for (tag, v) in [
            ("target_id", &container.target_id),
            ("target_sub_id", &container.target_sub_id),
            ("source_id", &container.source_id),
            ("source_sub_id", &container.source_sub_id),
            ("message_type", &container.message_type),
            ("version", &container.version),
        ] {
            out.push_str(&format!("<{0}>{1}</{0}>", tag, xml_escape(v)));
        }
        out.push_str("</header><data>");
        for root in container.roots() {
            render_value_xml(&mut out, root);
        }
        out.push_str("</data></container>");
        out
    }
}

fn render_value_xml(out: &mut String, value: &ValueRef) {
    let (tag, is_container, scalar) = {
        let v = value.lock();
        let tag = xml_tag_name(v.name());
        match v.data() {
            ValueData::Container(_) => (tag, true, String::new()),
            other => (tag, false, xml_escape(&scalar_display(other))),
        }
    };
    out.push('<');
    out.push_str(&tag);
    out.push('>');
    if is_container {
        for child in value.lock().children().to_vec() {
            render_value_xml(out, &child);
        }
    } else {
        out.push_str(&scalar);
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

/// Element names must be non-empty and must not start with a digit;
/// an empty or numeric-leading value name is prefixed with `_` rather
/// than rejected, since container field names are caller-controlled
/// data, not XML-author-controlled markup.
fn xml_tag_name(name: &str) -> String {
    if name.is_empty() || name.chars().next().unwrap().is_ascii_digit() {
        format!("_{}", name)
    } else {
        name.to_string()
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn scalar_display(data: &ValueData) -> String {
    match data {
        ValueData::Null => String::new(),
        ValueData::Bool(b) => b.to_string(),
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
        ValueData::Bytes(b) => format!("{} bytes", b.len()),
        ValueData::String(s) => s.clone(),
        ValueData::Container(_) => String::new(),
    }
}

/// Array-of-triples JSON shape (the Open Question resolution recorded
/// in `SPEC_FULL.md` §4.1 ADDED): `{"name":N,"type":T,"value":V,
/// "children":[...]}`, closer to the wire form than a per-field-object
/// encoding.
pub struct JsonProjection;

impl JsonProjection {
    pub fn render(container: &ValueContainer) -> String {
        let mut out = String::new();
        out.push('{');
        out.push_str(&format!(
            "\"header\":{{\"target_id\":{},\"target_sub_id\":{},\"source_id\":{},\"source_sub_id\":{},\"message_type\":{},\"version\":{}}}",
            json_string(&container.target_id),
            json_string(&container.target_sub_id),
            json_string(&container.source_id),
            json_string(&container.source_sub_id),
            json_string(&container.message_type),
            json_string(&container.version),
        ));
        out.push_str(",\"data\":[");
        for (i, root) in container.roots().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            render_value_json(&mut out, root);
        }
        out.push_str("]}");
        out
    }
}

enum JsonBody {
    Children,
    Bytes(Vec<u8>),
    Scalar(String),
}

fn render_value_json(out: &mut String, value: &ValueRef) {
    let (name, tag, body) = {
        let v = value.lock();
        let body = match v.data() {
            ValueData::Container(_) => JsonBody::Children,
            ValueData::Bytes(b) => JsonBody::Bytes(b.clone()),
            other => JsonBody::Scalar(json_scalar(other)),
        };
        (v.name().to_string(), v.value_type().tag(), body)
    };
    out.push_str(&format!(
        "{{\"name\":{},\"type\":\"{}\",",
        json_string(&name),
        tag
    ));
    match body {
        JsonBody::Children => {
            out.push_str("\"children\":[");
            for (i, child) in value.lock().children().to_vec().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_value_json(out, child);
            }
            out.push_str("]}");
        }
        JsonBody::Bytes(b) => {
            use base64::engine::general_purpose::STANDARD as BASE64;
            use base64::Engine as _;
            out.push_str(&format!("\"value\":{}}}", json_string(&BASE64.encode(b))));
        }
        JsonBody::Scalar(s) => {
            out.push_str(&format!("\"value\":{}}}", s));
        }
    }
}

fn json_scalar(data: &ValueData) -> String {
    match data {
        ValueData::Null => "null".to_string(),
        ValueData::Bool(b) => b.to_string(),
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
        ValueData::String(s) => json_string(s),
        ValueData::Bytes(_) | ValueData::Container(_) => "null".to_string(),
    }
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
