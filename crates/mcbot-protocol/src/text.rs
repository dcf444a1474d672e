//! Text components: chat messages and disconnect reasons.
//!
//! The game sends formatted text as a JSON tree (Login state) or the same
//! tree encoded as NBT (Configuration and Play). Sessions mostly need the
//! plain string for logs and events, so [`Text::to_plain`] flattens the
//! tree and strips legacy `§` formatting codes.

use std::fmt;

use bytes::{Buf, BufMut};
use serde_json::Value;

use crate::nbt::{read_network_nbt, write_network_nbt};
use crate::ProtocolError;

/// A formatted text component.
#[derive(Debug, Clone, PartialEq)]
pub struct Text(Value);

impl Text {
    /// A component with no formatting.
    pub fn plain(s: impl Into<String>) -> Self {
        Self(Value::String(s.into()))
    }

    /// Wraps an already-parsed component tree.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Parses the JSON encoding.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(Self(serde_json::from_str(s)?))
    }

    /// Reads the NBT encoding.
    pub fn read_nbt(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        read_network_nbt(buf).map(Self)
    }

    /// Writes the NBT encoding.
    pub fn write_nbt(&self, buf: &mut impl BufMut) {
        write_network_nbt(buf, &self.0);
    }

    /// The JSON encoding.
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }

    /// The component tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Flattens the tree to a plain string.
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        flatten(&self.0, &mut out, 0);
        strip_legacy_codes(&out)
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain())
    }
}

const MAX_DEPTH: usize = 64;

fn flatten(value: &Value, out: &mut String, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            for item in items {
                flatten(item, out, depth + 1);
            }
        }
        Value::Object(map) => {
            if let Some(text) = map.get("text") {
                flatten(text, out, depth + 1);
            } else if let Some(Value::String(key)) = map.get("translate") {
                // No language files here: show the key and its arguments.
                out.push_str(key);
                if let Some(Value::Array(args)) = map.get("with") {
                    let rendered: Vec<String> = args
                        .iter()
                        .map(|a| {
                            let mut s = String::new();
                            flatten(a, &mut s, depth + 1);
                            s
                        })
                        .collect();
                    if !rendered.is_empty() {
                        out.push_str(" (");
                        out.push_str(&rendered.join(", "));
                        out.push(')');
                    }
                }
            } else if let Some(Value::String(s)) = map.get("") {
                // NBT wraps non-compound list entries under an empty key.
                out.push_str(s);
            }
            if let Some(extra) = map.get("extra") {
                flatten(extra, out, depth + 1);
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => {}
    }
}

/// Removes `§x` formatting codes and turns control whitespace into spaces.
pub fn strip_legacy_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '§' => {
                chars.next();
            }
            '\n' | '\r' | '\t' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}
