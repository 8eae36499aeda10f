//! Tag specifications and their attribute maps
//!
//! A tag is the `<...>` element of a rule: a name plus a flat attribute
//! list. Attributes come in two shapes, bare flags (`nonrecursive`, `b`,
//! `up`) and key=value pairs (`min=0`, `p=0.3`). Values cannot contain
//! whitespace or `=`; there is no quoting.

use std::collections::HashMap;

use crate::error::GrammarError;

/// One attribute of a tag: either a bare flag or a string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Attribute given without a value, e.g. `nonrecursive`
    Flag,
    /// Attribute given as `key=value`
    Value(String),
}

/// A parsed `<...>` tag: name, `new` marker, and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    name: String,
    new_var: bool,
    attrs: HashMap<String, AttrValue>,
}

impl Tag {
    /// Parses the interior of a `<...>` tag.
    ///
    /// `"new T k1=v1 k2 k3=v3"` becomes a tag named `T` with the `new`
    /// marker set and attributes `{k1: "v1", k2: flag, k3: "v3"}`.
    pub fn parse(spec: &str) -> Result<Self, GrammarError> {
        let parts: Vec<&str> = spec.split_whitespace().collect();
        if parts.is_empty() {
            return Err(GrammarError::EmptyTag);
        }

        let (name, new_var, attr_start) = if parts.len() > 1 && parts[0] == "new" {
            (parts[1], true, 2)
        } else {
            (parts[0], false, 1)
        };

        let mut attrs = HashMap::new();
        for part in &parts[attr_start..] {
            let pieces: Vec<&str> = part.split('=').collect();
            match pieces.as_slice() {
                [key, value] => {
                    attrs.insert((*key).to_string(), AttrValue::Value((*value).to_string()));
                }
                [key] => {
                    attrs.insert((*key).to_string(), AttrValue::Flag);
                }
                _ => return Err(GrammarError::MalformedTag(spec.to_string())),
            }
        }

        Ok(Tag { name: name.to_string(), new_var, attrs })
    }

    /// The tag name (the symbol, built-in, or constant it refers to).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for `<new T ...>` tags declaring a fresh variable.
    pub fn is_new_var(&self) -> bool {
        self.new_var
    }

    /// True if the attribute is present, as a flag or with a value.
    pub fn has(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    /// The string value of a `key=value` attribute; `None` for flags and
    /// absent keys.
    pub fn value(&self, key: &str) -> Option<&str> {
        match self.attrs.get(key) {
            Some(AttrValue::Value(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Full attribute map, exposed to user callbacks.
    pub fn attributes(&self) -> &HashMap<String, AttrValue> {
        &self.attrs
    }

    /// An integer attribute parsed with `0x`/`0o`/`0b` prefixes, or
    /// `default` when absent.
    pub fn int_value(&self, key: &str, default: i128) -> Result<i128, GrammarError> {
        match self.value(key) {
            Some(text) => parse_int_literal(text),
            None => Ok(default),
        }
    }

    /// A float attribute, or `default` when absent.
    pub fn float_value(&self, key: &str, default: f64) -> Result<f64, GrammarError> {
        match self.value(key) {
            Some(text) => {
                text.parse::<f64>().map_err(|_| GrammarError::InvalidNumber(text.to_string()))
            }
            None => Ok(default),
        }
    }

    /// The explicit selection weight from a `p=...` attribute, if any.
    pub fn probability(&self) -> Result<Option<f64>, GrammarError> {
        match self.value("p") {
            Some(text) => text
                .parse::<f64>()
                .map(Some)
                .map_err(|_| GrammarError::InvalidNumber(text.to_string())),
            None => Ok(None),
        }
    }
}

/// Parses an integer literal with base detection: `0x` hex, `0o` octal,
/// `0b` binary, decimal otherwise. A leading sign is allowed.
pub fn parse_int_literal(text: &str) -> Result<i128, GrammarError> {
    let trimmed = text.trim();
    let err = || GrammarError::InvalidInteger(text.to_string());

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        (8, oct)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, bin)
    } else {
        (10, digits)
    };

    let magnitude = i128::from_str_radix(digits, radix).map_err(|_| err())?;
    Ok(if negative { -magnitude } else { magnitude })
}
