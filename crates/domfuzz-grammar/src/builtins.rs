//! Built-in and constant tag generators
//!
//! Built-ins are resolved by name before any user-defined symbol lookup:
//! integer and float families (decimal text, or fixed-width binary with
//! `b`/`be`), single characters, random strings, hex digits, cross-grammar
//! `import` expansion, and nested `lines` blocks.

use rand::Rng;

use crate::Grammar;
use crate::error::{Error, GrammarError};
use crate::tag::Tag;

/// Fixed single-character tags usable anywhere in a right-hand side.
const CONSTANT_TYPES: &[(&str, &str)] = &[
    ("lt", "<"),
    ("gt", ">"),
    ("hash", "#"),
    ("cr", "\r"),
    ("lf", "\n"),
    ("space", " "),
    ("tab", "\t"),
    ("ex", "!"),
];

const BUILT_IN_TYPES: &[&str] = &[
    "int", "int32", "uint32", "int8", "uint8", "int16", "uint16", "int64", "uint64", "float",
    "double", "char", "string", "htmlsafestring", "hex", "import", "lines",
];

/// The fixed expansion of a constant tag, if `name` is one.
pub fn constant_value(name: &str) -> Option<&'static str> {
    CONSTANT_TYPES.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// True if `name` dispatches to a built-in generator.
pub fn is_built_in(name: &str) -> bool {
    BUILT_IN_TYPES.contains(&name)
}

/// Inclusive default range for an integer tag name.
fn int_range(name: &str) -> Option<(i128, i128)> {
    let range = match name {
        "int" | "int32" => (i32::MIN as i128, i32::MAX as i128),
        "uint32" => (0, u32::MAX as i128),
        "int8" => (i8::MIN as i128, i8::MAX as i128),
        "uint8" => (0, u8::MAX as i128),
        "int16" => (i16::MIN as i128, i16::MAX as i128),
        "uint16" => (0, u16::MAX as i128),
        "int64" => (i64::MIN as i128, i64::MAX as i128),
        "uint64" => (0, u64::MAX as i128),
        _ => return None,
    };
    Some(range)
}

fn int_width_bits(name: &str) -> u32 {
    match name {
        "int8" | "uint8" => 8,
        "int16" | "uint16" => 16,
        "int64" | "uint64" => 64,
        _ => 32,
    }
}

/// Packs `value` as a fixed-width two's-complement integer and maps each
/// byte to the char with the same code, so binary data survives inside the
/// `String` the expansion returns.
fn pack_int(name: &str, value: i128, big_endian: bool) -> Result<String, GrammarError> {
    let bits = int_width_bits(name);
    let (lo, hi) = int_range(name).unwrap_or((i128::MIN, i128::MAX));
    if value < lo || value > hi {
        return Err(GrammarError::PackOutOfRange { value, width: bits });
    }
    let n = (bits / 8) as usize;
    let raw = (value as u128).to_le_bytes();
    let bytes: Vec<u8> =
        if big_endian { raw[..n].iter().rev().copied().collect() } else { raw[..n].to_vec() };
    Ok(bytes_to_string(&bytes))
}

fn bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn char_from_code(code: i128) -> Result<char, GrammarError> {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or(GrammarError::InvalidCodePoint(code))
}

/// Escapes `& < > " '` for safe interpolation into markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn generate_int<R: Rng>(tag: &Tag, rng: &mut R) -> Result<String, GrammarError> {
    let name = tag.name();
    let (default_min, default_max) =
        int_range(name).ok_or_else(|| GrammarError::NoCreators(name.to_string()))?;
    let min = tag.int_value("min", default_min)?;
    let max = tag.int_value("max", default_max)?;
    if min > max {
        return Err(GrammarError::RangeInversion(name.to_string()));
    }

    let value = rng.random_range(min..=max);
    if tag.has("b") || tag.has("be") {
        pack_int(name, value, tag.has("be"))
    } else {
        Ok(value.to_string())
    }
}

fn generate_float<R: Rng>(tag: &Tag, rng: &mut R) -> Result<String, GrammarError> {
    let min = tag.float_value("min", 0.0)?;
    let max = tag.float_value("max", 1.0)?;
    if min > max {
        return Err(GrammarError::RangeInversion(tag.name().to_string()));
    }

    let value = min + rng.random::<f64>() * (max - min);
    if tag.has("b") {
        let bytes = if tag.name() == "float" {
            (value as f32).to_le_bytes().to_vec()
        } else {
            value.to_le_bytes().to_vec()
        };
        Ok(bytes_to_string(&bytes))
    } else {
        Ok(value.to_string())
    }
}

fn generate_char<R: Rng>(tag: &Tag, rng: &mut R) -> Result<String, GrammarError> {
    if tag.has("code") {
        let code = tag.int_value("code", 0)?;
        return Ok(char_from_code(code)?.to_string());
    }

    let min = tag.int_value("min", 0)?;
    let max = tag.int_value("max", 255)?;
    if min > max {
        return Err(GrammarError::RangeInversion("char".to_string()));
    }
    Ok(char_from_code(rng.random_range(min..=max))?.to_string())
}

fn generate_string<R: Rng>(tag: &Tag, rng: &mut R) -> Result<String, GrammarError> {
    let min = tag.int_value("min", 0)?;
    let max = tag.int_value("max", 255)?;
    if min > max {
        return Err(GrammarError::RangeInversion("string".to_string()));
    }
    let min_len = tag.int_value("minlength", 0)?;
    let max_len = tag.int_value("maxlength", 20)?;
    if min_len > max_len || min_len < 0 {
        return Err(GrammarError::RangeInversion("string".to_string()));
    }

    let length = rng.random_range(min_len..=max_len) as usize;
    let mut out = String::with_capacity(length);
    for _ in 0..length {
        out.push(char_from_code(rng.random_range(min..=max))?);
    }
    Ok(out)
}

fn generate_hex<R: Rng>(tag: &Tag, rng: &mut R) -> String {
    let digit: u32 = rng.random_range(0..16);
    if tag.has("up") { format!("{digit:X}") } else { format!("{digit:x}") }
}

/// Expands a built-in tag. The caller has already checked
/// [`is_built_in`]; `import` and `lines` re-enter the grammar.
pub fn generate<R: Rng>(grammar: &Grammar, tag: &Tag, rng: &mut R) -> Result<String, Error> {
    let expanded = match tag.name() {
        "int" | "int32" | "uint32" | "int8" | "uint8" | "int16" | "uint16" | "int64" | "uint64" => {
            generate_int(tag, rng)?
        }
        "float" | "double" => generate_float(tag, rng)?,
        "char" => generate_char(tag, rng)?,
        "string" => generate_string(tag, rng)?,
        "htmlsafestring" => escape_html(&generate_string(tag, rng)?),
        "hex" => generate_hex(tag, rng),
        "import" => grammar.generate_import_tag(tag, rng)?,
        "lines" => grammar.generate_lines_tag(tag, rng)?,
        other => return Err(GrammarError::NoCreators(other.to_string()).into()),
    };
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn constants_cover_the_reserved_characters() {
        assert_eq!(constant_value("lt"), Some("<"));
        assert_eq!(constant_value("gt"), Some(">"));
        assert_eq!(constant_value("lf"), Some("\n"));
        assert_eq!(constant_value("ex"), Some("!"));
        assert_eq!(constant_value("line"), None);
    }

    #[test]
    fn degenerate_int_range_is_exact() {
        let tag = Tag::parse("uint8 min=0 max=0").unwrap();
        assert_eq!(generate_int(&tag, &mut rng()).unwrap(), "0");
    }

    #[test]
    fn int_range_inversion_is_an_error() {
        let tag = Tag::parse("int min=5 max=2").unwrap();
        assert_eq!(
            generate_int(&tag, &mut rng()),
            Err(GrammarError::RangeInversion("int".to_string()))
        );
    }

    #[test]
    fn binary_packing_is_little_endian_by_default() {
        let tag = Tag::parse("uint16 min=258 max=258 b").unwrap();
        assert_eq!(generate_int(&tag, &mut rng()).unwrap(), "\u{02}\u{01}");

        let tag = Tag::parse("uint16 min=258 max=258 be").unwrap();
        assert_eq!(generate_int(&tag, &mut rng()).unwrap(), "\u{01}\u{02}");
    }

    #[test]
    fn signed_packing_uses_twos_complement() {
        let tag = Tag::parse("int8 min=-1 max=-1 b").unwrap();
        assert_eq!(generate_int(&tag, &mut rng()).unwrap(), "\u{ff}");
    }

    #[test]
    fn packing_rejects_values_outside_the_type() {
        let tag = Tag::parse("uint8 min=256 max=256 b").unwrap();
        assert!(matches!(
            generate_int(&tag, &mut rng()),
            Err(GrammarError::PackOutOfRange { value: 256, width: 8 })
        ));
    }

    #[test]
    fn text_mode_allows_values_outside_the_type() {
        // Without b/be the attribute range overrides the type range.
        let tag = Tag::parse("uint8 min=99999 max=99999").unwrap();
        assert_eq!(generate_int(&tag, &mut rng()).unwrap(), "99999");
    }

    #[test]
    fn char_code_attribute_is_exact() {
        let tag = Tag::parse("char code=65").unwrap();
        assert_eq!(generate_char(&tag, &mut rng()).unwrap(), "A");
    }

    #[test]
    fn surrogate_code_points_are_rejected() {
        let tag = Tag::parse("char code=0xd800").unwrap();
        assert!(matches!(
            generate_char(&tag, &mut rng()),
            Err(GrammarError::InvalidCodePoint(0xd800))
        ));
    }

    #[test]
    fn string_length_bounds_are_honored() {
        let tag = Tag::parse("string minlength=4 maxlength=4 min=97 max=97").unwrap();
        assert_eq!(generate_string(&tag, &mut rng()).unwrap(), "aaaa");
    }

    #[test]
    fn html_string_escapes_markup() {
        assert_eq!(escape_html("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&#x27;");
    }

    #[test]
    fn float_packing_widths() {
        let tag = Tag::parse("float min=0 max=0 b").unwrap();
        assert_eq!(generate_float(&tag, &mut rng()).unwrap().chars().count(), 4);
        let tag = Tag::parse("double min=0 max=0 b").unwrap();
        assert_eq!(generate_float(&tag, &mut rng()).unwrap().chars().count(), 8);
    }

    #[test]
    fn hex_digit_is_single_and_case_follows_up_flag() {
        let lower = Tag::parse("hex").unwrap();
        let upper = Tag::parse("hex up").unwrap();
        let mut r = rng();
        for _ in 0..32 {
            let d = generate_hex(&lower, &mut r);
            assert_eq!(d.len(), 1);
            assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            let d = generate_hex(&upper, &mut r);
            assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }
}
