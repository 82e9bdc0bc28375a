//! Text-to-number conversion for values scraped from pt-BR pages.
//!
//! The source site formats numbers the Brazilian way (`1.234,56`), prefixes
//! money with `R$`/`US$` and abbreviates magnitudes with words such as
//! `Milhões` or single letters (`M`, `B`). Both functions here are pure.

/// Currency prefixes stripped before parsing.
const CURRENCY_PREFIXES: [&str; 2] = ["US$", "R$"];

/// Parse a monetary value such as `"R$ 1.234,56"` or `"1,5 Bilhões"`.
///
/// Magnitude suffixes are rewritten into exponent notation before the
/// numeric parse, so `"1,5 Bilhões"` becomes `1.5e9`. Scientific notation
/// (`"1.5e9"`) is accepted as is and combines with a suffix. Returns `None`
/// for empty input, unknown suffixes and anything that is not a finite number.
pub fn normalize(text: &str) -> Option<f64> {
    let mut value = text.trim().to_string();
    if value.is_empty() {
        return None;
    }
    for prefix in CURRENCY_PREFIXES {
        value = value.replace(prefix, "");
    }
    value.retain(|c| !c.is_whitespace());

    let split = value
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(value.len());
    let (mantissa, rest) = value.split_at(split);
    let (scientific, suffix) = rest.split_at(scientific_exponent_len(rest));
    let magnitude = magnitude_exponent(suffix)?;

    if scientific.is_empty() {
        let literal = decimal_literal(mantissa)?;
        return parse_finite(&format!("{literal}e{magnitude}"));
    }
    // A mantissa written in scientific notation never carries thousands
    // separators, so a lone dot is always the decimal point.
    let exponent = scientific[1..].parse::<i32>().ok()?.checked_add(magnitude)?;
    let literal = comma_decimal(mantissa)?;
    parse_finite(&format!("{literal}e{exponent}"))
}

/// Parse a percentage or plain ratio such as `"-0,52%"` or `"0.985"`.
///
/// Only a comma marks pt-BR formatting here. Without one, a dot is the
/// decimal point: ratios like `0.985` have three decimals far more often than
/// percentages run into the thousands.
pub fn parse_percentage(text: &str) -> Option<f64> {
    let mut value = text.replace('%', "");
    value.retain(|c| !c.is_whitespace());
    parse_finite(&comma_decimal(&value)?)
}

/// Byte length of a leading `e[+-]digits` exponent in `rest`, or 0.
fn scientific_exponent_len(rest: &str) -> usize {
    let Some(tail) = rest.strip_prefix(|c: char| c == 'e' || c == 'E') else {
        return 0;
    };
    let unsigned = tail
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(tail);
    let digits = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return 0;
    }
    rest.len() - unsigned.len() + digits
}

/// Map a magnitude suffix to a power of ten. An empty suffix means none.
fn magnitude_exponent(suffix: &str) -> Option<i32> {
    match suffix.to_lowercase().as_str() {
        "" => Some(0),
        "k" | "mil" => Some(3),
        "m" | "mi" | "milhão" | "milhao" | "milhões" | "milhoes" => Some(6),
        "b" | "bi" | "bilhão" | "bilhao" | "bilhões" | "bilhoes" => Some(9),
        "t" | "tri" | "trilhão" | "trilhao" | "trilhões" | "trilhoes" => Some(12),
        _ => None,
    }
}

/// Rewrite pt-BR separators into a Rust float literal.
///
/// With a comma present, dots are thousands separators and the comma is the
/// decimal point. Without one, several dots or a single dot followed by
/// exactly three digits are thousands separators. Any other single dot is a
/// decimal point, which keeps already-normalized strings stable.
fn decimal_literal(number: &str) -> Option<String> {
    if number.contains(',') {
        return comma_decimal(number);
    }
    let thousands = match number.matches('.').count() {
        0 => false,
        1 => number
            .rsplit('.')
            .next()
            .is_some_and(|tail| tail.len() == 3 && tail.chars().all(|c| c.is_ascii_digit())),
        _ => true,
    };
    if thousands {
        Some(number.replace('.', ""))
    } else {
        comma_decimal(number)
    }
}

/// Comma as the decimal point when there is one, dots kept otherwise.
fn comma_decimal(number: &str) -> Option<String> {
    if number.is_empty() {
        None
    } else if number.contains(',') {
        Some(number.replace('.', "").replace(',', "."))
    } else {
        Some(number.to_string())
    }
}

fn parse_finite(literal: &str) -> Option<f64> {
    literal.parse::<f64>().ok().filter(|v| v.is_finite())
}
