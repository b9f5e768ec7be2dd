use serde_json::Value;

use crate::models::event::Answer;

/// Decode the complete answer text of a structured-output request.
///
/// Strict json first. Some backends double-escape their output, so on failure the literal
/// escape sequences are unescaped and the text parsed again. If that fails too the original
/// text is returned as [`Answer::Text`]; this never errors.
pub fn decode_structured(text: &str) -> Answer {
    match serde_json::from_str::<Value>(text) {
        // A json string that itself holds a document is the same double-encoding problem
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) if value.is_object() || value.is_array() => Answer::Structured(value),
            _ => Answer::Structured(Value::String(inner)),
        },
        Ok(value) => Answer::Structured(value),
        Err(strict) => {
            let unescaped = unescape_literal(text);
            match serde_json::from_str::<Value>(&unescaped) {
                Ok(value) => Answer::Structured(value),
                Err(lenient) => {
                    tracing::debug!(
                        "Structured output is not json ({}; after unescaping: {})",
                        strict,
                        lenient
                    );
                    Answer::Text(text.to_string())
                }
            }
        }
    }
}

/// Replace backslash escape sequences written out literally (`\"`, `\n`, `\u00e9`, ...)
/// with the characters they stand for. Unknown sequences are left alone.
pub fn unescape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.clone().skip(1).take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        out.push(decoded);
                        for _ in 0..5 {
                            chars.next();
                        }
                        continue;
                    }
                    _ => {
                        out.push('\\');
                        continue;
                    }
                }
            }
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}
