//! String-surgery repair for claim payloads that fail JSON parsing.
//!
//! The game writes two free-text fields (`settlementFlagName`,
//! `ownerName`) into claim documents without escaping, so raw control
//! bytes occasionally corrupt the JSON. The repair excises the known-bad
//! field by boundary search between its own delimiter and the delimiter of
//! the field that always follows it, holds the excised text aside in
//! sanitized form, and lets the caller re-attempt a typed parse on the
//! reduced document.

/// Replacement for every character outside the printable ASCII range.
const PLACEHOLDER: &str = "[]";

/// Result of one field excision. `value` is `None` when either boundary
/// marker was missing, in which case `document` is the unmodified input.
#[derive(Debug, Clone)]
pub(crate) struct Excised {
    pub document: String,
    pub value: Option<String>,
}

/// Replace every character outside `0x20..=0x7E` with the two-character
/// placeholder.
pub(crate) fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if (' '..='~').contains(&c) {
            out.push(c);
        } else {
            out.push_str(PLACEHOLDER);
        }
    }
    out
}

/// Cut the string field named `field` out of `document`, scanning from its
/// `,"field"` delimiter to the `,"next_field"` delimiter that is known to
/// follow it. The removed value (without its surrounding quotes) comes
/// back sanitized.
pub(crate) fn excise_field(document: &str, field: &str, next_field: &str) -> Excised {
    let marker = format!(",\"{field}\"");
    let next_marker = format!(",\"{next_field}\"");

    let Some(start) = document.find(&marker) else {
        return Excised {
            document: document.to_string(),
            value: None,
        };
    };
    let Some(end) = document.find(&next_marker) else {
        return Excised {
            document: document.to_string(),
            value: None,
        };
    };

    // Skip the `:"` after the field name; stop before the closing quote.
    let value_start = start + marker.len() + 2;
    if end <= value_start
        || !document.is_char_boundary(value_start)
        || !document.is_char_boundary(end - 1)
    {
        return Excised {
            document: document.to_string(),
            value: None,
        };
    }
    let value = sanitize(&document[value_start..end - 1]);
    let mut reduced = String::with_capacity(document.len());
    reduced.push_str(&document[..start]);
    reduced.push_str(&document[end..]);
    Excised {
        document: reduced,
        value: Some(value),
    }
}
