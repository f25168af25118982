//! Field splitting for a single protocol line.
//!
//! Fields are separated by spaces or commas, except inside a `"quoted"` run or an
//! encapsulation block. Quote characters and block markers are consumed and never
//! appear in the emitted field text.

use crate::protocol::{BEGIN_ENCAP, END_ENCAP};

/// Split one message body into its fields.
///
/// Parsing is permissive: an unterminated quote or block simply extends the last
/// field to the end of the input. Empty fields (from `", "` separators) are dropped.
pub fn split_fields(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut in_block = false;
    let mut skip_until = 0;

    for (i, ch) in text.char_indices() {
        if i < skip_until {
            continue;
        }

        if (ch == ' ' || ch == ',') && !in_quote && !in_block {
            flush(&mut fields, &mut current);
            continue;
        }

        let rest = &text[i..];
        if ch == '"' && !in_quote && !in_block {
            in_quote = true;
        } else if rest.starts_with(BEGIN_ENCAP) {
            in_block = true;
            skip_until = i + BEGIN_ENCAP.len();
        } else if ch == '"' && in_quote {
            in_quote = false;
        } else if in_block && rest.starts_with(END_ENCAP) {
            in_block = false;
            skip_until = i + END_ENCAP.len();
        } else {
            current.push(ch);
        }
    }

    flush(&mut fields, &mut current);
    fields
}

fn flush(fields: &mut Vec<String>, current: &mut String) {
    let mut field = std::mem::take(current);
    if field.ends_with(',') {
        field.pop();
    }
    if !field.is_empty() {
        fields.push(field);
    }
}
