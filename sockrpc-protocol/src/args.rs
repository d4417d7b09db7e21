//! Call argument encoding.
//!
//! A call body is a single string of comma-separated arguments. Commas
//! inside a double-quoted span are not delimiters, and a `"` preceded by a
//! backslash does not close the span. An argument fully wrapped in double
//! quotes has the outer quotes stripped; escapes inside are kept verbatim.

use crate::error::ProtocolError;

/// Splits a call body into its arguments.
///
/// An empty body yields no arguments.
pub fn parse_args(body: &[u8]) -> Result<Vec<String>, ProtocolError> {
    let text = std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8("call body"))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let bytes = text.as_bytes();
    let mut args = Vec::new();
    let mut start = 0;
    let mut quote_start: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b',' if quote_start.is_none() => {
                args.push(&text[start..i]);
                start = i + 1;
            }
            b'"' => match quote_start {
                None => quote_start = Some(i),
                Some(_) if i > 0 && bytes[i - 1] != b'\\' => quote_start = None,
                Some(_) => {}
            },
            _ => {}
        }
    }
    if let Some(pos) = quote_start {
        return Err(ProtocolError::UnterminatedQuote(pos));
    }
    args.push(&text[start..]);

    Ok(args.into_iter().map(strip_quotes).collect())
}

fn strip_quotes(arg: &str) -> String {
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        arg[1..arg.len() - 1].to_string()
    } else {
        arg.to_string()
    }
}

/// Joins arguments into a call body, quoting those that would otherwise be
/// split or stripped.
pub fn encode_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if arg.contains(',') || arg.contains('"') {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
