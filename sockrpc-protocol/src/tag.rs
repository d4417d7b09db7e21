//! Request-id tags carried in the frame name field.
//!
//! A tagged call is named `#<id>:<method>` and its reply is named `#<id>`.
//! Untagged peers never produce names starting with `#<digits>`, so both
//! forms share the wire without a header change.

/// Prefix marking a tagged name.
pub const TAG_PREFIX: char = '#';

/// Builds the frame name for a tagged call.
pub fn tagged_call_name(id: u64, method: &str) -> String {
    format!("{TAG_PREFIX}{id}:{method}")
}

/// Builds the frame name for a tagged reply.
pub fn reply_name(id: u64) -> String {
    format!("{TAG_PREFIX}{id}")
}

/// Splits a call name into its optional tag and the method name.
pub fn split_call_name(name: &str) -> (Option<u64>, &str) {
    if let Some(rest) = name.strip_prefix(TAG_PREFIX) {
        if let Some((id, method)) = rest.split_once(':') {
            if let Some(id) = parse_id(id) {
                return (Some(id), method);
            }
        }
    }
    (None, name)
}

/// Parses a reply name. Returns `None` if the name is not a tag.
pub fn parse_reply_name(name: &str) -> Option<u64> {
    name.strip_prefix(TAG_PREFIX).and_then(parse_id)
}

fn parse_id(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
