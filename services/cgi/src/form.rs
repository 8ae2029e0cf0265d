//! CGI form decoding (spec.md 4.H/6): `+` decodes to space, `%HH` decodes
//! to the byte, and any decoded `"` or `'` maps to a backtick. Grounded on
//! `original_source/backend/smajax.c`'s `cgi_decode_form_string`: the
//! quote substitution applies only to bytes produced by a `%HH` escape,
//! never to a raw literal quote character copied straight through.

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("bad-form-input: {0}")]
    BadInput(String),
}

fn hex_digit(c: u8) -> u32 {
    (c as char).to_digit(16).unwrap_or(0)
}

/// Decode one `application/x-www-form-urlencoded` value per the rules
/// above. Malformed `%` escapes (missing one or both hex digits) decode
/// whatever digits are present, same as the source's short-circuiting
/// `if(in_str[j])` guards.
pub fn decode_value(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                i += 1;
                let mut hex = 0u32;
                if i < bytes.len() {
                    hex = hex_digit(bytes[i]);
                    i += 1;
                }
                if i < bytes.len() {
                    hex = hex * 16 + hex_digit(bytes[i]);
                    i += 1;
                }
                let byte = match hex as u8 {
                    b'"' | b'\'' => b'`',
                    other => other,
                };
                out.push(byte);
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a raw query string / POST body of `key=value&key=value…` pairs,
/// decoding each value. The first parsed key determines which CGI action
/// runs (spec.md 4.H); callers look fields up by exact key name.
pub fn parse(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_owned(), decode_value(v)),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}

/// Look up a field by exact key, matching the first occurrence (the
/// source's `cgi_parsed_lookup` also takes the first match).
pub fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
