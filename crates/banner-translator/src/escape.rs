//! Message-text escaping for the appliance wire format.
//!
//! The text handed to us by the external database carries the same in-band
//! sign-protocol control sequences the physical-sign code path consumes:
//! a one-byte escape (`SIGN_COMMAND`) introduces a command byte, optionally
//! followed by data bytes; two standalone bytes (`SIGN_CR`,
//! `SIGN_BLOCK_CHARACTER`) are recognized without an escape prefix.
//!
//! The literal escape/command byte values used by the sign protocol are not
//! recoverable from the retained source excerpts (they live in a shared
//! sign-protocol header outside the filtered set) — the constants below
//! name the escape shape this module implements, not upstream's exact
//! wire bytes. What *is* preserved faithfully is which command is dropped,
//! which is substituted, and which emits a JSON-safe markup token, per the
//! documented behavior.

/// Introduces a control sequence; followed by a one-byte command code.
pub const SIGN_COMMAND: u8 = 0x01;
/// Dropped unconditionally, without needing the `SIGN_COMMAND` escape.
pub const SIGN_CR: u8 = 0x0D;
/// Dropped unconditionally, without needing the `SIGN_COMMAND` escape.
pub const SIGN_BLOCK_CHARACTER: u8 = 0x7F;

const SIGN_FONT: u8 = b'F';
const SIGN_DATEEMBED: u8 = b'D';
const SIGN_TIMEEMBED: u8 = b'T';
const SIGN_AUTHORITYEMBED: u8 = b'A';
const SIGN_JUSTIFY: u8 = b'J';
const SIGN_TIMESET: u8 = b'K';
/// Vestigial: the source carries this path half-finished behind a remark
/// that it "is not working yet". We drop it like the other ambient codes.
const SIGN_MODE: u8 = b'M';
const SIGN_SIGNATUREEMBED: u8 = b'G';
/// Ends translation of the remaining buffer immediately.
const SIGN_SEQUENCE: u8 = b'Q';
const SIGN_FCOLOR: u8 = b'C';
const SIGN_BCOLOR: u8 = b'B';

/// Placeholder substituted for a `SIGN_SIGNATUREEMBED` sequence.
const SUBSTITUTE_SIGNATURE_TEXT: &str = "[signature]";

/// Escape `text` for embedding into the appliance JSON `msgtext` field:
/// double quotes are backslash-escaped; in-band control sequences are
/// dropped, substituted, or translated into `{color=N}` / `{bgcolor=N}`
/// markup tokens, per the module doc comment.
pub fn escape_message_text(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut prev_fcolor: Option<u8> = None;
    let mut prev_bcolor: Option<u8> = None;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => {
                out.push('\\');
                out.push('"');
                i += 1;
            }
            SIGN_CR | SIGN_BLOCK_CHARACTER => {
                i += 1;
            }
            SIGN_COMMAND => {
                let Some(&cmd) = bytes.get(i + 1) else {
                    break;
                };
                match cmd {
                    SIGN_SEQUENCE => break,
                    SIGN_SIGNATUREEMBED => {
                        out.push_str(SUBSTITUTE_SIGNATURE_TEXT);
                        i += 2;
                    }
                    SIGN_FCOLOR => {
                        let color = bytes.get(i + 2).copied();
                        if color != prev_fcolor {
                            if let Some(c) = color {
                                out.push_str(&format!("{{color={c}}}"));
                            }
                            prev_fcolor = color;
                        }
                        i += 3;
                    }
                    SIGN_BCOLOR => {
                        let color = bytes.get(i + 2).copied();
                        if color != prev_bcolor {
                            if let Some(c) = color {
                                out.push_str(&format!("{{bgcolor={c}}}"));
                            }
                            prev_bcolor = color;
                        }
                        i += 3;
                    }
                    SIGN_FONT | SIGN_DATEEMBED | SIGN_TIMEEMBED | SIGN_AUTHORITYEMBED
                    | SIGN_JUSTIFY | SIGN_TIMESET | SIGN_MODE => {
                        i += 2;
                    }
                    _ => {
                        // Unrecognized command byte: drop the escape and
                        // the command byte, matching the source's
                        // fall-through "unknown code" behavior.
                        i += 2;
                    }
                }
            }
            _ => {
                // Safe: we only special-case single ASCII control bytes
                // above, so the remaining bytes of any multi-byte UTF-8
                // sequence fall through here unmodified.
                out.push(b as char);
                i += 1;
            }
        }
    }
    out
}
