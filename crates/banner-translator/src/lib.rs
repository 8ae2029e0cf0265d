//! Appliance Translator (spec 4.D): pure functions from a banner record
//! view plus device/slot context to the appliance's JSON wire bodies.

mod escape;
mod purpose;
mod render;

pub use escape::escape_message_text;
pub use purpose::{resolve_webpage_url, select_new_message_purpose};
pub use render::{
    clear_sign, new_message, render_message, sequence_number, stop_message, MessageContext,
    TranslatorError,
};
