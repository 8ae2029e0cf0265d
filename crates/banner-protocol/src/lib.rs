//! Wire and domain types shared by the banner dispatcher workspace.
//!
//! Mirrors the WTC command envelope and banner/hardware record views
//! described in the core's data model: the queue moves [`CommandEnvelope`]
//! rows between producers and per-device dispatcher workers, and the
//! translator consumes [`BannerRecordView`] + [`HardwareRecordView`] to
//! build appliance JSON.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WTC command envelope
// ---------------------------------------------------------------------------

/// Whether an envelope is a fire-and-forget write or a request expecting a
/// sentinel-terminated response sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Write,
    Read,
}

/// The fixed set of command-type codes the queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    NewMessage,
    ClearSign,
    SequenceChange,
    StopMessage,
    ShowSignMessages,
    HardwareUpdate,
    ApplianceSync,
}

/// The fixed set of role codes used as envelope source/destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    LaunchUi,
    Sequencer,
    Cgi,
    Dispatcher,
    Hardware,
    BannerBoard,
}

/// Sentinel protocol flag for multi-row READ responses (spec.md 4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Flag {
    Data = 0,
    EndOfResponse = 1,
    Cancel = 2,
}

impl Flag {
    pub fn is_sentinel(self) -> bool {
        matches!(self, Flag::EndOfResponse | Flag::Cancel)
    }
}

/// One row in the WTC queue.
///
/// `origin_pid` and `return_node` are diagnostic/routing passengers, not
/// used by the queue itself for ordering or filtering (spec.md 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub operation: OperationKind,
    pub command_type: CommandType,
    pub source: Role,
    pub destination: Role,
    pub origin_pid: u32,
    pub hardware_recno: i64,
    pub banner_stream_recno: i64,
    pub parent_template_recno: i64,
    pub sequence: Vec<u8>,
    pub message_buffer: String,
    pub return_node: String,
    pub flag: Flag,
    pub seq_change_op: u8,
    /// Present on `ShowSignMessages` response rows; classifies
    /// `banner_stream_recno` as active/waiting/hidden/unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<u8>,
}

impl CommandEnvelope {
    /// Derive the `active|waiting|hidden|unknown` classification used by
    /// the CGI `recnosOnly` action (spec.md 4.H) from `message_type`.
    pub fn message_type_label(&self) -> &'static str {
        match self.message_type {
            Some(0) => "active",
            Some(1) => "waiting",
            Some(2) => "hidden",
            _ => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware / device records (external DB view)
// ---------------------------------------------------------------------------

/// Whether a device's network address is statically configured or learned
/// from a sibling subsystem (spec.md 4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressConfig {
    Auto,
    Fixed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareRecordView {
    pub record_number: i64,
    pub device_id: String,
    pub address: AddressConfig,
    pub password: String,
    /// "DHCP" or "Static"; compared against the CGI `ipMethodConfig` input.
    pub ip_method_configured: String,
    /// Audio groups this device is a permanent member of (`dsi_audio_group_name`).
    pub audio_group_memberships: Vec<String>,
}

// ---------------------------------------------------------------------------
// Banner record (read-only view into the external message DB)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultimediaType {
    Video,
    VideoStretched,
    VideoZoom1,
    VideoZoom2,
    Webpage,
    WebMedia,
    LocationsDisplay,
    GeoLocationsMap,
    None,
    Message,
    MessageFullScreen,
}

impl MultimediaType {
    /// The literal written into the `multimediatype` JSON field.
    pub fn as_json_str(self) -> &'static str {
        match self {
            MultimediaType::Video => "Video",
            MultimediaType::VideoStretched => "VideoStretched",
            MultimediaType::VideoZoom1 => "VideoZoom1",
            MultimediaType::VideoZoom2 => "VideoZoom2",
            MultimediaType::Webpage => "Webpage",
            MultimediaType::WebMedia => "WebMedia",
            MultimediaType::LocationsDisplay => "LocationsDisplay",
            MultimediaType::GeoLocationsMap => "GeoLocationsMap",
            MultimediaType::None => "None",
            MultimediaType::Message => "Message",
            MultimediaType::MessageFullScreen => "MessageFullScreen",
        }
    }
}

/// The raw `dbb_audio_group` selector on a banner record: either a single
/// named group, or one of the two literals that require resolution against
/// another record (spec.md 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioGroupSelector {
    Named(String),
    /// Resolve via the template's options record.
    Multiple,
    /// Resolve via the launch's multi-audio list.
    Choose,
}

/// Opaque pass-through presentation knobs plus the fields the translator
/// and journal need to look at directly. Field names follow the `dbb_*`
/// wire keys they ultimately populate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerRecordView {
    pub recno_zx: i64,
    pub recno_template: i64,
    pub launch_timestamp: i64,
    pub duration: i64,
    pub kind_code: String,
    pub text: String,
    pub details: String,
    pub audio_group: AudioGroupSelector,
    pub playtime_duration: i64,
    pub flasher_duration: i64,
    pub light_signal: String,
    pub light_duration: i64,
    pub audio_tts_gain: i64,
    pub flash_new_message: String,
    pub visible_time: String,
    pub visible_frequency: String,
    pub visible_duration: String,
    pub record_voice_at_launch_selection: i64,
    pub record_voice_at_launch: String,
    pub audio_recorded_gain: i64,
    pub pa_delivery_mode: String,
    pub audio_repeat: String,
    pub speed: i64,
    pub priority: i64,
    pub expire_priority: i64,
    pub priority_duration: i64,
    pub multimedia_type: MultimediaType,
    pub multimedia_audio_gain: i64,
    pub show_camera: bool,
    pub camera_device_id: Option<String>,
    /// Raw webpage URL / video filename before device-relative resolution.
    pub webpage_or_video: Option<String>,
    pub launch_pin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRecordView {
    pub gender: String,
}
