//! Builds the appliance JSON wire bodies (spec 4.D). Pure functions: all
//! database-dependent resolution (audio groups, launcher gender, camera
//! stream URL) happens in the caller; this module only shapes JSON.

use crate::escape::escape_message_text;
use crate::purpose::{resolve_webpage_url, select_new_message_purpose};
use banner_protocol::{BannerRecordView, HardwareRecordView};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("unsupported-command: {0}")]
    Unsupported(String),
}

/// Everything needed to render one message object, with every
/// database-dependent value already resolved by the caller.
pub struct MessageContext<'a> {
    pub banner: &'a BannerRecordView,
    pub slot: usize,
    /// Every audio group this device is a permanent member of
    /// (`dsi_audio_group_name`).
    pub device_audio_groups: &'a [String],
    /// Every audio group this banner record targets, already resolved from
    /// the `multiple`/`choose` literals where applicable
    /// (`dbb_audio_groups`).
    pub resolved_audio_groups: &'a [String],
    /// Resolved RTSP stream URL, present only for camera messages.
    pub camera_stream_url: Option<&'a str>,
    /// From the launcher's staff record when `launch_pin` is valid, else
    /// empty.
    pub gender: &'a str,
}

/// Render one per-message JSON object in the exact key order spec 4.D
/// requires (load-bearing: the journal equality check in 4.G compares
/// these objects key-for-key, minus `signseqnum`/`dbb_rec_dtsec`).
pub fn render_message(ctx: &MessageContext<'_>) -> Value {
    let b = ctx.banner;
    let mut obj = Map::new();
    obj.insert("signseqnum".into(), Value::from(ctx.slot));
    obj.insert("dbb_rec_dtsec".into(), Value::from(b.launch_timestamp));
    obj.insert("recno_zx".into(), Value::from(b.recno_zx.to_string()));
    obj.insert("recno_template".into(), Value::from(b.recno_template));
    obj.insert("dbb_duration".into(), Value::from(b.duration));
    obj.insert("msgtype".into(), Value::from(b.kind_code.clone()));
    obj.insert(
        "msgtext".into(),
        Value::from(escape_message_text(&b.text)),
    );
    obj.insert("msgdetails".into(), Value::from(b.details.clone()));
    obj.insert(
        "dsi_audio_group_name".into(),
        Value::from(ctx.device_audio_groups.to_vec()),
    );
    obj.insert(
        "dbb_audio_groups".into(),
        Value::from(ctx.resolved_audio_groups.to_vec()),
    );
    obj.insert("dbb_playtime_duration".into(), Value::from(b.playtime_duration));
    obj.insert("dbb_flasher_duration".into(), Value::from(b.flasher_duration));
    obj.insert("dbb_light_signal".into(), Value::from(b.light_signal.clone()));
    obj.insert("dbb_light_duration".into(), Value::from(b.light_duration));
    obj.insert("dbb_audio_tts_gain".into(), Value::from(b.audio_tts_gain));
    obj.insert(
        "dbb_flash_new_message".into(),
        Value::from(b.flash_new_message.clone()),
    );
    obj.insert("dbb_visible_time".into(), Value::from(b.visible_time.clone()));
    obj.insert(
        "dbb_visible_frequency".into(),
        Value::from(b.visible_frequency.clone()),
    );
    obj.insert("dbb_visible_duration".into(), Value::from(b.visible_duration.clone()));
    obj.insert(
        "dbb_record_voice_at_launch_selection".into(),
        Value::from(b.record_voice_at_launch_selection),
    );
    obj.insert(
        "dbb_record_voice_at_launch".into(),
        Value::from(b.record_voice_at_launch.clone()),
    );
    obj.insert("dbb_audio_recorded_gain".into(), Value::from(b.audio_recorded_gain));
    obj.insert("dbb_pa_delivery_mode".into(), Value::from(b.pa_delivery_mode.clone()));
    obj.insert("dbb_audio_repeat".into(), Value::from(b.audio_repeat.clone()));
    obj.insert("dbb_speed".into(), Value::from(b.speed));
    obj.insert("dbb_priority".into(), Value::from(b.priority));
    obj.insert("dbb_expire_priority".into(), Value::from(b.expire_priority));
    obj.insert("dbb_priority_duration".into(), Value::from(b.priority_duration));
    obj.insert("multimediatype".into(), Value::from(b.multimedia_type.as_json_str()));
    obj.insert("dbb_multimedia_audio_gain".into(), Value::from(b.multimedia_audio_gain));
    obj.insert(
        "webpageurl".into(),
        Value::from(resolve_webpage_url(
            b.multimedia_type,
            b.show_camera,
            b.camera_device_id.as_deref(),
            ctx.camera_stream_url,
            b.webpage_or_video.as_deref(),
        )),
    );
    obj.insert("dbb_launch_pin".into(), Value::from(b.launch_pin.clone()));
    obj.insert("dss_gender".into(), Value::from(ctx.gender));
    Value::Object(obj)
}

/// `new-message`: `{password, bannerpurpose, hardware_deviceid,
/// hardware_recno, bannermessages:[msg]}`.
pub fn new_message(password: &str, hardware: &HardwareRecordView, ctx: &MessageContext<'_>) -> Value {
    let purpose = select_new_message_purpose(
        ctx.banner.multimedia_type,
        ctx.banner.show_camera,
        ctx.banner.camera_device_id.as_deref(),
    );
    let mut obj = Map::new();
    obj.insert("password".into(), Value::from(password));
    obj.insert("bannerpurpose".into(), Value::from(purpose));
    obj.insert("hardware_deviceid".into(), Value::from(hardware.device_id.clone()));
    obj.insert("hardware_recno".into(), Value::from(hardware.record_number));
    obj.insert(
        "bannermessages".into(),
        Value::Array(vec![render_message(ctx)]),
    );
    Value::Object(obj)
}

/// `stop-message`: `{password, bannerpurpose:"stopscrollingmessage",
/// recno_zx}`.
pub fn stop_message(password: &str, recno_zx: i64) -> Value {
    let mut obj = Map::new();
    obj.insert("password".into(), Value::from(password));
    obj.insert("bannerpurpose".into(), Value::from("stopscrollingmessage"));
    obj.insert("recno_zx".into(), Value::from(recno_zx.to_string()));
    Value::Object(obj)
}

/// `clear-sign`: `{password, bannerpurpose:"clearsign"}`.
pub fn clear_sign(password: &str) -> Value {
    let mut obj = Map::new();
    obj.insert("password".into(), Value::from(password));
    obj.insert("bannerpurpose".into(), Value::from("clearsign"));
    Value::Object(obj)
}

/// `sequence-number`: `{password, bannerpurpose:"updateseq", seqstring,
/// bannermessages:[msg*]}`, where `bannermessages` enumerates every
/// currently populated slot in slot order.
pub fn sequence_number(password: &str, seqstring: &str, messages: &[MessageContext<'_>]) -> Value {
    let mut obj = Map::new();
    obj.insert("password".into(), Value::from(password));
    obj.insert("bannerpurpose".into(), Value::from("updateseq"));
    obj.insert("seqstring".into(), Value::from(seqstring));
    obj.insert(
        "bannermessages".into(),
        Value::Array(messages.iter().map(render_message).collect()),
    );
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use banner_protocol::{AudioGroupSelector, MultimediaType};

    fn sample_banner() -> BannerRecordView {
        BannerRecordView {
            recno_zx: 345,
            recno_template: 305,
            launch_timestamp: 1_700_000_000,
            duration: 60,
            kind_code: "scroll".into(),
            text: "hello".into(),
            details: "{}".into(),
            audio_group: AudioGroupSelector::Named("lobby".into()),
            playtime_duration: 0,
            flasher_duration: 0,
            light_signal: String::new(),
            light_duration: 0,
            audio_tts_gain: 0,
            flash_new_message: String::new(),
            visible_time: String::new(),
            visible_frequency: String::new(),
            visible_duration: String::new(),
            record_voice_at_launch_selection: 0,
            record_voice_at_launch: String::new(),
            audio_recorded_gain: 0,
            pa_delivery_mode: String::new(),
            audio_repeat: String::new(),
            speed: 0,
            priority: 0,
            expire_priority: 0,
            priority_duration: 0,
            multimedia_type: MultimediaType::None,
            multimedia_audio_gain: 0,
            show_camera: false,
            camera_device_id: None,
            webpage_or_video: None,
            launch_pin: "1234".into(),
        }
    }

    #[test]
    fn message_object_key_order_matches_spec() {
        let banner = sample_banner();
        let ctx = MessageContext {
            banner: &banner,
            slot: 0,
            device_audio_groups: &["lobby".to_string()],
            resolved_audio_groups: &["lobby".to_string()],
            camera_stream_url: None,
            gender: "f",
        };
        let value = render_message(&ctx);
        let obj = value.as_object().unwrap();
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "signseqnum",
                "dbb_rec_dtsec",
                "recno_zx",
                "recno_template",
                "dbb_duration",
                "msgtype",
                "msgtext",
                "msgdetails",
                "dsi_audio_group_name",
                "dbb_audio_groups",
                "dbb_playtime_duration",
                "dbb_flasher_duration",
                "dbb_light_signal",
                "dbb_light_duration",
                "dbb_audio_tts_gain",
                "dbb_flash_new_message",
                "dbb_visible_time",
                "dbb_visible_frequency",
                "dbb_visible_duration",
                "dbb_record_voice_at_launch_selection",
                "dbb_record_voice_at_launch",
                "dbb_audio_recorded_gain",
                "dbb_pa_delivery_mode",
                "dbb_audio_repeat",
                "dbb_speed",
                "dbb_priority",
                "dbb_expire_priority",
                "dbb_priority_duration",
                "multimediatype",
                "dbb_multimedia_audio_gain",
                "webpageurl",
                "dbb_launch_pin",
                "dss_gender",
            ]
        );
        assert_eq!(obj["recno_zx"], Value::from("345"));
        assert_eq!(obj["webpageurl"], Value::from("FALSE"));
    }

    #[test]
    fn new_message_selects_purpose_and_wraps_single_message() {
        let banner = sample_banner();
        let hardware = HardwareRecordView {
            record_number: 363,
            device_id: "appliance-363".into(),
            address: banner_protocol::AddressConfig::Fixed("10.0.0.1".into()),
            password: "secret".into(),
            ip_method_configured: "DHCP".into(),
            audio_group_memberships: vec!["lobby".into()],
        };
        let ctx = MessageContext {
            banner: &banner,
            slot: 0,
            device_audio_groups: &["lobby".to_string()],
            resolved_audio_groups: &["lobby".to_string()],
            camera_stream_url: None,
            gender: "f",
        };
        let value = new_message("secret", &hardware, &ctx);
        assert_eq!(value["bannerpurpose"], Value::from("newscrollingmessage"));
        assert_eq!(value["hardware_recno"], Value::from(363));
        assert_eq!(value["bannermessages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn stop_message_body_matches_spec() {
        let value = stop_message("secret", 346);
        assert_eq!(value["bannerpurpose"], Value::from("stopscrollingmessage"));
        assert_eq!(value["recno_zx"], Value::from("346"));
    }

    #[test]
    fn clear_sign_body_has_no_extra_fields() {
        let value = clear_sign("secret");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn sequence_number_body_enumerates_messages_in_order() {
        let banner = sample_banner();
        let ctx = MessageContext {
            banner: &banner,
            slot: 1,
            device_audio_groups: &[],
            resolved_audio_groups: &[],
            camera_stream_url: None,
            gender: "",
        };
        let value = sequence_number("secret", "AB", std::slice::from_ref(&ctx));
        assert_eq!(value["bannerpurpose"], Value::from("updateseq"));
        assert_eq!(value["bannermessages"].as_array().unwrap().len(), 1);
    }
}
