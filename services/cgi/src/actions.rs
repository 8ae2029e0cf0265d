//! The five CGI actions plus the unknown-action fallback (spec.md 4.H).

use crate::{config, form};
use banner_db::{HardwareDb, SqliteFixtureDb};
use banner_journal::Journal;
use banner_protocol::{CommandEnvelope, CommandType, Flag, OperationKind, Role};
use banner_queue::Queue;
use banner_translator::{render_message, MessageContext};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ROUND_TRIP_MAX_ATTEMPTS: u32 = 50;
const ROUND_TRIP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn dispatch(cfg: &config::Config, fields: &[(String, String)]) -> String {
    if let Some(devicerecno) = prefixed(fields, "evolutionGetActiveMessagesForDevice_recnosOnly") {
        return action_active_messages_recnos_only(cfg, devicerecno);
    }
    if let Some(devicerecno) = prefixed(fields, "evolutionGetActiveMessagesForDevice_countsOnly") {
        return action_active_messages_counts_only(cfg, devicerecno);
    }
    if let Some(devicerecno) = prefixed(fields, "evolutionGetActiveMessagesForDevice") {
        return action_active_messages(cfg, devicerecno);
    }
    if prefixed(fields, "evolutionGetMessageDataForRecnoZX").is_some() {
        return action_message_data_for_recno(cfg, fields);
    }
    if prefixed(fields, "evolutionReportNetworkInfo").is_some() {
        return action_report_network_info(cfg, fields);
    }
    "No command found\n".to_owned()
}

/// Matches a key by the exact prefix used in spec.md 4.H's action names
/// (the source matches `strncmp` against the key including its `=`).
fn prefixed<'a>(fields: &'a [(String, String)], action: &str) -> Option<&'a str> {
    form::field(fields, "devicerecno").filter(|_| fields.iter().any(|(k, _)| k == action))
}

fn action_active_messages(cfg: &config::Config, devicerecno: &str) -> String {
    let path = journal_path(cfg, devicerecno);
    let journal = Journal::new(path);
    match journal.read_all() {
        Ok(lines) => serde_json::json!({ "evolution_active_msgs": lines }).to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "journal-io: failed to read journal");
            String::new()
        }
    }
}

fn journal_path(cfg: &config::Config, devicerecno: &str) -> PathBuf {
    Path::new(&cfg.journal_dir).join(format!("{devicerecno}.jsonl"))
}

/// Classification collected from one `show-sign-messages` round-trip.
struct ActiveMessage {
    recno: i64,
    label: &'static str,
}

fn round_trip_show_sign_messages(cfg: &config::Config, devicerecno: &str) -> Result<Vec<ActiveMessage>, String> {
    let hw_recno: i64 = devicerecno.trim().parse().map_err(|_| "bad-form-input: devicerecno".to_owned())?;

    let mut queue = Queue::open(Path::new(&cfg.queue_path)).map_err(|_| "Database initialization error".to_owned())?;

    let request = CommandEnvelope {
        operation: OperationKind::Read,
        command_type: CommandType::ShowSignMessages,
        source: Role::Cgi,
        destination: Role::Dispatcher,
        origin_pid: std::process::id(),
        hardware_recno: hw_recno,
        banner_stream_recno: 0,
        parent_template_recno: 0,
        sequence: Vec::new(),
        message_buffer: String::new(),
        return_node: String::new(),
        flag: Flag::Data,
        seq_change_op: 0,
        message_type: None,
    };
    if queue.write(&request).is_err() {
        return Err("WTC command failed to write.".to_owned());
    }

    let mut messages = Vec::new();
    for _ in 0..ROUND_TRIP_MAX_ATTEMPTS {
        match queue.read(CommandType::ShowSignMessages, Role::Dispatcher, Role::Cgi) {
            Ok(Some(env)) => {
                if env.flag.is_sentinel() {
                    return Ok(messages);
                }
                messages.push(ActiveMessage { recno: env.banner_stream_recno, label: env.message_type_label() });
            }
            Ok(None) => std::thread::sleep(ROUND_TRIP_POLL_INTERVAL),
            Err(_) => return Err("Database initialization error".to_owned()),
        }
    }
    Ok(messages)
}

fn action_active_messages_recnos_only(cfg: &config::Config, devicerecno: &str) -> String {
    match round_trip_show_sign_messages(cfg, devicerecno) {
        Ok(messages) => {
            let entries: Vec<_> = messages
                .iter()
                .map(|m| serde_json::json!({ "recno": m.recno.to_string(), "type": m.label }))
                .collect();
            serde_json::json!({ "hwRecno": devicerecno, "activeMessages": entries }).to_string()
        }
        Err(s) => s,
    }
}

fn action_active_messages_counts_only(cfg: &config::Config, devicerecno: &str) -> String {
    match round_trip_show_sign_messages(cfg, devicerecno) {
        Ok(messages) => {
            let active = messages.iter().filter(|m| m.label == "active").count();
            let waiting = messages.iter().filter(|m| m.label == "waiting").count();
            let hidden = messages.iter().filter(|m| m.label == "hidden").count();
            serde_json::json!({
                "active_messages": active,
                "active_messages_waiting": waiting,
                "active_messages_hidden": hidden,
            })
            .to_string()
        }
        Err(s) => s,
    }
}

fn action_message_data_for_recno(cfg: &config::Config, fields: &[(String, String)]) -> String {
    let Some(msgrecno) = form::field(fields, "msgrecno") else {
        return "bad-form-input: msgrecno".to_owned();
    };
    let Ok(recno) = msgrecno.trim().parse::<i64>() else {
        return "bad-form-input: msgrecno".to_owned();
    };

    let db = match SqliteFixtureDb::open(Path::new(&cfg.db_path)) {
        Ok(db) => db,
        Err(_) => return "Database initialization error".to_owned(),
    };
    let banner = match banner_db::BannerDb::lookup_banner(&db, recno) {
        Ok(Some(b)) => b,
        Ok(None) => return "Database initialization error".to_owned(),
        Err(_) => return "Database initialization error".to_owned(),
    };

    let resolved_audio_groups = match &banner.audio_group {
        banner_protocol::AudioGroupSelector::Named(name) => vec![name.clone()],
        banner_protocol::AudioGroupSelector::Multiple => {
            banner_db::OptionsDb::resolve_multiple_audio_groups(&db, banner.recno_template).unwrap_or_default()
        }
        banner_protocol::AudioGroupSelector::Choose => {
            banner_db::OptionsDb::resolve_chosen_audio_groups(&db, banner.recno_zx).unwrap_or_default()
        }
    };
    let gender = banner_db::StaffDb::lookup_staff_by_pin(&db, &banner.launch_pin)
        .ok()
        .flatten()
        .map(|s| s.gender)
        .unwrap_or_default();

    let ctx = MessageContext {
        banner: &banner,
        slot: 0,
        device_audio_groups: &[],
        resolved_audio_groups: &resolved_audio_groups,
        camera_stream_url: None,
        gender: &gender,
    };
    render_message(&ctx).to_string()
}

fn action_report_network_info(cfg: &config::Config, fields: &[(String, String)]) -> String {
    let Some(devicerecno) = form::field(fields, "devicerecno") else {
        return "bad-form-input: devicerecno".to_owned();
    };
    let Ok(hw_recno) = devicerecno.trim().parse::<i64>() else {
        return "bad-form-input: devicerecno".to_owned();
    };
    let ip_method_config = form::field(fields, "ipMethodConfig").unwrap_or("");
    let ip_method_current = form::field(fields, "ipMethodCurrent").unwrap_or("");
    let ip_address = form::field(fields, "ipAddress").unwrap_or("");

    let db = match SqliteFixtureDb::open(Path::new(&cfg.db_path)) {
        Ok(db) => db,
        Err(_) => return "Database initialization error".to_owned(),
    };

    let hw = match db.lookup_hardware(hw_recno) {
        Ok(Some(hw)) => hw,
        Ok(None) => return "Could not set currency".to_owned(),
        Err(_) => return "Database initialization error".to_owned(),
    };

    let configured_as_dhcp = ip_method_config.eq_ignore_ascii_case("DHCP") || ip_method_current.eq_ignore_ascii_case("DHCP");
    let stored_ip = match &hw.address {
        banner_protocol::AddressConfig::Fixed(ip) => ip.clone(),
        banner_protocol::AddressConfig::Auto => String::new(),
    };

    if stored_ip == ip_address || !configured_as_dhcp {
        return "Hardware record network info not changed".to_owned();
    }

    match db.update_network_info(hw_recno, ip_address) {
        Ok(()) => {
            let mut queue = match Queue::open(Path::new(&cfg.queue_path)) {
                Ok(q) => q,
                Err(_) => return "Hardware record network info updated".to_owned(),
            };
            let env = CommandEnvelope {
                operation: OperationKind::Write,
                command_type: CommandType::HardwareUpdate,
                source: Role::Hardware,
                destination: Role::Dispatcher,
                origin_pid: std::process::id(),
                hardware_recno: hw_recno,
                banner_stream_recno: 0,
                parent_template_recno: 0,
                sequence: Vec::new(),
                message_buffer: String::new(),
                return_node: String::new(),
                flag: Flag::Data,
                seq_change_op: 0,
                message_type: None,
            };
            if queue.write(&env).is_err() {
                tracing::warn!("queue-write: failed to write hardware-update envelope after network info update");
            }
            "Hardware record network info updated".to_owned()
        }
        Err(_) => "Hardware record network info failed to update".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_returns_exact_no_command_found_string() {
        let cfg = config::Config {
            queue_path: ":memory:".into(),
            db_path: ":memory:".into(),
            journal_dir: "/tmp".into(),
        };
        let fields = form::parse("foo=1");
        assert_eq!(dispatch(&cfg, &fields), "No command found\n");
    }

    #[test]
    fn active_messages_reads_journal_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::Config {
            queue_path: ":memory:".into(),
            db_path: ":memory:".into(),
            journal_dir: dir.path().to_string_lossy().into_owned(),
        };
        let journal = Journal::new(dir.path().join("363.jsonl"));
        journal.append(&serde_json::json!({"recno_zx": "345"})).unwrap();

        let body = action_active_messages(&cfg, "363");
        assert!(body.contains("evolution_active_msgs"));
        assert!(body.contains("345"));
    }

    #[test]
    fn active_messages_on_missing_journal_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::Config {
            queue_path: ":memory:".into(),
            db_path: ":memory:".into(),
            journal_dir: dir.path().to_string_lossy().into_owned(),
        };
        let body = action_active_messages(&cfg, "999");
        assert_eq!(body, serde_json::json!({"evolution_active_msgs": Vec::<serde_json::Value>::new()}).to_string());
    }

    #[test]
    fn report_network_info_on_unknown_hardware_returns_could_not_set_currency() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fixture.sqlite3");
        let cfg = config::Config {
            queue_path: dir.path().join("wtc.sqlite3").to_string_lossy().into_owned(),
            db_path: db_path.to_string_lossy().into_owned(),
            journal_dir: dir.path().to_string_lossy().into_owned(),
        };
        SqliteFixtureDb::open(&db_path).unwrap();
        let fields = form::parse("evolutionReportNetworkInfo=1&devicerecno=999&ipMethodConfig=DHCP&ipMethodCurrent=DHCP&ipAddress=10.0.0.1");
        assert_eq!(dispatch(&cfg, &fields), "Could not set currency");
    }
}
