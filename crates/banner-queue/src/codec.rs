//! TEXT encodings for the protocol enums, kept local to the queue crate so
//! `banner-protocol` stays free of a `rusqlite` dependency.

use banner_protocol::{CommandType, Flag, OperationKind, Role};

pub fn operation_to_text(op: OperationKind) -> &'static str {
    match op {
        OperationKind::Write => "write",
        OperationKind::Read => "read",
    }
}

pub fn operation_from_text(s: &str) -> Option<OperationKind> {
    match s {
        "write" => Some(OperationKind::Write),
        "read" => Some(OperationKind::Read),
        _ => None,
    }
}

pub fn command_type_to_text(ct: CommandType) -> &'static str {
    match ct {
        CommandType::NewMessage => "new_message",
        CommandType::ClearSign => "clear_sign",
        CommandType::SequenceChange => "sequence_change",
        CommandType::StopMessage => "stop_message",
        CommandType::ShowSignMessages => "show_sign_messages",
        CommandType::HardwareUpdate => "hardware_update",
        CommandType::ApplianceSync => "appliance_sync",
    }
}

pub fn command_type_from_text(s: &str) -> Option<CommandType> {
    match s {
        "new_message" => Some(CommandType::NewMessage),
        "clear_sign" => Some(CommandType::ClearSign),
        "sequence_change" => Some(CommandType::SequenceChange),
        "stop_message" => Some(CommandType::StopMessage),
        "show_sign_messages" => Some(CommandType::ShowSignMessages),
        "hardware_update" => Some(CommandType::HardwareUpdate),
        "appliance_sync" => Some(CommandType::ApplianceSync),
        _ => None,
    }
}

pub fn role_to_text(role: Role) -> &'static str {
    match role {
        Role::LaunchUi => "launch_ui",
        Role::Sequencer => "sequencer",
        Role::Cgi => "cgi",
        Role::Dispatcher => "dispatcher",
        Role::Hardware => "hardware",
        Role::BannerBoard => "banner_board",
    }
}

pub fn role_from_text(s: &str) -> Option<Role> {
    match s {
        "launch_ui" => Some(Role::LaunchUi),
        "sequencer" => Some(Role::Sequencer),
        "cgi" => Some(Role::Cgi),
        "dispatcher" => Some(Role::Dispatcher),
        "hardware" => Some(Role::Hardware),
        "banner_board" => Some(Role::BannerBoard),
        _ => None,
    }
}

pub fn flag_to_i64(flag: Flag) -> i64 {
    flag as i64
}

pub fn flag_from_i64(v: i64) -> Option<Flag> {
    match v {
        0 => Some(Flag::Data),
        1 => Some(Flag::EndOfResponse),
        2 => Some(Flag::Cancel),
        _ => None,
    }
}
