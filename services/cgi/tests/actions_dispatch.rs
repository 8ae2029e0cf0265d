/// Exercises the CGI action dispatch table against a real queue + database
/// + journal, the way a request from the host web server would (spec.md
/// 4.H).
use banner_cgi::{actions, config, form};
use banner_db::SqliteFixtureDb;
use banner_protocol::{CommandEnvelope, CommandType, Flag, OperationKind, Role};
use banner_queue::Queue;
use std::path::PathBuf;

fn test_config(dir: &std::path::Path) -> config::Config {
    config::Config {
        queue_path: dir.join("wtc.sqlite3").to_string_lossy().into_owned(),
        db_path: dir.join("fixture.sqlite3").to_string_lossy().into_owned(),
        journal_dir: dir.to_string_lossy().into_owned(),
    }
}

#[test]
fn unknown_action_is_byte_for_byte_no_command_found() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let fields = form::parse("someOtherAction=1&devicerecno=363");
    assert_eq!(actions::dispatch(&cfg, &fields), "No command found\n");
}

#[test]
fn active_messages_for_device_reflects_the_journal_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let journal = banner_journal::Journal::new(PathBuf::from(&cfg.journal_dir).join("363.jsonl"));
    journal
        .append(&serde_json::json!({"signseqnum": 0, "dbb_rec_dtsec": 1000, "recno_zx": "345"}))
        .unwrap();

    let fields = form::parse("evolutionGetActiveMessagesForDevice=1&devicerecno=363");
    let body = actions::dispatch(&cfg, &fields);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    let msgs = parsed["evolution_active_msgs"].as_array().unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["recno_zx"], serde_json::Value::from("345"));
}

#[test]
fn recnos_only_round_trips_through_the_queue_against_a_dispatcher_stub() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());

    // Simulate the dispatcher side of the round-trip directly against the
    // same on-disk queue the CGI action opens, since this test exercises
    // only the CGI endpoint's half of the protocol.
    let mut queue = Queue::open(std::path::Path::new(&cfg.queue_path)).unwrap();
    std::thread::spawn(move || {
        // Wait for the request row, then answer with one active message and
        // the terminating sentinel.
        for _ in 0..50 {
            match queue.read(CommandType::ShowSignMessages, Role::Cgi, Role::Dispatcher) {
                Ok(Some(_request)) => {
                    let mut data = make_envelope(345, Some(0), Flag::Data);
                    data.source = Role::Dispatcher;
                    data.destination = Role::Cgi;
                    queue.write(&data).unwrap();

                    let mut sentinel = make_envelope(0, None, Flag::EndOfResponse);
                    sentinel.source = Role::Dispatcher;
                    sentinel.destination = Role::Cgi;
                    queue.write(&sentinel).unwrap();
                    return;
                }
                Ok(None) => std::thread::sleep(std::time::Duration::from_millis(20)),
                Err(e) => panic!("stub dispatcher queue read failed: {e}"),
            }
        }
        panic!("stub dispatcher never observed the show-sign-messages request");
    });

    let fields = form::parse("evolutionGetActiveMessagesForDevice_recnosOnly=1&devicerecno=363");
    let body = actions::dispatch(&cfg, &fields);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    let entries = parsed["activeMessages"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["recno"], serde_json::Value::from("345"));
    assert_eq!(entries[0]["type"], serde_json::Value::from("active"));
}

fn make_envelope(banner_stream_recno: i64, message_type: Option<u8>, flag: Flag) -> CommandEnvelope {
    CommandEnvelope {
        operation: OperationKind::Read,
        command_type: CommandType::ShowSignMessages,
        source: Role::Dispatcher,
        destination: Role::Cgi,
        origin_pid: 0,
        hardware_recno: 363,
        banner_stream_recno,
        parent_template_recno: 0,
        sequence: Vec::new(),
        message_buffer: String::new(),
        return_node: String::new(),
        flag,
        seq_change_op: 0,
        message_type,
    }
}

#[test]
fn report_network_info_updates_fixed_address_and_writes_hardware_update_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let db = SqliteFixtureDb::open(std::path::Path::new(&cfg.db_path)).unwrap();
    db.connection()
        .execute_batch(
            "INSERT INTO hardware (record_number, device_id, address_kind, address_value, password, ip_method_configured, kind_order)
             VALUES (363, 'appliance-363', 'fixed', '192.168.1.50', 'secret', 'DHCP', 10);",
        )
        .unwrap();
    drop(db);

    let fields = form::parse(
        "evolutionReportNetworkInfo=1&devicerecno=363&ipMethodConfig=DHCP&ipMethodCurrent=DHCP&ipAddress=192.168.1.229",
    );
    let response = actions::dispatch(&cfg, &fields);
    assert_eq!(response, "Hardware record network info updated");

    let mut queue = Queue::open(std::path::Path::new(&cfg.queue_path)).unwrap();
    let env = queue
        .read(CommandType::HardwareUpdate, Role::Hardware, Role::Dispatcher)
        .unwrap()
        .expect("hardware-update envelope should have been queued");
    assert_eq!(env.hardware_recno, 363);
}

#[test]
fn report_network_info_is_a_noop_when_address_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let db = SqliteFixtureDb::open(std::path::Path::new(&cfg.db_path)).unwrap();
    db.connection()
        .execute_batch(
            "INSERT INTO hardware (record_number, device_id, address_kind, address_value, password, ip_method_configured, kind_order)
             VALUES (363, 'appliance-363', 'fixed', '192.168.1.50', 'secret', 'DHCP', 10);",
        )
        .unwrap();
    drop(db);

    let fields = form::parse(
        "evolutionReportNetworkInfo=1&devicerecno=363&ipMethodConfig=DHCP&ipMethodCurrent=DHCP&ipAddress=192.168.1.50",
    );
    let response = actions::dispatch(&cfg, &fields);
    assert_eq!(response, "Hardware record network info not changed");
}
