//! Interfaces to the record-oriented external database.
//!
//! The real database (entity records keyed by record number) is an external
//! collaborator, out of scope for this workspace — it is accessed only
//! through the traits below. [`SqliteFixtureDb`] is a SQLite-backed stand-in
//! used by tests and by the `cgi`/`dispatcher` binaries in lieu of the
//! production client, the way the receiver crate stands in a local SQLite
//! store for data a real deployment would source from a sync server.

use banner_protocol::{AddressConfig, AudioGroupSelector, BannerRecordView, HardwareRecordView, MultimediaType, StaffRecordView};
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record is malformed: {0}")]
    MalformedRow(String),
    #[error("db-init")]
    Init,
}

pub type DbResult<T> = Result<T, DbError>;

/// Read access to launched message ("banner") records.
pub trait BannerDb: Send + Sync {
    fn lookup_banner(&self, recno_zx: i64) -> DbResult<Option<BannerRecordView>>;
}

/// Read/write access to device hardware records.
pub trait HardwareDb: Send + Sync {
    fn lookup_hardware(&self, record_number: i64) -> DbResult<Option<HardwareRecordView>>;
    fn lookup_hardware_by_device_id(&self, device_id: &str) -> DbResult<Option<HardwareRecordView>>;
    /// All appliance hardware, in device-kind order (spec 4.B: transport and
    /// IO devices load before appliance devices so transport resources
    /// exist first).
    fn list_hardware_in_kind_order(&self) -> DbResult<Vec<HardwareRecordView>>;
    fn update_network_info(&self, record_number: i64, ip_address: &str) -> DbResult<()>;
}

/// Read access to the launcher staff directory, keyed by PIN.
pub trait StaffDb: Send + Sync {
    fn lookup_staff_by_pin(&self, pin: &str) -> DbResult<Option<StaffRecordView>>;
}

/// Resolution of the `multiple`/`choose` audio-group literals (spec 4.D) via
/// the template's options record or the launch's multi-audio list.
pub trait OptionsDb: Send + Sync {
    fn resolve_multiple_audio_groups(&self, template_recno: i64) -> DbResult<Vec<String>>;

    /// The "chosen" audio-group path. The source carries this as a
    /// commented-out, unfinished alternative (design note: treat as a
    /// deliberate gap). Implementations must return
    /// `DbError::MalformedRow` with the literal marker below rather than
    /// inventing a resolution.
    fn resolve_chosen_audio_groups(&self, banner_recno: i64) -> DbResult<Vec<String>>;
}

/// Marker message for the deliberately unsupported "chosen audio groups"
/// path (design note: "do not guess").
pub const CHOSEN_AUDIO_GROUPS_UNSUPPORTED: &str = "chosen-audio-groups path is not implemented upstream";

/// A single SQLite-backed stand-in implementing all four collaborator
/// traits, used by tests and by the binaries in this workspace.
pub struct SqliteFixtureDb {
    conn: Connection,
}

impl SqliteFixtureDb {
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(SqliteFixtureDb { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(SqliteFixtureDb { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn apply_pragmas(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn multimedia_type_from_text(s: &str) -> Option<MultimediaType> {
    Some(match s {
        "Video" => MultimediaType::Video,
        "VideoStretched" => MultimediaType::VideoStretched,
        "VideoZoom1" => MultimediaType::VideoZoom1,
        "VideoZoom2" => MultimediaType::VideoZoom2,
        "Webpage" => MultimediaType::Webpage,
        "WebMedia" => MultimediaType::WebMedia,
        "LocationsDisplay" => MultimediaType::LocationsDisplay,
        "GeoLocationsMap" => MultimediaType::GeoLocationsMap,
        "None" => MultimediaType::None,
        "Message" => MultimediaType::Message,
        "MessageFullScreen" => MultimediaType::MessageFullScreen,
        _ => return None,
    })
}

impl BannerDb for SqliteFixtureDb {
    fn lookup_banner(&self, recno_zx: i64) -> DbResult<Option<BannerRecordView>> {
        let row = self.conn.query_row(
            "SELECT recno_zx, recno_template, launch_timestamp, duration, kind_code, text,
                    details, audio_group_kind, audio_group_name, playtime_duration,
                    flasher_duration, light_signal, light_duration, audio_tts_gain,
                    flash_new_message, visible_time, visible_frequency, visible_duration,
                    record_voice_at_launch_selection, record_voice_at_launch,
                    audio_recorded_gain, pa_delivery_mode, audio_repeat, speed, priority,
                    expire_priority, priority_duration, multimedia_type,
                    multimedia_audio_gain, show_camera, camera_device_id, webpage_or_video,
                    launch_pin
             FROM banners WHERE recno_zx = ?1",
            params![recno_zx],
            |row| {
                let audio_group_kind: String = row.get(7)?;
                let audio_group_name: Option<String> = row.get(8)?;
                let multimedia_type_text: String = row.get(27)?;
                let show_camera: i64 = row.get(29)?;
                Ok((
                    audio_group_kind,
                    audio_group_name,
                    multimedia_type_text,
                    show_camera,
                    BannerRecordViewRaw {
                        recno_zx: row.get(0)?,
                        recno_template: row.get(1)?,
                        launch_timestamp: row.get(2)?,
                        duration: row.get(3)?,
                        kind_code: row.get(4)?,
                        text: row.get(5)?,
                        details: row.get(6)?,
                        playtime_duration: row.get(9)?,
                        flasher_duration: row.get(10)?,
                        light_signal: row.get(11)?,
                        light_duration: row.get(12)?,
                        audio_tts_gain: row.get(13)?,
                        flash_new_message: row.get(14)?,
                        visible_time: row.get(15)?,
                        visible_frequency: row.get(16)?,
                        visible_duration: row.get(17)?,
                        record_voice_at_launch_selection: row.get(18)?,
                        record_voice_at_launch: row.get(19)?,
                        audio_recorded_gain: row.get(20)?,
                        pa_delivery_mode: row.get(21)?,
                        audio_repeat: row.get(22)?,
                        speed: row.get(23)?,
                        priority: row.get(24)?,
                        expire_priority: row.get(25)?,
                        priority_duration: row.get(26)?,
                        multimedia_audio_gain: row.get(28)?,
                        camera_device_id: row.get(30)?,
                        webpage_or_video: row.get(31)?,
                        launch_pin: row.get(32)?,
                    },
                ))
            },
        );

        let (audio_group_kind, audio_group_name, multimedia_type_text, show_camera, raw) = match row
        {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let audio_group = match audio_group_kind.as_str() {
            "multiple" => AudioGroupSelector::Multiple,
            "choose" => AudioGroupSelector::Choose,
            "named" => AudioGroupSelector::Named(
                audio_group_name
                    .ok_or_else(|| DbError::MalformedRow("named audio group with no name".into()))?,
            ),
            other => return Err(DbError::MalformedRow(format!("audio_group_kind {other}"))),
        };
        let multimedia_type = multimedia_type_from_text(&multimedia_type_text)
            .ok_or_else(|| DbError::MalformedRow(format!("multimedia_type {multimedia_type_text}")))?;

        Ok(Some(BannerRecordView {
            recno_zx: raw.recno_zx,
            recno_template: raw.recno_template,
            launch_timestamp: raw.launch_timestamp,
            duration: raw.duration,
            kind_code: raw.kind_code,
            text: raw.text,
            details: raw.details,
            audio_group,
            playtime_duration: raw.playtime_duration,
            flasher_duration: raw.flasher_duration,
            light_signal: raw.light_signal,
            light_duration: raw.light_duration,
            audio_tts_gain: raw.audio_tts_gain,
            flash_new_message: raw.flash_new_message,
            visible_time: raw.visible_time,
            visible_frequency: raw.visible_frequency,
            visible_duration: raw.visible_duration,
            record_voice_at_launch_selection: raw.record_voice_at_launch_selection,
            record_voice_at_launch: raw.record_voice_at_launch,
            audio_recorded_gain: raw.audio_recorded_gain,
            pa_delivery_mode: raw.pa_delivery_mode,
            audio_repeat: raw.audio_repeat,
            speed: raw.speed,
            priority: raw.priority,
            expire_priority: raw.expire_priority,
            priority_duration: raw.priority_duration,
            multimedia_type,
            multimedia_audio_gain: raw.multimedia_audio_gain,
            show_camera: show_camera != 0,
            camera_device_id: raw.camera_device_id,
            webpage_or_video: raw.webpage_or_video,
            launch_pin: raw.launch_pin,
        }))
    }
}

/// Scratch struct to carry the plain-typed columns while the two text-coded
/// fields (`audio_group`, `multimedia_type`) are decoded separately above.
struct BannerRecordViewRaw {
    recno_zx: i64,
    recno_template: i64,
    launch_timestamp: i64,
    duration: i64,
    kind_code: String,
    text: String,
    details: String,
    playtime_duration: i64,
    flasher_duration: i64,
    light_signal: String,
    light_duration: i64,
    audio_tts_gain: i64,
    flash_new_message: String,
    visible_time: String,
    visible_frequency: String,
    visible_duration: String,
    record_voice_at_launch_selection: i64,
    record_voice_at_launch: String,
    audio_recorded_gain: i64,
    pa_delivery_mode: String,
    audio_repeat: String,
    speed: i64,
    priority: i64,
    expire_priority: i64,
    priority_duration: i64,
    multimedia_audio_gain: i64,
    camera_device_id: Option<String>,
    webpage_or_video: Option<String>,
    launch_pin: String,
}

impl HardwareDb for SqliteFixtureDb {
    fn lookup_hardware(&self, record_number: i64) -> DbResult<Option<HardwareRecordView>> {
        let row = self.conn.query_row(
            "SELECT record_number, device_id, address_kind, address_value, password,
                    ip_method_configured
             FROM hardware WHERE record_number = ?1",
            params![record_number],
            map_hardware_row,
        );
        match row {
            Ok(mut hw) => {
                hw.audio_group_memberships = self.audio_group_memberships(record_number)?;
                Ok(Some(hw))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn lookup_hardware_by_device_id(&self, device_id: &str) -> DbResult<Option<HardwareRecordView>> {
        let row = self.conn.query_row(
            "SELECT record_number, device_id, address_kind, address_value, password,
                    ip_method_configured
             FROM hardware WHERE device_id = ?1",
            params![device_id],
            map_hardware_row,
        );
        match row {
            Ok(mut hw) => {
                hw.audio_group_memberships = self.audio_group_memberships(hw.record_number)?;
                Ok(Some(hw))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_hardware_in_kind_order(&self) -> DbResult<Vec<HardwareRecordView>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_number, device_id, address_kind, address_value, password,
                    ip_method_configured
             FROM hardware ORDER BY kind_order ASC, record_number ASC",
        )?;
        let rows = stmt.query_map([], map_hardware_row)?;
        let mut out = Vec::new();
        for r in rows {
            let mut hw = r?;
            hw.audio_group_memberships = self.audio_group_memberships(hw.record_number)?;
            out.push(hw);
        }
        Ok(out)
    }

    fn update_network_info(&self, record_number: i64, ip_address: &str) -> DbResult<()> {
        let changed = self.conn.execute(
            "UPDATE hardware SET address_kind = 'fixed', address_value = ?2 WHERE record_number = ?1",
            params![record_number, ip_address],
        )?;
        if changed == 0 {
            return Err(DbError::MalformedRow(format!(
                "no hardware record {record_number}"
            )));
        }
        Ok(())
    }
}

impl SqliteFixtureDb {
    fn audio_group_memberships(&self, record_number: i64) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT group_name FROM hardware_audio_groups WHERE record_number = ?1 ORDER BY group_name")?;
        let rows = stmt.query_map(params![record_number], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn map_hardware_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HardwareRecordView> {
    let address_kind: String = row.get(2)?;
    let address_value: Option<String> = row.get(3)?;
    let address = if address_kind == "auto" {
        AddressConfig::Auto
    } else {
        AddressConfig::Fixed(address_value.unwrap_or_default())
    };
    Ok(HardwareRecordView {
        record_number: row.get(0)?,
        device_id: row.get(1)?,
        address,
        password: row.get(4)?,
        ip_method_configured: row.get(5)?,
        audio_group_memberships: Vec::new(),
    })
}

impl StaffDb for SqliteFixtureDb {
    fn lookup_staff_by_pin(&self, pin: &str) -> DbResult<Option<StaffRecordView>> {
        let row = self.conn.query_row(
            "SELECT gender FROM staff WHERE pin = ?1",
            params![pin],
            |row| Ok(StaffRecordView { gender: row.get(0)? }),
        );
        match row {
            Ok(staff) => Ok(Some(staff)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl OptionsDb for SqliteFixtureDb {
    fn resolve_multiple_audio_groups(&self, template_recno: i64) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT group_name FROM options_audio_groups WHERE template_recno = ?1 ORDER BY group_name")?;
        let rows = stmt.query_map(params![template_recno], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn resolve_chosen_audio_groups(&self, _banner_recno: i64) -> DbResult<Vec<String>> {
        Err(DbError::MalformedRow(CHOSEN_AUDIO_GROUPS_UNSUPPORTED.to_string()))
    }
}
