//! The device registry (spec 4.B): an in-memory table keyed by device
//! record number, built at startup from the database in device-kind order
//! so transport resources exist before the appliance devices that depend on
//! them. Rebuilt per-process; cross-process invalidation rides on
//! `hardware-update` envelopes (spec 5).

use crate::slot::SlotTable;
use banner_db::HardwareDb;
use banner_protocol::AddressConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Active,
    Closed,
}

/// The mutable state a device's own dispatcher worker owns exclusively:
/// slot contents, connection status, and the address-lease hint.
pub struct DeviceState {
    pub address: AddressConfig,
    /// Whether `address` was learned from a sibling subsystem rather than
    /// configured; an error on an "auto" address clears the learned value
    /// so the next probe re-acquires it (spec 4.B).
    pub address_is_learned: bool,
    pub connection_status: ConnectionStatus,
    pub slots: SlotTable,
    /// Maps a sequence-identifier byte (assigned when a message is
    /// launched via a new-message envelope's single-byte `sequence` field)
    /// to the `recno_zx` it was launched with. A later sequence-change
    /// envelope's multi-byte string references these tags positionally:
    /// the byte at string position *i* names which tagged message occupies
    /// slot *i*.
    pub recno_tags: HashMap<u8, i64>,
}

impl DeviceState {
    fn new(address: AddressConfig, slot_capacity: usize) -> Self {
        let address_is_learned = matches!(address, AddressConfig::Auto);
        DeviceState {
            address,
            address_is_learned,
            connection_status: ConnectionStatus::Closed,
            slots: SlotTable::new(slot_capacity),
            recno_tags: HashMap::new(),
        }
    }

    /// Clear a learned address hint after a transport failure, per spec
    /// 4.B/4.E. No-op if the address was explicitly configured.
    pub fn clear_learned_address(&mut self) {
        if self.address_is_learned {
            self.address = AddressConfig::Auto;
        }
    }
}

pub struct DeviceEntry {
    pub record_number: i64,
    pub device_id: String,
    pub password: String,
    pub ip_method_configured: String,
    pub audio_group_memberships: Vec<String>,
    pub state: Mutex<DeviceState>,
}

#[derive(Debug)]
pub enum RegistryError {
    Db(banner_db::DbError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Db(e) => write!(f, "registry build failed: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<banner_db::DbError> for RegistryError {
    fn from(e: banner_db::DbError) -> Self {
        RegistryError::Db(e)
    }
}

/// The device registry. Built once per dispatcher process at startup (and
/// refreshed entry-by-entry on `hardware-update`).
pub struct DeviceRegistry {
    by_recno: RwLock<HashMap<i64, Arc<DeviceEntry>>>,
    by_device_id: RwLock<HashMap<String, i64>>,
    /// Device-kind load order, snapshotted at build time so the supervisor
    /// spawns workers in the order spec 4.B/4.I requires.
    kind_order: RwLock<Vec<i64>>,
    slot_capacity: usize,
}

impl DeviceRegistry {
    /// Build the registry from the hardware table, preserving the order
    /// `HardwareDb::list_hardware_in_kind_order` returns.
    pub fn build(db: &dyn HardwareDb, slot_capacity: usize) -> Result<Self, RegistryError> {
        let hardware = db.list_hardware_in_kind_order()?;
        let mut by_recno = HashMap::with_capacity(hardware.len());
        let mut by_device_id = HashMap::with_capacity(hardware.len());
        let mut kind_order = Vec::with_capacity(hardware.len());

        for hw in hardware {
            kind_order.push(hw.record_number);
            by_device_id.insert(hw.device_id.clone(), hw.record_number);
            by_recno.insert(
                hw.record_number,
                Arc::new(DeviceEntry {
                    record_number: hw.record_number,
                    device_id: hw.device_id,
                    password: hw.password,
                    ip_method_configured: hw.ip_method_configured,
                    audio_group_memberships: hw.audio_group_memberships,
                    state: Mutex::new(DeviceState::new(hw.address, slot_capacity)),
                }),
            );
        }

        Ok(DeviceRegistry {
            by_recno: RwLock::new(by_recno),
            by_device_id: RwLock::new(by_device_id),
            kind_order: RwLock::new(kind_order),
            slot_capacity,
        })
    }

    pub async fn lookup(&self, record_number: i64) -> Option<Arc<DeviceEntry>> {
        self.by_recno.read().await.get(&record_number).cloned()
    }

    pub async fn lookup_by_device_id(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let recno = *self.by_device_id.read().await.get(device_id)?;
        self.lookup(recno).await
    }

    /// The device-kind spawn order captured at build time.
    pub async fn kind_order(&self) -> Vec<i64> {
        self.kind_order.read().await.clone()
    }

    /// Replace (or insert) a device entry from a fresh hardware view,
    /// applied on a `hardware-update` / `appliance-sync` envelope. Slot
    /// state does not survive a rebuild of its own entry today — the
    /// dispatcher worker re-renders its current snapshot immediately after
    /// (spec 4.F), which repopulates slots from its own in-flight state.
    pub async fn refresh(&self, hw: banner_protocol::HardwareRecordView) {
        let mut by_recno = self.by_recno.write().await;
        let mut by_device_id = self.by_device_id.write().await;

        let previous_slots = match by_recno.get(&hw.record_number) {
            Some(existing) => {
                let state = existing.state.lock().await;
                Some((state.slots.clone(), state.recno_tags.clone()))
            }
            None => None,
        };

        by_device_id.insert(hw.device_id.clone(), hw.record_number);
        let mut state = DeviceState::new(hw.address, self.slot_capacity);
        if let Some((slots, recno_tags)) = previous_slots {
            state.slots = slots;
            state.recno_tags = recno_tags;
        }
        by_recno.insert(
            hw.record_number,
            Arc::new(DeviceEntry {
                record_number: hw.record_number,
                device_id: hw.device_id,
                password: hw.password,
                ip_method_configured: hw.ip_method_configured,
                audio_group_memberships: hw.audio_group_memberships,
                state: Mutex::new(state),
            }),
        );
        if !self.kind_order.read().await.contains(&hw.record_number) {
            self.kind_order.write().await.push(hw.record_number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banner_db::SqliteFixtureDb;

    fn seeded_db() -> SqliteFixtureDb {
        let db = SqliteFixtureDb::open_in_memory().unwrap();
        db.connection()
            .execute_batch(
                "INSERT INTO hardware (record_number, device_id, address_kind, address_value, password, ip_method_configured, kind_order)
                 VALUES (363, 'appliance-363', 'fixed', '192.168.1.50', 'secret', 'DHCP', 10);
                 INSERT INTO hardware (record_number, device_id, address_kind, address_value, password, ip_method_configured, kind_order)
                 VALUES (364, 'appliance-364', 'auto', NULL, 'secret2', 'Static', 20);",
            )
            .unwrap();
        db
    }

    #[tokio::test]
    async fn build_preserves_kind_order() {
        let db = seeded_db();
        let registry = DeviceRegistry::build(&db, 26).unwrap();
        assert_eq!(registry.kind_order().await, vec![363, 364]);
    }

    #[tokio::test]
    async fn lookup_by_device_id_matches_lookup_by_recno() {
        let db = seeded_db();
        let registry = DeviceRegistry::build(&db, 26).unwrap();
        let by_id = registry.lookup_by_device_id("appliance-363").await.unwrap();
        let by_recno = registry.lookup(363).await.unwrap();
        assert_eq!(by_id.record_number, by_recno.record_number);
    }

    #[tokio::test]
    async fn auto_address_starts_learned() {
        let db = seeded_db();
        let registry = DeviceRegistry::build(&db, 26).unwrap();
        let entry = registry.lookup(364).await.unwrap();
        let state = entry.state.lock().await;
        assert!(state.address_is_learned);
        assert_eq!(state.address, AddressConfig::Auto);
    }

    #[tokio::test]
    async fn clearing_learned_address_is_a_noop_for_fixed_addresses() {
        let db = seeded_db();
        let registry = DeviceRegistry::build(&db, 26).unwrap();
        let entry = registry.lookup(363).await.unwrap();
        let mut state = entry.state.lock().await;
        state.clear_learned_address();
        assert_eq!(state.address, AddressConfig::Fixed("192.168.1.50".into()));
    }
}
