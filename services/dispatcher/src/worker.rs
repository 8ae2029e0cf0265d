//! Per-device dispatcher worker (spec 4.F): one Tokio task per device,
//! fed envelopes by the supervisor's queue-poll loop. Mirrors the
//! per-connection state-machine shape of the teacher's forwarder/ws
//! workers, generalized to the event table spec 4.F describes.

use crate::error::DispatchError;
use banner_db::{BannerDb, HardwareDb, OptionsDb, StaffDb};
use banner_journal::Journal;
use banner_protocol::{
    AddressConfig, AudioGroupSelector, BannerRecordView, CommandEnvelope, CommandType, Flag,
    HardwareRecordView, OperationKind, Role,
};
use banner_queue::Queue;
use banner_registry::{DeviceEntry, SlotTable};
use banner_translator::{
    clear_sign, escape_message_text, new_message, sequence_number, stop_message, MessageContext,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// The external-DB collaborator bundle a device worker needs. In this
/// workspace a single `SqliteFixtureDb` implements every trait (spec 4.D's
/// pure-function translator pulls resolved values from the caller).
pub trait DeviceDb: BannerDb + HardwareDb + StaffDb + OptionsDb {}
impl<T: BannerDb + HardwareDb + StaffDb + OptionsDb> DeviceDb for T {}

/// Audio-group resolution and launcher gender, resolved against the
/// external DB once per banner record rendered.
struct ResolvedFields {
    resolved_audio_groups: Vec<String>,
    gender: String,
}

pub struct DeviceWorker<D: DeviceDb> {
    pub entry: Arc<DeviceEntry>,
    pub db: Arc<D>,
    pub journal: Journal,
    pub registry: Arc<banner_registry::DeviceRegistry>,
    /// Shared with the supervisor's poll loop so a worker can write
    /// `show-sign-messages` response rows back for the CGI endpoint to
    /// read (spec.md 4.H's WTC round-trip).
    pub queue: Arc<Mutex<Queue>>,
    pub inbox: mpsc::Receiver<CommandEnvelope>,
}

impl<D: DeviceDb> DeviceWorker<D> {
    /// Runs until the inbox channel closes (supervisor shutdown).
    pub async fn run(mut self) {
        let mut last_new_message_recno: Option<i64> = None;
        while let Some(env) = self.inbox.recv().await {
            let just_dispatched = last_new_message_recno.take();
            if let Err(e) = self.handle(env, just_dispatched, &mut last_new_message_recno).await {
                tracing::warn!(
                    device = self.entry.record_number,
                    error = %e,
                    "dispatcher step failed; envelope consumed"
                );
            }
        }
    }

    async fn handle(
        &self,
        env: CommandEnvelope,
        just_dispatched_new_message_recno: Option<i64>,
        last_new_message_recno: &mut Option<i64>,
    ) -> Result<(), DispatchError> {
        match env.command_type {
            CommandType::NewMessage => self.handle_new_message(&env, last_new_message_recno).await,
            CommandType::SequenceChange => {
                self.handle_sequence_change(&env, just_dispatched_new_message_recno).await
            }
            CommandType::ClearSign => self.handle_clear_sign().await,
            CommandType::StopMessage => self.handle_stop_message(&env).await,
            CommandType::HardwareUpdate | CommandType::ApplianceSync => self.handle_hardware_update(&env).await,
            CommandType::ShowSignMessages => self.handle_show_sign_messages().await,
        }
    }

    fn hardware_view(&self, address: AddressConfig) -> HardwareRecordView {
        HardwareRecordView {
            record_number: self.entry.record_number,
            device_id: self.entry.device_id.clone(),
            address,
            password: self.entry.password.clone(),
            ip_method_configured: self.entry.ip_method_configured.clone(),
            audio_group_memberships: self.entry.audio_group_memberships.clone(),
        }
    }

    fn resolve_fields(&self, banner: &BannerRecordView) -> Result<ResolvedFields, DispatchError> {
        let resolved_audio_groups = match &banner.audio_group {
            AudioGroupSelector::Named(name) => vec![name.clone()],
            AudioGroupSelector::Multiple => self.db.resolve_multiple_audio_groups(banner.recno_template)?,
            AudioGroupSelector::Choose => self.db.resolve_chosen_audio_groups(banner.recno_zx)?,
        };
        let gender = self
            .db
            .lookup_staff_by_pin(&banner.launch_pin)?
            .map(|s| s.gender)
            .unwrap_or_default();
        Ok(ResolvedFields { resolved_audio_groups, gender })
    }

    /// Look up every banner record behind `slots`' populated entries,
    /// paired with its slot index and resolved fields, skipping any whose
    /// record has since disappeared from the external DB.
    fn gather_renderable(
        &self,
        slots: &SlotTable,
    ) -> Result<Vec<(usize, BannerRecordView, ResolvedFields)>, DispatchError> {
        let mut out = Vec::new();
        for (idx, slot) in slots.snapshot() {
            let Some(banner) = self.db.lookup_banner(slot.recno)? else {
                tracing::warn!(device = self.entry.record_number, recno = slot.recno, "sequence re-render: banner record gone");
                continue;
            };
            let resolved = self.resolve_fields(&banner)?;
            out.push((idx, banner, resolved));
        }
        Ok(out)
    }

    fn build_contexts<'a>(
        &self,
        renderable: &'a [(usize, BannerRecordView, ResolvedFields)],
    ) -> Vec<MessageContext<'a>> {
        renderable
            .iter()
            .map(|(idx, banner, resolved)| MessageContext {
                banner,
                slot: *idx,
                device_audio_groups: &self.entry.audio_group_memberships,
                resolved_audio_groups: &resolved.resolved_audio_groups,
                // Camera/RTSP URL resolution is out of scope (spec 1);
                // the translator falls back to the literal "FALSE".
                camera_stream_url: None,
                gender: &resolved.gender,
            })
            .collect()
    }

    async fn handle_new_message(
        &self,
        env: &CommandEnvelope,
        last_new_message_recno: &mut Option<i64>,
    ) -> Result<(), DispatchError> {
        let Some(banner) = self.db.lookup_banner(env.banner_stream_recno)? else {
            tracing::warn!(recno = env.banner_stream_recno, "new-message: banner record not found");
            return Ok(());
        };

        let (slot_index, address) = {
            let state = self.entry.state.lock().await;
            let Some(slot_index) = state.slots.first_free() else {
                tracing::warn!(device = self.entry.record_number, "new-message: no free slot");
                return Ok(());
            };
            (slot_index, state.address.clone())
        };

        let resolved = self.resolve_fields(&banner)?;
        let ctx = MessageContext {
            banner: &banner,
            slot: slot_index,
            device_audio_groups: &self.entry.audio_group_memberships,
            resolved_audio_groups: &resolved.resolved_audio_groups,
            camera_stream_url: None,
            gender: &resolved.gender,
        };
        let hardware = self.hardware_view(address);
        let body = new_message(&self.entry.password, &hardware, &ctx);

        let payload = serde_json::to_vec(&body).unwrap_or_default();
        banner_transport::send_request(&self.entry, &payload).await?;

        {
            let mut state = self.entry.state.lock().await;
            if let Err(e) = state.slots.set(slot_index, banner.recno_zx, escape_message_text(&banner.text)) {
                tracing::error!(device = self.entry.record_number, error = %e, "slot set failed after successful transmit");
            }
            if let Some(tag) = env.sequence.first() {
                state.recno_tags.insert(*tag, banner.recno_zx);
            }
        }

        if let Some(message) = body["bannermessages"].get(0) {
            self.journal.append(message)?;
        }
        *last_new_message_recno = Some(banner.recno_zx);
        Ok(())
    }

    async fn handle_sequence_change(
        &self,
        env: &CommandEnvelope,
        just_dispatched_new_message_recno: Option<i64>,
    ) -> Result<(), DispatchError> {
        let referenced: Vec<i64> = {
            let state = self.entry.state.lock().await;
            env.sequence
                .iter()
                .filter_map(|b| state.recno_tags.get(b).copied())
                .collect()
        };
        if let Some(recno) = just_dispatched_new_message_recno {
            if referenced.contains(&recno) {
                tracing::debug!(device = self.entry.record_number, recno, "sequence-change ignored: new/seq race");
                return Ok(());
            }
        }

        let (old_slots, new_slots, address) = {
            let mut state = self.entry.state.lock().await;
            let old_slots = state.slots.clone();
            let capacity = old_slots.capacity();
            let mut new_slots = SlotTable::new(capacity);
            for (i, tag) in env.sequence.iter().enumerate() {
                if i >= capacity {
                    tracing::warn!(device = self.entry.record_number, "sequence-change string exceeds slot capacity; truncated");
                    break;
                }
                let Some(&recno) = state.recno_tags.get(tag) else {
                    tracing::warn!(device = self.entry.record_number, tag, "sequence-change: untagged byte");
                    continue;
                };
                let text = old_slots
                    .snapshot()
                    .into_iter()
                    .find(|(_, slot)| slot.recno == recno)
                    .map(|(_, slot)| slot.message_text.clone())
                    .unwrap_or_default();
                let _ = new_slots.set(i, recno, text);
            }
            state.slots = new_slots.clone();
            (old_slots, new_slots, state.address.clone())
        };

        let new_recnos = new_slots.populated_recnos();
        for recno in old_slots.populated_recnos() {
            if !new_recnos.contains(&recno) {
                self.journal.remove_by_recno(&recno.to_string())?;
            }
        }

        let renderable = self.gather_renderable(&new_slots)?;
        let contexts = self.build_contexts(&renderable);
        let hardware = self.hardware_view(address);
        let seqstring = String::from_utf8_lossy(&env.sequence).to_string();
        let body = sequence_number(&hardware.password, &seqstring, &contexts);
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        banner_transport::send_request(&self.entry, &payload).await?;
        Ok(())
    }

    async fn handle_clear_sign(&self) -> Result<(), DispatchError> {
        {
            let mut state = self.entry.state.lock().await;
            state.slots.clear_all();
            state.recno_tags.clear();
        }
        let body = clear_sign(&self.entry.password);
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        banner_transport::send_request(&self.entry, &payload).await?;
        self.journal.delete()?;
        Ok(())
    }

    async fn handle_stop_message(&self, env: &CommandEnvelope) -> Result<(), DispatchError> {
        let recno = env.banner_stream_recno;
        {
            let mut state = self.entry.state.lock().await;
            if let Some(idx) = state.slots.find_slot_for_recno(recno) {
                let _ = state.slots.clear(idx);
            }
        }
        let body = stop_message(&self.entry.password, recno);
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        banner_transport::send_request(&self.entry, &payload).await?;
        self.journal.remove_by_recno(&recno.to_string())?;
        Ok(())
    }

    async fn handle_hardware_update(&self, env: &CommandEnvelope) -> Result<(), DispatchError> {
        let Some(hw) = self.db.lookup_hardware(env.hardware_recno)? else {
            tracing::warn!(recno = env.hardware_recno, "hardware-update: record not found");
            return Ok(());
        };
        self.registry.refresh(hw).await;
        let Some(entry) = self.registry.lookup(env.hardware_recno).await else {
            return Ok(());
        };

        let slots = { entry.state.lock().await.slots.clone() };
        let renderable = self.gather_renderable(&slots)?;
        if renderable.is_empty() {
            return Ok(());
        }
        let contexts = self.build_contexts(&renderable);
        let seqstring: String = renderable
            .iter()
            .map(|(idx, _, _)| char::from(b'A' + u8::try_from(*idx).unwrap_or(0)))
            .collect();
        let body = sequence_number(&entry.password, &seqstring, &contexts);
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        banner_transport::send_request(&entry, &payload).await?;
        Ok(())
    }

    /// Answers the CGI endpoint's `show-sign-messages` round-trip (spec.md
    /// 4.H) from this device's own slot table. The real sign-screen's
    /// waiting/hidden distinction needs the physical screen's own render
    /// state, which is out of scope (spec.md 1's "model sign screen
    /// rendering" non-goal) — every populated slot is reported `active`,
    /// the one classification this worker can answer honestly.
    async fn handle_show_sign_messages(&self) -> Result<(), DispatchError> {
        let recnos = { self.entry.state.lock().await.slots.populated_recnos() };
        let mut queue = self.queue.lock().await;
        for recno in recnos {
            let env = self.show_sign_messages_row(recno, Some(0), Flag::Data);
            if let Err(e) = queue.write(&env) {
                tracing::warn!(device = self.entry.record_number, error = %e, "queue-write: show-sign-messages row failed");
            }
        }
        let sentinel = self.show_sign_messages_row(0, None, Flag::EndOfResponse);
        queue.write(&sentinel)?;
        Ok(())
    }

    fn show_sign_messages_row(&self, recno: i64, message_type: Option<u8>, flag: Flag) -> CommandEnvelope {
        CommandEnvelope {
            operation: OperationKind::Read,
            command_type: CommandType::ShowSignMessages,
            source: Role::Dispatcher,
            destination: Role::Cgi,
            origin_pid: 0,
            hardware_recno: self.entry.record_number,
            banner_stream_recno: recno,
            parent_template_recno: 0,
            sequence: Vec::new(),
            message_buffer: String::new(),
            return_node: String::new(),
            flag,
            seq_change_op: 0,
            message_type,
        }
    }
}
