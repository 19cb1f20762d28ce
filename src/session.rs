//! Per-connection session: owns all mutable state for one peer (profile
//! instance, variables, phonebooks, call ids, framer/line state, timers,
//! collaborators) and drives the cooperative event loop that races socket
//! reads against scheduled timers, per spec §5.

use std::collections::{HashMap, HashSet};

use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::callid::CallIdSet;
use crate::collaborators::{
    AidApplication, CallManager, Filesystem, HardwareManipulator, NullAidApplication, NullCallManager,
    NullFilesystem, NullHardwareManipulator, NullSimApplication, NullSmsStore, SimApplication, SmsStore,
};
use crate::framer::{self, Decoded, Frame};
use crate::line::LineAssembler;
use crate::phonebook::{Phonebook, PhonebookEntry, PhonebookSet};
use crate::profile::{ChatItem, Item, Profile, UnsolicitedItem, DEFAULT_STATE_NAME};
use crate::response;
use crate::router;
use crate::rules::{self, ForgetTarget};
use crate::scheduler::Scheduler;
use crate::variables::VariableStore;

const READ_BUF_SIZE: usize = 4096;

enum TimerEvent {
    Response { bytes: Vec<u8>, channel: u8 },
    VariableSet { name: String, value: String },
}

pub struct SimulatorSession {
    profile: Profile,
    vars: VariableStore,
    phonebooks: PhonebookSet,
    call_ids: CallIdSet,
    current_state: String,
    fired_once: HashSet<(String, usize)>,

    timers: Scheduler<TimerEvent>,
    unsolicited_timers: Scheduler<(String, usize)>,

    mux_enabled: bool,
    current_channel: u8,
    raw_line: LineAssembler,
    channel_lines: HashMap<u8, LineAssembler>,
    frame_buf: Vec<u8>,

    hw: Box<dyn HardwareManipulator>,
    call_manager: Box<dyn CallManager>,
    aid_app: Box<dyn AidApplication>,
    sim_app: Option<Box<dyn SimApplication>>,
    filesystem: Box<dyn Filesystem>,
    sms_store: Box<dyn SmsStore>,
}

impl SimulatorSession {
    pub fn new(profile: Profile) -> Self {
        let current_state = profile.start_state.clone().unwrap_or_else(|| DEFAULT_STATE_NAME.to_string());
        Self {
            profile,
            vars: VariableStore::new(),
            phonebooks: PhonebookSet::new(),
            call_ids: CallIdSet::new(),
            current_state,
            fired_once: HashSet::new(),
            timers: Scheduler::new(),
            unsolicited_timers: Scheduler::new(),
            mux_enabled: false,
            current_channel: 1,
            raw_line: LineAssembler::new(),
            channel_lines: HashMap::new(),
            frame_buf: Vec::new(),
            hw: Box::new(NullHardwareManipulator),
            call_manager: Box::new(NullCallManager),
            aid_app: Box::new(NullAidApplication),
            sim_app: Some(Box::new(NullSimApplication)),
            filesystem: Box::new(NullFilesystem),
            sms_store: Box::new(NullSmsStore),
        }
    }

    pub fn with_hardware_manipulator(mut self, hw: Box<dyn HardwareManipulator>) -> Self {
        self.hw = hw;
        self
    }

    pub fn with_call_manager(mut self, call_manager: Box<dyn CallManager>) -> Self {
        self.call_manager = call_manager;
        self
    }

    pub fn with_aid_application(mut self, aid_app: Box<dyn AidApplication>) -> Self {
        self.aid_app = aid_app;
        self
    }

    pub fn with_sim_application(mut self, app: Box<dyn SimApplication>) -> Self {
        self.sim_app = Some(app);
        self
    }

    pub fn with_filesystem(mut self, filesystem: Box<dyn Filesystem>) -> Self {
        self.filesystem = filesystem;
        self
    }

    pub fn with_sms_store(mut self, sms_store: Box<dyn SmsStore>) -> Self {
        self.sms_store = sms_store;
        self
    }

    /// Seeds variables and phonebooks from the profile and arms the start
    /// state's unsolicited timers. Call once before feeding any bytes.
    pub fn start(&mut self) {
        for (name, value) in &self.profile.initial_variables {
            self.vars.set(name, value.clone());
        }
        for seed in &self.profile.phonebook_seeds {
            let mut book = Phonebook::new(seed.size);
            for entry in &seed.entries {
                let _ = book.write(
                    entry.index,
                    PhonebookEntry {
                        number: entry.number.clone(),
                        name: entry.name.clone(),
                        hidden: entry.hidden,
                        group: entry.group.clone(),
                        additional_number: entry.additional_number.clone(),
                        second_text: entry.second_text.clone(),
                        email: entry.email.clone(),
                        sip_uri: entry.sip_uri.clone(),
                        tel_uri: entry.tel_uri.clone(),
                    },
                );
            }
            self.phonebooks.insert(seed.name.clone(), book);
        }
        self.arm_unsolicited_timers(&self.current_state.clone());
    }

    fn arm_unsolicited_timers(&mut self, state_name: &str) {
        let Some(state) = self.profile.state(state_name) else {
            return;
        };
        for (idx, item) in state.items.iter().enumerate() {
            if let Item::Unsolicited(u) = item {
                let fired = self.fired_once.contains(&(state_name.to_string(), idx));
                if rules::should_arm_on_enter(u, fired) {
                    self.unsolicited_timers.schedule(u.delay_ms, (state_name.to_string(), idx));
                }
            }
        }
    }

    fn switch_state(&mut self, new_state: String, out: &mut Vec<u8>) {
        self.unsolicited_timers.clear();
        self.hw.switch_to(&new_state);
        self.current_state = new_state.clone();
        self.arm_unsolicited_timers(&new_state);
        let _ = out;
    }

    /// Reads a variable's current value, for hosts and tests that need to
    /// assert on or seed state the profile XML doesn't cover.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.vars.get(name)
    }

    /// Sets a variable directly, expanding any `${...}` in `value` first
    /// (same semantics as a chat item's `<set>` action).
    pub fn set_variable(&mut self, name: &str, value: impl Into<String>) {
        self.vars.set(name, value);
    }

    /// The earliest pending deadline across both schedulers, for the caller
    /// to race against the next socket read.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timers.next_deadline(), self.unsolicited_timers.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Drains and applies every timer whose deadline has passed, writing
    /// any resulting bytes to `out`.
    pub fn poll_timers(&mut self, out: &mut Vec<u8>) {
        for event in self.timers.drain_ready() {
            match event {
                TimerEvent::Response { bytes, channel } => write_channel(self.mux_enabled, channel, &bytes, out),
                TimerEvent::VariableSet { name, value } => {
                    self.vars.set(&name, value);
                    let current = self.vars.get(&name).unwrap_or("").to_string();
                    self.hw.variable_changed(&name, &current);
                }
            }
        }
        for (state_name, idx) in self.unsolicited_timers.drain_ready() {
            self.fire_unsolicited(state_name, idx, out);
        }
    }

    fn fire_unsolicited(&mut self, state_name: String, idx: usize, out: &mut Vec<u8>) {
        let Some(Item::Unsolicited(item)) = self.profile.state(&state_name).and_then(|s| s.items.get(idx)) else {
            return;
        };
        let item: UnsolicitedItem = item.clone();
        let bytes = response::build(&item.response, &self.vars, true);
        write_channel(self.mux_enabled, self.current_channel, &bytes, out);
        self.hw.unsolicited(&item.response);
        self.fired_once.insert((state_name, idx));
        if let Some(switch) = item.switch_to {
            self.switch_state(switch, out);
        }
    }

    /// Feeds a chunk of raw bytes off the wire (plain, or GSM 07.10 framed
    /// when enabled), dispatching every complete command line it yields.
    pub fn ingest(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        if self.mux_enabled {
            self.frame_buf.extend_from_slice(bytes);
            loop {
                match framer::decode_one(&self.frame_buf) {
                    Decoded::Incomplete => break,
                    Decoded::Skip(n) => {
                        let n = n.min(self.frame_buf.len());
                        self.frame_buf.drain(..n);
                    }
                    Decoded::Frame(frame, consumed) => {
                        self.frame_buf.drain(..consumed);
                        let was_muxed = self.mux_enabled;
                        self.handle_frame(frame, out);
                        if was_muxed && !self.mux_enabled {
                            if self.frame_buf.first() == Some(&framer::FLAG) {
                                self.frame_buf.remove(0);
                            }
                            let remainder = std::mem::take(&mut self.frame_buf);
                            self.ingest_raw(&remainder, out);
                            break;
                        }
                    }
                }
            }
        } else {
            self.ingest_raw(bytes, out);
        }
    }

    fn handle_frame(&mut self, frame: Frame, out: &mut Vec<u8>) {
        if frame.is_disc_terminate() {
            info!("GSM 07.10 DISC on channel 0, disabling mux mode");
            self.mux_enabled = false;
            return;
        }
        if !frame.is_data() {
            return;
        }
        let lines = self.channel_lines.entry(frame.channel).or_insert_with(LineAssembler::new).feed(&frame.payload);
        for line in lines {
            self.dispatch_line(&line, frame.channel, out);
            // The original resets the current channel to 1 after each
            // framed command, so an unsolicited notification firing
            // between commands lands on the default channel rather than
            // the last command's channel.
            self.current_channel = 1;
        }
    }

    fn ingest_raw(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        let lines = self.raw_line.feed(bytes);
        for line in lines {
            self.dispatch_line(&line, 0, out);
        }
    }

    /// Command router: the fixed precedence chain from spec §4.2.
    pub fn dispatch_line(&mut self, line: &str, channel: u8, out: &mut Vec<u8>) {
        self.current_channel = channel;
        self.hw.command(line);

        let mut replies: Vec<String> = Vec::new();
        let handled_by_call_manager = {
            let mut respond = |text: &str| replies.push(text.to_string());
            self.call_manager.command(line, &mut respond)
        };
        if handled_by_call_manager {
            self.flush_replies(replies, channel, out);
            return;
        }

        let handled_by_aid_app = {
            let mut respond = |text: &str| replies.push(text.to_string());
            self.aid_app.command(line, &mut respond)
        };
        if handled_by_aid_app {
            self.flush_replies(replies, channel, out);
            return;
        }

        if let Some(app) = self.sim_app.as_deref_mut() {
            let sim_present = self.hw.sim_present();
            let mut respond = |text: &str| replies.push(text.to_string());
            let handled = crate::simtoolkit::handle(line, sim_present, app, &mut self.vars, &mut respond);
            if handled {
                self.flush_replies(replies, channel, out);
                return;
            }
        }

        if let Some((item, m)) = rules::find_match(&self.profile, &self.current_state, line, &self.vars) {
            let item = item.clone();
            self.execute_chat_item(&item, &m.wild, channel, out);
            return;
        }

        if let Some(args) = line.strip_prefix("AT+CRSM=") {
            let mut respond = |text: &str| replies.push(text.to_string());
            self.filesystem.crsm(args, &mut respond);
            self.flush_replies(replies, channel, out);
            return;
        }

        if line.starts_with("AT+CPBS") || line.starts_with("AT+CPBR") || line.starts_with("AT+CPBW") {
            let mut respond = |text: &str| replies.push(text.to_string());
            router::dispatch_phonebook(&mut self.phonebooks, &mut self.vars, line, &mut respond);
            self.flush_replies(replies, channel, out);
            return;
        }

        if line.strip_prefix("AT+CMUX=0,").is_some() {
            self.flush_replies(vec!["OK".to_string()], channel, out);
            self.mux_enabled = true;
            return;
        }

        if line.starts_with(r#"AT+CPWD="SC","#) {
            let reply = match crate::pinchange::change_pin(line, &mut self.vars) {
                Ok(()) => "OK",
                Err(_) => "ERROR",
            };
            self.flush_replies(vec![reply.to_string()], channel, out);
            return;
        }

        if line.starts_with("AT") {
            self.flush_replies(vec!["ERROR".to_string()], channel, out);
        }
    }

    fn flush_replies(&self, replies: Vec<String>, channel: u8, out: &mut Vec<u8>) {
        for text in replies {
            let bytes = response::build(&text, &self.vars, true);
            write_channel(self.mux_enabled, channel, &bytes, out);
        }
    }

    fn execute_chat_item(&mut self, item: &ChatItem, wild: &str, channel: u8, out: &mut Vec<u8>) {
        if !(item.list_sms || item.read_sms || item.delete_sms) {
            let response_text = rules::resolve_assignment_value(&item.response_template, wild);
            let bytes = response::build(&response_text, &self.vars, item.eol);
            if item.response_delay_ms == 0 {
                write_channel(self.mux_enabled, channel, &bytes, out);
            } else {
                self.timers.schedule(item.response_delay_ms, TimerEvent::Response { bytes, channel });
            }
        }

        for assignment in &item.sets {
            let value = rules::resolve_assignment_value(&assignment.value_template, wild);
            if assignment.delay_ms == 0 {
                self.vars.set(&assignment.name, value);
                let current = self.vars.get(&assignment.name).unwrap_or("").to_string();
                self.hw.variable_changed(&assignment.name, &current);
            } else {
                self.timers.schedule(
                    assignment.delay_ms,
                    TimerEvent::VariableSet { name: assignment.name.clone(), value },
                );
            }
        }

        if let Some(switch_to) = item.switch_to.clone() {
            self.switch_state(switch_to, out);
        }

        if let Some(var_name) = &item.new_call_var {
            if let Some(id) = self.call_ids.allocate() {
                self.vars.set(var_name, id.to_string());
            } else {
                warn!("no free call id to assign to {var_name}");
            }
        }

        if let Some(forget) = &item.forget_call_id {
            match rules::resolve_forget_target(forget, wild, &self.vars) {
                Some(ForgetTarget::All) => self.call_ids.forget_all(),
                Some(ForgetTarget::Id(id)) => self.call_ids.forget(id),
                None => {}
            }
        }

        if item.list_sms {
            self.emit_sms_list(channel, out);
        } else if item.read_sms {
            self.emit_sms_read(wild, channel, out);
        } else if item.delete_sms {
            self.emit_sms_delete(wild, channel, out);
        }
    }

    fn emit_sms_list(&mut self, channel: u8, out: &mut Vec<u8>) {
        let text = if self.vars.get("MSGMEM") != Some("SM") {
            String::new()
        } else {
            let records = self.sms_store.list();
            let mut lines = Vec::new();
            for (idx, record) in records.iter().enumerate() {
                if record.deleted {
                    continue;
                }
                lines.push(format!(
                    "+CMGL: {},{},,{}\n{}\n",
                    idx + 1,
                    record.status,
                    record.pdu.len(),
                    crate::hex::to_hex(&record.pdu)
                ));
            }
            if lines.is_empty() {
                "+CMS ERROR: 321".to_string()
            } else {
                lines.push("\nOK".to_string());
                lines.join("")
            }
        };
        if text.is_empty() {
            return;
        }
        let bytes = response::build(&text, &self.vars, true);
        write_channel(self.mux_enabled, channel, &bytes, out);
    }

    fn emit_sms_read(&mut self, wild: &str, channel: u8, out: &mut Vec<u8>) {
        let text = match wild.parse::<usize>().ok().and_then(|idx| self.sms_store.read(idx)) {
            Some(record) => format!(
                "+CMGR: {},,{}\n{}\n\nOK",
                record.status,
                record.pdu.len(),
                crate::hex::to_hex(&record.pdu)
            ),
            None => "ERROR".to_string(),
        };
        let bytes = response::build(&text, &self.vars, true);
        write_channel(self.mux_enabled, channel, &bytes, out);
    }

    fn emit_sms_delete(&mut self, wild: &str, channel: u8, out: &mut Vec<u8>) {
        let ok = wild.parse::<usize>().ok().map(|idx| self.sms_store.delete(idx)).unwrap_or(false);
        let bytes = response::build(if ok { "OK" } else { "ERROR" }, &self.vars, true);
        write_channel(self.mux_enabled, channel, &bytes, out);
    }

    /// Drives the per-connection event loop: races socket reads against
    /// scheduled timers until the peer disconnects, per spec §5.
    pub async fn run(mut self, mut stream: TcpStream) -> std::io::Result<()> {
        self.start();
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let mut out = Vec::new();
            let deadline = self.next_deadline();

            tokio::select! {
                result = stream.read(&mut buf) => {
                    let n = result?;
                    if n == 0 {
                        info!("peer disconnected");
                        return Ok(());
                    }
                    self.ingest(&buf[..n], &mut out);
                }
                _ = sleep_until_or_pending(deadline) => {
                    self.poll_timers(&mut out);
                }
            }

            if !out.is_empty() {
                stream.write_all(&out).await?;
                stream.flush().await?;
            }
        }
    }
}

fn write_channel(mux_enabled: bool, channel: u8, bytes: &[u8], out: &mut Vec<u8>) {
    if mux_enabled {
        framer::encode(channel, bytes, out);
    } else {
        out.extend_from_slice(bytes);
    }
}

/// Sleeps until `deadline`, or forever if there is none — lets `select!`
/// treat "no pending timers" as a branch that simply never wins.
async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(when) => tokio::time::sleep_until(when).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ChatItem, State, VariableAssignment};

    fn minimal_profile() -> Profile {
        let mut states = HashMap::new();
        states.insert(
            DEFAULT_STATE_NAME.to_string(),
            State {
                name: DEFAULT_STATE_NAME.to_string(),
                items: vec![Item::Chat(ChatItem {
                    command_template: "AT+CPBS?".to_string(),
                    wildcard: false,
                    response_template: "ERROR".to_string(),
                    response_delay_ms: 0,
                    eol: true,
                    switch_to: None,
                    sets: Vec::new(),
                    new_call_var: None,
                    forget_call_id: None,
                    list_sms: false,
                    read_sms: false,
                    delete_sms: false,
                })],
            },
        );
        Profile {
            states,
            start_state: None,
            initial_variables: HashMap::new(),
            phonebook_seeds: Vec::new(),
            filesystem: None,
            simauth: None,
            application: None,
        }
    }

    #[test]
    fn pin_readiness_gate_scenario() {
        let mut profile = minimal_profile();
        profile.initial_variables.insert("PINNAME".to_string(), "SIM PIN".to_string());
        let mut session = SimulatorSession::new(profile);
        session.start();

        let mut out = Vec::new();
        session.dispatch_line("AT+CPBS?", 0, &mut out);
        assert_eq!(out, b"\r\nERROR\r\n");

        session.vars.set("PINNAME", "READY");
        let mut out = Vec::new();
        session.dispatch_line("AT+CPBS?", 0, &mut out);
        assert_eq!(out, b"\r\n+CPBS: \"SM\",0,150\r\nOK\r\n");
    }

    #[test]
    fn wildcard_chat_scenario_sets_variable_and_responds() {
        let mut states = HashMap::new();
        states.insert(
            DEFAULT_STATE_NAME.to_string(),
            State {
                name: DEFAULT_STATE_NAME.to_string(),
                items: vec![Item::Chat(ChatItem {
                    command_template: "AT+FOO=*".to_string(),
                    wildcard: true,
                    response_template: "+FOO: ${*}".to_string(),
                    response_delay_ms: 0,
                    eol: true,
                    switch_to: None,
                    sets: vec![VariableAssignment { name: "LAST".to_string(), value_template: "*".to_string(), delay_ms: 0 }],
                    new_call_var: None,
                    forget_call_id: None,
                    list_sms: false,
                    read_sms: false,
                    delete_sms: false,
                })],
            },
        );
        let profile = Profile {
            states,
            start_state: None,
            initial_variables: HashMap::new(),
            phonebook_seeds: Vec::new(),
            filesystem: None,
            simauth: None,
            application: None,
        };
        let mut session = SimulatorSession::new(profile);
        session.start();

        let mut out = Vec::new();
        session.dispatch_line("AT+FOO=42", 0, &mut out);
        assert_eq!(out, b"\r\n+FOO: 42\r\n");
        assert_eq!(session.vars.get("LAST"), Some("42"));
    }

    #[test]
    fn cmux_activation_then_framed_roundtrip() {
        let profile = minimal_profile();
        let mut session = SimulatorSession::new(profile);
        session.start();

        let mut out = Vec::new();
        session.dispatch_line("AT+CMUX=0,0,0,31,10,3,30,10,2", 0, &mut out);
        assert_eq!(out, b"\r\nOK\r\n");
        assert!(session.mux_enabled);

        let mut framed = Vec::new();
        framer::encode(1, b"AT+CPBS?\r", &mut framed);
        let mut out = Vec::new();
        session.ingest(&framed, &mut out);

        match framer::decode_one(&out) {
            Decoded::Frame(frame, _) => {
                assert_eq!(frame.channel, 1);
                assert_eq!(frame.payload, b"\r\nERROR\r\n");
            }
            _ => panic!("expected one framed reply"),
        }
    }
}
