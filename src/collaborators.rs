//! Narrow traits for the collaborators the core dispatches to but does not
//! itself implement: the hardware manipulator UI, the call manager, SIM
//! toolkit applications, the SIM filesystem, and SMS storage. Each ships a
//! `Null*` default so the crate is runnable standalone.

use crate::phonebook::PhonebookSet;
use crate::variables::VariableStore;

/// Observer notified of traffic and state changes, and asked whether a SIM
/// is present. Optional; has no power to reject anything.
pub trait HardwareManipulator: Send {
    fn unsolicited(&mut self, _text: &str) {}
    fn command(&mut self, _text: &str) {}
    fn variable_changed(&mut self, _name: &str, _value: &str) {}
    fn switch_to(&mut self, _name: &str) {}
    fn sim_present(&self) -> bool {
        true
    }
}

pub struct NullHardwareManipulator;
impl HardwareManipulator for NullHardwareManipulator {}

/// Handles call-related AT commands (`ATD`, `ATH`, `AT+CLCC`, …) ahead of
/// the generic rule engine, and arbitrates Fixed Dialling.
pub trait CallManager: Send {
    /// Returns `true` if `line` was a call-related command this handled.
    /// `respond` is used to emit any reply.
    fn command(&mut self, line: &str, respond: &mut dyn FnMut(&str)) -> bool;

    /// Implements the Fixed Dialling guard: may the given number be dialled?
    fn dial_check(&self, phonebooks: &PhonebookSet, vars: &VariableStore, number: &str) -> bool;
}

pub struct NullCallManager;

impl CallManager for NullCallManager {
    fn command(&mut self, _line: &str, _respond: &mut dyn FnMut(&str)) -> bool {
        false
    }

    fn dial_check(&self, phonebooks: &PhonebookSet, vars: &VariableStore, number: &str) -> bool {
        crate::pinchange::dial_check(phonebooks, vars, number)
    }
}

/// Wraps an AID (Application Identifier) selection layer that may consume
/// a command ahead of the SIM toolkit handler and rule engine. Opaque: the
/// core only needs to know whether it claimed the line.
pub trait AidApplication: Send {
    /// Returns `true` if `line` was consumed. `respond` is used to emit
    /// any reply.
    fn command(&mut self, line: &str, respond: &mut dyn FnMut(&str)) -> bool;
}

pub struct NullAidApplication;

impl AidApplication for NullAidApplication {
    fn command(&mut self, _line: &str, _respond: &mut dyn FnMut(&str)) -> bool {
        false
    }
}

/// A SIM/USIM toolkit application fed FETCH/TERMINAL RESPONSE/ENVELOPE
/// traffic from the `AT+CSIM`/`AT+CUSATT`/`AT+CUSATE` handler.
pub trait SimApplication: Send {
    /// Returns the pending proactive command, if any. `peek` leaves it
    /// pending; otherwise it is consumed.
    fn fetch(&mut self, peek: bool) -> Option<Vec<u8>>;
    fn response(&mut self, term_resp: &[u8]) -> bool;
    fn envelope(&mut self, env: &[u8]) -> bool;
    fn abort(&mut self);

    /// Out-of-band notification of a call/session state change the app may
    /// want to react to (e.g. to queue a new proactive command). No
    /// core operation invokes this on its own; it exists so a host's call
    /// manager or hardware manipulator can reach the active app, per §6.
    fn control_event(&mut self, _event: &str) {}
}

pub struct NullSimApplication;

impl SimApplication for NullSimApplication {
    fn fetch(&mut self, _peek: bool) -> Option<Vec<u8>> {
        None
    }

    fn response(&mut self, _term_resp: &[u8]) -> bool {
        false
    }

    fn envelope(&mut self, _env: &[u8]) -> bool {
        false
    }

    fn abort(&mut self) {}
}

/// Backs `AT+CRSM`. Opaque filesystem content; the implementation writes
/// its own reply through `respond`.
pub trait Filesystem: Send {
    fn crsm(&mut self, args: &str, respond: &mut dyn FnMut(&str));
}

pub struct NullFilesystem;

impl Filesystem for NullFilesystem {
    fn crsm(&mut self, _args: &str, respond: &mut dyn FnMut(&str)) {
        respond("ERROR");
    }
}

#[derive(Debug, Clone)]
pub struct SmsRecord {
    pub status: u8,
    pub deleted: bool,
    pub pdu: Vec<u8>,
}

/// SMS storage, consulted by `list_sms`/`read_sms`/`delete_sms`-tagged chat
/// items. Absent by default, matching the documented no-op behavior.
pub trait SmsStore: Send {
    fn list(&self) -> Vec<SmsRecord>;
    fn read(&mut self, index: usize) -> Option<SmsRecord>;
    fn delete(&mut self, index: usize) -> bool;
}

pub struct NullSmsStore;

impl SmsStore for NullSmsStore {
    fn list(&self) -> Vec<SmsRecord> {
        Vec::new()
    }

    fn read(&mut self, _index: usize) -> Option<SmsRecord> {
        None
    }

    fn delete(&mut self, _index: usize) -> bool {
        false
    }
}
