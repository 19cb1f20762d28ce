//! Rule profile data model: the in-memory, immutable shape a loaded XML
//! profile is turned into before a [`crate::session::SimulatorSession`]
//! starts consuming it.

pub mod loader;

use std::collections::HashMap;

pub const DEFAULT_STATE_NAME: &str = "default";

#[derive(Debug, Clone)]
pub struct Profile {
    pub states: HashMap<String, State>,
    pub start_state: Option<String>,
    pub initial_variables: HashMap<String, String>,
    pub phonebook_seeds: Vec<PhonebookSeed>,
    pub filesystem: Option<FilesystemSpec>,
    pub simauth: Option<ApplicationSpec>,
    pub application: Option<ApplicationSpec>,
}

impl Profile {
    /// The distinguished default state. Every profile has one, synthesized
    /// empty if the XML never defined it explicitly.
    pub fn default_state(&self) -> &State {
        self.states
            .get(DEFAULT_STATE_NAME)
            .expect("profile always carries a default state")
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Chat(ChatItem),
    Unsolicited(UnsolicitedItem),
}

#[derive(Debug, Clone)]
pub struct ChatItem {
    pub command_template: String,
    pub wildcard: bool,
    pub response_template: String,
    pub response_delay_ms: u64,
    pub eol: bool,
    pub switch_to: Option<String>,
    pub sets: Vec<VariableAssignment>,
    pub new_call_var: Option<String>,
    pub forget_call_id: Option<String>,
    pub list_sms: bool,
    pub read_sms: bool,
    pub delete_sms: bool,
}

#[derive(Debug, Clone)]
pub struct VariableAssignment {
    pub name: String,
    pub value_template: String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct UnsolicitedItem {
    pub response: String,
    pub delay_ms: u64,
    pub switch_to: Option<String>,
    pub once: bool,
}

#[derive(Debug, Clone)]
pub struct PhonebookSeed {
    pub name: String,
    pub size: usize,
    pub entries: Vec<PhonebookSeedEntry>,
}

#[derive(Debug, Clone)]
pub struct PhonebookSeedEntry {
    pub index: usize,
    pub number: String,
    pub name: String,
    pub hidden: i32,
    pub group: String,
    pub additional_number: String,
    pub second_text: String,
    pub email: String,
    pub sip_uri: String,
    pub tel_uri: String,
}

/// Filesystem content is opaque to the core (out of scope per the external
/// collaborator boundary); its presence is all the loader records.
#[derive(Debug, Clone, Default)]
pub struct FilesystemSpec;

/// An `<simauth>` or `<application>` tag: a named, opaque plugin reference
/// plus whatever attributes it carried, handed verbatim to whichever
/// concrete `SimApplication`/auth implementation the host wires in.
#[derive(Debug, Clone, Default)]
pub struct ApplicationSpec {
    pub name: String,
    pub params: HashMap<String, String>,
}

/// Scans `template` for the first `*` the original treats as
/// wildcard-enabling: a `*` at or before position 2 is ignored (it may be
/// part of a fixed prefix like `AT+`), so the scan keeps looking past it.
/// Shared by profile loading (to auto-detect wildcarding) and rule
/// matching (to locate where the captured `wild` substring starts).
pub fn first_wildcard_index(template: &str) -> Option<usize> {
    let mut search_from = 0usize;
    loop {
        if search_from > template.len() {
            return None;
        }
        match template[search_from..].find('*') {
            None => return None,
            Some(rel) => {
                let pos = search_from + rel;
                if pos > 2 {
                    return Some(pos);
                }
                search_from = pos + 1;
            }
        }
    }
}

/// A `*` found strictly beyond position 2 turns wildcarding on.
pub fn detect_wildcard(template: &str) -> bool {
    first_wildcard_index(template).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileError {
    Xml,
    MissingRoot,
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProfileError::Xml => write!(f, "malformed profile xml"),
            ProfileError::MissingRoot => write!(f, "profile xml missing <simulator> root"),
        }
    }
}

impl std::error::Error for ProfileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_before_position_three_is_not_a_wildcard() {
        assert!(!detect_wildcard("A*"));
        assert!(!detect_wildcard("AT*"));
    }

    #[test]
    fn star_past_position_two_is_a_wildcard() {
        assert!(detect_wildcard("AT+FOO=*"));
    }

    #[test]
    fn no_star_is_never_a_wildcard() {
        assert!(!detect_wildcard("AT+CPBS?"));
    }

    #[test]
    fn leading_stars_are_skipped_until_one_past_position_two() {
        assert!(detect_wildcard("**+FOO=*"));
    }
}
