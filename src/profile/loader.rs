//! XML profile loading. Kept isolated from the rest of `profile` so the
//! format is swappable without touching the domain types it produces.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use super::{
    detect_wildcard, ApplicationSpec, ChatItem, FilesystemSpec, Item, PhonebookSeed,
    PhonebookSeedEntry, Profile, ProfileError, State, UnsolicitedItem, VariableAssignment,
    DEFAULT_STATE_NAME,
};

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Profile, ProfileError> {
    let text = std::fs::read_to_string(path).map_err(|_| ProfileError::Xml)?;
    load_from_str(&text)
}

pub fn load_from_str(xml: &str) -> Result<Profile, ProfileError> {
    let raw: RawProfile = quick_xml::de::from_str(xml).map_err(|_| ProfileError::Xml)?;
    Ok(raw.into_profile())
}

/// Loads every `*.xml` file in `dir` as a standalone `<phonebook>`
/// fragment (same shape as a `<phonebook>` nested under `<simulator>`),
/// one seed per file. Used to override or extend a profile's own
/// phonebook seeds without editing the profile XML itself.
pub fn load_phonebook_dir(dir: impl AsRef<Path>) -> Result<Vec<PhonebookSeed>, ProfileError> {
    let mut seeds = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|_| ProfileError::Xml)?;
    let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(|_| ProfileError::Xml)?;
        let raw: RawPhonebook = quick_xml::de::from_str(&text).map_err(|_| ProfileError::Xml)?;
        seeds.push(raw.into_seed());
    }
    Ok(seeds)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "simulator")]
struct RawProfile {
    #[serde(rename = "state", default)]
    states: Vec<RawState>,
    start: Option<RawNamed>,
    #[serde(rename = "set", default)]
    sets: Vec<RawSet>,
    filesystem: Option<RawFilesystem>,
    #[serde(rename = "phonebook", default)]
    phonebooks: Vec<RawPhonebook>,
    simauth: Option<RawOpaque>,
    application: Option<RawOpaque>,
}

impl RawProfile {
    fn into_profile(self) -> Profile {
        let mut states: HashMap<String, State> = self
            .states
            .into_iter()
            .map(RawState::into_state)
            .map(|s| (s.name.clone(), s))
            .collect();

        states
            .entry(DEFAULT_STATE_NAME.to_string())
            .or_insert_with(|| State {
                name: DEFAULT_STATE_NAME.to_string(),
                items: Vec::new(),
            });

        let initial_variables = self
            .sets
            .into_iter()
            .map(|s| (s.name, s.value))
            .collect();

        let phonebook_seeds = self.phonebooks.into_iter().map(RawPhonebook::into_seed).collect();

        Profile {
            states,
            start_state: self.start.map(|s| s.name),
            initial_variables,
            phonebook_seeds,
            filesystem: self.filesystem.map(|_| FilesystemSpec),
            simauth: self.simauth.map(RawOpaque::into_spec),
            application: self.application.map(RawOpaque::into_spec),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawState {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$value", default)]
    items: Vec<RawItem>,
}

impl RawState {
    fn into_state(self) -> State {
        State {
            name: self.name,
            items: self.items.into_iter().map(RawItem::into_item).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawItem {
    Chat(RawChat),
    Unsolicited(RawUnsolicited),
}

impl RawItem {
    fn into_item(self) -> Item {
        match self {
            RawItem::Chat(c) => Item::Chat(c.into_chat_item()),
            RawItem::Unsolicited(u) => Item::Unsolicited(u.into_unsolicited_item()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawChat {
    #[serde(rename = "$value", default)]
    children: Vec<RawChatChild>,
}

impl RawChat {
    fn into_chat_item(self) -> ChatItem {
        let mut command_template = String::new();
        let mut wildcard = None;
        let mut response_template = String::new();
        let mut response_delay_ms = 0;
        let mut eol = true;
        let mut switch_to = None;
        let mut sets = Vec::new();
        let mut new_call_var = None;
        let mut forget_call_id = None;
        let mut list_sms = false;
        let mut read_sms = false;
        let mut delete_sms = false;

        for child in self.children {
            match child {
                RawChatChild::Command(c) => {
                    command_template = c.text;
                    wildcard = c.wildcard.map(|v| v == "true");
                }
                RawChatChild::Response(r) => {
                    response_template = r.text;
                    response_delay_ms = r.delay.unwrap_or(0);
                    eol = r.eol.map(|v| v == "true").unwrap_or(true);
                }
                RawChatChild::Switch(n) => switch_to = Some(n.name),
                RawChatChild::Set(s) => sets.push(VariableAssignment {
                    name: s.name,
                    value_template: s.value,
                    delay_ms: s.delay.unwrap_or(0),
                }),
                RawChatChild::NewCall(n) => new_call_var = Some(n.name),
                RawChatChild::ForgetCall(f) => forget_call_id = Some(f.id),
                RawChatChild::ListSms => list_sms = true,
                RawChatChild::ReadSms => read_sms = true,
                RawChatChild::DeleteSms => delete_sms = true,
            }
        }

        let wildcard = wildcard.unwrap_or_else(|| detect_wildcard(&command_template));

        ChatItem {
            command_template,
            wildcard,
            response_template,
            response_delay_ms,
            eol,
            switch_to,
            sets,
            new_call_var,
            forget_call_id,
            list_sms,
            read_sms,
            delete_sms,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum RawChatChild {
    Command(RawCommand),
    Response(RawResponse),
    Switch(RawNamed),
    Set(RawSet),
    #[serde(rename = "newcall")]
    NewCall(RawNamed),
    #[serde(rename = "forgetcall")]
    ForgetCall(RawForgetCall),
    #[serde(rename = "listSMS")]
    ListSms,
    #[serde(rename = "readSMS")]
    ReadSms,
    #[serde(rename = "deleteSMS")]
    DeleteSms,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(rename = "@wildcard")]
    wildcard: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(rename = "@delay")]
    delay: Option<u64>,
    #[serde(rename = "@eol")]
    eol: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawSet {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
    #[serde(rename = "@delay")]
    delay: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawForgetCall {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawUnsolicited {
    #[serde(rename = "@delay")]
    delay: Option<u64>,
    #[serde(rename = "@switch")]
    switch: Option<String>,
    #[serde(rename = "@once")]
    once: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

impl RawUnsolicited {
    fn into_unsolicited_item(self) -> UnsolicitedItem {
        UnsolicitedItem {
            response: self.text,
            delay_ms: self.delay.unwrap_or(0),
            switch_to: self.switch,
            once: self.once.map(|v| v == "true").unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawFilesystem {}

#[derive(Debug, Deserialize, Default)]
struct RawOpaque {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(flatten)]
    params: BTreeMap<String, String>,
}

impl RawOpaque {
    fn into_spec(self) -> ApplicationSpec {
        ApplicationSpec {
            name: self.name,
            params: self.params.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "phonebook")]
struct RawPhonebook {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@size")]
    size: Option<usize>,
    #[serde(rename = "entry", default)]
    entries: Vec<RawEntry>,
}

impl RawPhonebook {
    fn into_seed(self) -> PhonebookSeed {
        PhonebookSeed {
            name: self.name,
            size: self.size.unwrap_or(crate::phonebook::DEFAULT_SM_SIZE),
            entries: self.entries.into_iter().map(RawEntry::into_seed_entry).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "@index")]
    index: usize,
    #[serde(rename = "@number", default)]
    number: String,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@hidden")]
    hidden: Option<i32>,
    #[serde(rename = "@group", default)]
    group: String,
    #[serde(rename = "@adnumber", default)]
    adnumber: String,
    #[serde(rename = "@secondtext", default)]
    secondtext: String,
    #[serde(rename = "@email", default)]
    email: String,
    #[serde(rename = "@sip_uri", default)]
    sip_uri: String,
    #[serde(rename = "@tel_uri", default)]
    tel_uri: String,
}

impl RawEntry {
    fn into_seed_entry(self) -> PhonebookSeedEntry {
        PhonebookSeedEntry {
            index: self.index,
            number: self.number,
            name: self.name,
            hidden: self.hidden.unwrap_or(crate::phonebook::HIDDEN_UNSET),
            group: self.group,
            additional_number: self.adnumber,
            second_text: self.secondtext,
            email: self.email,
            sip_uri: self.sip_uri,
            tel_uri: self.tel_uri,
        }
    }
}
