//! The rule engine: locates the chat item (if any) matching an incoming
//! command line in the active state, falling back to the default state
//! once, then runs that item's actions in the fixed order the original
//! observes: response, variable sets, state switch, new-call allocation,
//! forget-call, SMS actions.

use crate::profile::{ChatItem, Item, Profile, State, UnsolicitedItem, DEFAULT_STATE_NAME};
use crate::variables::VariableStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub wild: String,
}

/// Locates the chat item (if any) matching `input` in `state_name`. If
/// `state_name` isn't the default state and doesn't match, the default
/// state is tried once more (never recursing further, so a default state
/// that also fails to match simply yields no match).
pub fn find_match<'a>(profile: &'a Profile, state_name: &str, input: &str, vars: &VariableStore) -> Option<(&'a ChatItem, Match)> {
    if let Some(state) = profile.state(state_name) {
        if let Some(found) = find_in_state(state, input, vars) {
            return Some(found);
        }
    }
    if state_name != DEFAULT_STATE_NAME {
        if let Some(found) = find_in_state(profile.default_state(), input, vars) {
            return Some(found);
        }
    }
    None
}

fn find_in_state<'a>(state: &'a State, input: &str, vars: &VariableStore) -> Option<(&'a ChatItem, Match)> {
    for item in &state.items {
        if let Item::Chat(chat) = item {
            if let Some(wild) = try_match(chat, input, vars) {
                return Some((chat, Match { wild }));
            }
        }
    }
    None
}

fn try_match(chat: &ChatItem, input: &str, vars: &VariableStore) -> Option<String> {
    let pattern = vars.expand(&chat.command_template);
    if chat.wildcard {
        wildcard_match(&pattern, input)
    } else if input == pattern {
        Some(String::new())
    } else {
        None
    }
}

/// Anchored glob match at position 0: `*` matches any run of characters.
/// On success, `wild` is computed exactly as the original does —
/// `input[w .. w + (input.len() - pattern.len() + 1)]` where `w` is the
/// position of the first wildcard-enabling `*` — which is kept literal
/// even though it is one character longer than the minimal substring a
/// naive prefix/suffix split would yield (see DESIGN.md).
fn wildcard_match(pattern: &str, input: &str) -> Option<String> {
    let w = crate::profile::first_wildcard_index(pattern)?;
    if !glob_matches(pattern, input) {
        return None;
    }

    let wild_len = (input.len() as isize - pattern.len() as isize + 1).max(0) as usize;
    let start = w.min(input.len());
    let end = (start + wild_len).min(input.len());
    Some(input[start..end].to_string())
}

/// Splits `pattern` on `*` into literal segments and checks `input` starts
/// with the first, ends with the last, and contains the others in order.
fn glob_matches(pattern: &str, input: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return input == pattern;
    }

    let first = segments.first().unwrap();
    let last = segments.last().unwrap();
    if !input.starts_with(first) || !input.ends_with(last) {
        return false;
    }
    if input.len() < first.len() + last.len() {
        return false;
    }

    let mut cursor = first.len();
    let end = input.len() - last.len();
    for seg in &segments[1..segments.len() - 1] {
        if seg.is_empty() {
            continue;
        }
        match input[cursor..end].find(seg) {
            Some(rel) => cursor += rel + seg.len(),
            None => return false,
        }
    }
    true
}

/// Computes the value a `(variable, value_template, delay)` assignment
/// writes, per the fixed substitution rules: `"*"` becomes the captured
/// wildcard; a `${*}` token is replaced with the wildcard (stripped of one
/// trailing `0x1A`, the SMS PDU terminator); anything else is copied as
/// the literal template (any `${name}` in it is expanded when the value is
/// actually written, not here).
pub fn resolve_assignment_value(value_template: &str, wild: &str) -> String {
    if value_template == "*" {
        return wild.to_string();
    }
    if let Some(idx) = value_template.find("${*}") {
        let mut trimmed = wild;
        if trimmed.as_bytes().last() == Some(&0x1A) {
            trimmed = &trimmed[..trimmed.len() - 1];
        }
        let mut out = String::with_capacity(value_template.len());
        out.push_str(&value_template[..idx]);
        out.push_str(trimmed);
        out.push_str(&value_template[idx + 4..]);
        return out;
    }
    value_template.to_string()
}

/// `forget_call_id`'s three forms: forget all, forget the wildcard-captured
/// id, or forget an explicit (possibly `${…}`-templated) id.
pub enum ForgetTarget {
    All,
    Id(u8),
}

pub fn resolve_forget_target(forget_call_id: &str, wild: &str, vars: &VariableStore) -> Option<ForgetTarget> {
    if forget_call_id == "*" {
        return if wild.is_empty() {
            Some(ForgetTarget::All)
        } else {
            wild.parse().ok().map(ForgetTarget::Id)
        };
    }
    vars.expand(forget_call_id).parse().ok().map(ForgetTarget::Id)
}

/// Whether an unsolicited item should have a timer (re)started on state
/// entry: always, unless it's flagged `once` and has already fired.
pub fn should_arm_on_enter(item: &UnsolicitedItem, already_fired: bool) -> bool {
    !(item.once && already_fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ChatItem, Profile, State};
    use std::collections::HashMap;

    fn chat(command_template: &str, wildcard: bool) -> ChatItem {
        ChatItem {
            command_template: command_template.to_string(),
            wildcard,
            response_template: String::new(),
            response_delay_ms: 0,
            eol: true,
            switch_to: None,
            sets: Vec::new(),
            new_call_var: None,
            forget_call_id: None,
            list_sms: false,
            read_sms: false,
            delete_sms: false,
        }
    }

    fn profile_with(state_items: Vec<Item>) -> Profile {
        let mut states = HashMap::new();
        states.insert(
            DEFAULT_STATE_NAME.to_string(),
            State { name: DEFAULT_STATE_NAME.to_string(), items: state_items },
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
    fn exact_match_requires_full_equality() {
        let profile = profile_with(vec![Item::Chat(chat("AT+CPBS?", false))]);
        let vars = VariableStore::new();
        assert!(find_match(&profile, "default", "AT+CPBS?", &vars).is_some());
        assert!(find_match(&profile, "default", "AT+CPBS?extra", &vars).is_none());
    }

    #[test]
    fn wildcard_match_captures_trailing_segment() {
        let profile = profile_with(vec![Item::Chat(chat("AT+FOO=*", true))]);
        let vars = VariableStore::new();
        let (_, m) = find_match(&profile, "default", "AT+FOO=42", &vars).unwrap();
        assert_eq!(m.wild, "42");
    }

    #[test]
    fn unmatched_state_falls_back_to_default_once() {
        let mut states = HashMap::new();
        states.insert(
            "other".to_string(),
            State { name: "other".to_string(), items: vec![] },
        );
        states.insert(
            DEFAULT_STATE_NAME.to_string(),
            State { name: DEFAULT_STATE_NAME.to_string(), items: vec![Item::Chat(chat("AT", false))] },
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
        let vars = VariableStore::new();
        assert!(find_match(&profile, "other", "AT", &vars).is_some());
    }

    #[test]
    fn resolve_assignment_star_captures_wild() {
        assert_eq!(resolve_assignment_value("*", "42"), "42");
    }

    #[test]
    fn resolve_assignment_substitutes_wild_token_and_strips_sub() {
        let wild = "4321\u{1a}";
        assert_eq!(resolve_assignment_value("val=${*}!", wild), "val=4321!");
    }

    #[test]
    fn resolve_forget_target_star_with_wild_parses_id() {
        let vars = VariableStore::new();
        let t = resolve_forget_target("*", "3", &vars);
        assert!(matches!(t, Some(ForgetTarget::Id(3))));
    }

    #[test]
    fn resolve_forget_target_star_without_wild_is_all() {
        let vars = VariableStore::new();
        let t = resolve_forget_target("*", "", &vars);
        assert!(matches!(t, Some(ForgetTarget::All)));
    }
}
