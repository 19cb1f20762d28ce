//! `AT+CPWD` PIN change handling and the Fixed Dialling guard.
//!
//! Both are small enough, and similarly "core logic masquerading as a
//! pluggable collaborator", that they live together rather than earning
//! their own modules.

use crate::phonebook::PhonebookSet;
use crate::variables::VariableStore;

const EMERGENCY_NUMBERS: [&str; 4] = ["112", "911", "08", "000"];

/// `AT+CPWD="SC","old","new"`: quoted-comma split. Requires at least 6
/// `"`-delimited parts (`AT+CPWD=`, `SC`, `,`, old, `,`, new, ...).
pub fn change_pin(cmd: &str, vars: &mut VariableStore) -> Result<(), PinChangeError> {
    let parts: Vec<&str> = cmd.split('"').collect();
    if parts.len() < 6 {
        return Err(PinChangeError::Malformed);
    }
    let old = parts[3];
    let new = parts[5];

    if vars.get("PINVALUE") != Some(old) {
        return Err(PinChangeError::WrongOldPin);
    }
    if !(4..=8).contains(&new.len()) {
        return Err(PinChangeError::BadNewPinLength);
    }

    vars.set("PINVALUE", new);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChangeError {
    Malformed,
    WrongOldPin,
    BadNewPinLength,
}

/// The Fixed Dialling guard (spec §4.9): when `FD` is armed, only numbers
/// prefixed by a non-empty `FD` phonebook entry, or an emergency number,
/// may be dialled.
pub fn dial_check(phonebooks: &PhonebookSet, vars: &VariableStore, number: &str) -> bool {
    if vars.get("FD") != Some("1") {
        return true;
    }

    if EMERGENCY_NUMBERS.contains(&number) {
        return true;
    }

    let Some(fd) = phonebooks.get("FD") else {
        return false;
    };

    fd.iter_occupied(1, fd.size())
        .any(|(_, entry)| !entry.number.is_empty() && number.starts_with(entry.number.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phonebook::{Phonebook, PhonebookEntry};

    #[test]
    fn permits_when_fd_not_armed() {
        let phonebooks = PhonebookSet::new();
        let vars = VariableStore::new();
        assert!(dial_check(&phonebooks, &vars, "5551234"));
    }

    #[test]
    fn permits_emergency_numbers_when_armed() {
        let mut phonebooks = PhonebookSet::new();
        phonebooks.insert("FD", Phonebook::new(5));
        let mut vars = VariableStore::new();
        vars.set("FD", "1");
        assert!(dial_check(&phonebooks, &vars, "911"));
    }

    #[test]
    fn permits_numbers_prefixed_by_an_fd_entry() {
        let mut phonebooks = PhonebookSet::new();
        let mut fd = Phonebook::new(5);
        fd.write(1, PhonebookEntry {
            number: "555".to_string(),
            ..Default::default()
        }).unwrap();
        phonebooks.insert("FD", fd);
        let mut vars = VariableStore::new();
        vars.set("FD", "1");
        assert!(dial_check(&phonebooks, &vars, "5551234"));
        assert!(!dial_check(&phonebooks, &vars, "4000"));
    }

    #[test]
    fn change_pin_rejects_wrong_old_value() {
        let mut vars = VariableStore::new();
        vars.set("PINVALUE", "1234");
        let cmd = r#"AT+CPWD="SC","0000","5678""#;
        assert_eq!(change_pin(cmd, &mut vars), Err(PinChangeError::WrongOldPin));
    }

    #[test]
    fn change_pin_rejects_short_new_value() {
        let mut vars = VariableStore::new();
        vars.set("PINVALUE", "1234");
        let cmd = r#"AT+CPWD="SC","1234","12""#;
        assert_eq!(change_pin(cmd, &mut vars), Err(PinChangeError::BadNewPinLength));
    }

    #[test]
    fn change_pin_accepts_valid_change() {
        let mut vars = VariableStore::new();
        vars.set("PINVALUE", "1234");
        let cmd = r#"AT+CPWD="SC","1234","5678""#;
        assert!(change_pin(cmd, &mut vars).is_ok());
        assert_eq!(vars.get("PINVALUE"), Some("5678"));
    }
}
