//! Command router: the phonebook (`AT+CPBS`/`AT+CPBR`/`AT+CPBW`) command
//! family, and the small formatting/parsing helpers it needs. The full
//! fixed-precedence chain from spec §4.2 is driven by
//! [`crate::session::SimulatorSession`], which owns the collaborators and
//! rule-engine state this module doesn't have access to; this module
//! supplies the phonebook leaf of that chain.

use crate::phonebook::{self, PhonebookEntry, PhonebookSet};
use crate::variables::VariableStore;

/// Handles `AT+CPBS…`/`AT+CPBR…`/`AT+CPBW…`, gated on `PINNAME == "READY"`.
pub fn dispatch_phonebook(phonebooks: &mut PhonebookSet, vars: &mut VariableStore, line: &str, respond: &mut dyn FnMut(&str)) {
    if vars.get("PINNAME") != Some("READY") {
        respond("ERROR");
        return;
    }

    if line == "AT+CPBS=?" {
        let names: Vec<String> = phonebooks.names().iter().map(|n| format!("\"{n}\"")).collect();
        respond(&format!("+CPBS: ({})\nOK", names.join(",")));
        return;
    }

    if line == "AT+CPBS?" {
        let book = phonebooks.current();
        respond(&format!("+CPBS: \"{}\",{},{}\nOK", phonebooks.current_name(), book.used(), book.size()));
        return;
    }

    if let Some(args) = line.strip_prefix("AT+CPBS=") {
        let fields = split_args(args);
        let Some(name) = fields.first().map(|s| unquote(s)) else {
            respond("ERROR");
            return;
        };
        if phonebooks.get(&name).is_none() {
            respond("ERROR");
            return;
        }
        if let Some(pw) = fields.get(1).map(|s| unquote(s)) {
            if vars.get("PIN2VALUE") != Some(pw.as_str()) {
                respond("ERROR");
                return;
            }
        }
        phonebooks.select(&name).expect("just checked existence");
        respond("OK");
        return;
    }

    if line == "AT+CPBR=?" {
        let size = phonebooks.current().size();
        respond(&format!(
            "+CPBR: (1-{}),{},{},{},{},{},{},{}\nOK",
            size,
            phonebook::NUMBER_CAP,
            phonebook::NAME_CAP,
            phonebook::GROUP_CAP,
            phonebook::SECOND_TEXT_CAP,
            phonebook::EMAIL_CAP,
            phonebook::SIP_URI_CAP,
            phonebook::TEL_URI_CAP,
        ));
        return;
    }

    if let Some(args) = line.strip_prefix("AT+CPBR=") {
        let fields = split_args(args);
        let Some(a) = fields.first().and_then(|s| s.parse::<usize>().ok()) else {
            respond("ERROR");
            return;
        };
        let b = fields.get(1).and_then(|s| s.parse::<usize>().ok()).unwrap_or(a);
        let ucs2 = vars.get("SCS") == Some("UCS2");
        let mut lines = Vec::new();
        for (idx, entry) in phonebooks.current().iter_occupied(a, b) {
            lines.push(format_cpbr_line(idx, entry, ucs2));
        }
        lines.push("OK".to_string());
        respond(&lines.join("\n"));
        return;
    }

    if let Some(args) = line.strip_prefix("AT+CPBW=") {
        dispatch_cpbw(phonebooks, args, respond);
        return;
    }

    respond("ERROR");
}

/// 3GPP 27.007 number type: 145 (international, leading `+`) or 129
/// (national/unknown), same derivation `AT+CPBW` already decodes from.
fn number_type(number: &str) -> u16 {
    if number.starts_with('+') {
        145
    } else {
        129
    }
}

fn format_cpbr_line(index: usize, entry: &PhonebookEntry, ucs2: bool) -> String {
    let text_field = |s: &str| if ucs2 { phonebook::ucs2_hex_encode(s) } else { s.to_string() };

    let mut parts = vec![format!(
        "+CPBR: {},\"{}\",{},\"{}\"",
        index,
        entry.number,
        number_type(&entry.number),
        text_field(&entry.name)
    )];

    // Trailing optional fields are emitted in order, stopping at the first
    // absent one: hidden uses the -1 sentinel, the rest use an empty string.
    let optional: Vec<(bool, String)> = vec![
        (entry.hidden != phonebook::HIDDEN_UNSET, entry.hidden.to_string()),
        (!entry.group.is_empty(), format!("\"{}\"", text_field(&entry.group))),
        (
            !entry.additional_number.is_empty(),
            format!("\"{}\",{}", entry.additional_number, number_type(&entry.additional_number)),
        ),
        (!entry.second_text.is_empty(), format!("\"{}\"", text_field(&entry.second_text))),
        (!entry.email.is_empty(), format!("\"{}\"", text_field(&entry.email))),
        (!entry.sip_uri.is_empty(), format!("\"{}\"", text_field(&entry.sip_uri))),
        (!entry.tel_uri.is_empty(), format!("\"{}\"", text_field(&entry.tel_uri))),
    ];
    for (present, value) in optional {
        if !present {
            break;
        }
        parts.push(value);
    }
    parts.join(",")
}

fn dispatch_cpbw(phonebooks: &mut PhonebookSet, args: &str, respond: &mut dyn FnMut(&str)) {
    let fields = split_args(args);
    let Some(index) = fields.first().and_then(|s| s.parse::<usize>().ok()) else {
        respond("ERROR");
        return;
    };
    if !phonebooks.current().in_range(index) {
        respond("ERROR");
        return;
    }

    if fields.len() <= 1 {
        match phonebooks.current_mut().clear(index) {
            Ok(()) => respond("OK"),
            Err(_) => respond("ERROR"),
        }
        return;
    }

    // fields[0] is the index, already consumed above; the remaining fields
    // are number,type,name,group,adNumber,adType,secondText,email,sipUri,telUri,hidden.
    let get = |i: usize| fields.get(i).map(|s| unquote(s)).unwrap_or_default();
    let number_type: u16 = fields.get(2).and_then(|s| s.parse().ok()).unwrap_or(129);
    let adnumber_type: u16 = fields.get(6).and_then(|s| s.parse().ok()).unwrap_or(129);

    let entry = PhonebookEntry {
        number: decode_number(&get(1), number_type),
        name: get(3),
        group: get(4),
        additional_number: decode_number(&get(5), adnumber_type),
        second_text: get(7),
        email: get(8),
        sip_uri: get(9),
        tel_uri: get(10),
        hidden: fields.get(11).and_then(|s| s.parse().ok()).unwrap_or(phonebook::HIDDEN_UNSET),
    };

    match phonebooks.current_mut().write(index, entry) {
        Ok(()) => respond("OK"),
        Err(_) => respond("ERROR"),
    }
}

/// International-format numbers (`type == 145`) are normalized to carry a
/// leading `+`; every other type is stored as given.
fn decode_number(raw: &str, number_type: u16) -> String {
    if number_type == 145 && !raw.is_empty() && !raw.starts_with('+') {
        format!("+{raw}")
    } else {
        raw.to_string()
    }
}

/// Splits `args` on top-level commas, respecting `"`-quoted segments so a
/// comma inside a quoted field doesn't end it.
fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in args.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    out.push(current);
    out
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(f: impl FnOnce(&mut dyn FnMut(&str))) -> String {
        let mut out = String::new();
        let mut respond = |s: &str| out = s.to_string();
        f(&mut respond);
        out
    }

    #[test]
    fn phonebook_gated_by_pinname_ready() {
        let mut phonebooks = PhonebookSet::new();
        let mut vars = VariableStore::new();
        let out = collect(|r| dispatch_phonebook(&mut phonebooks, &mut vars, "AT+CPBS?", r));
        assert_eq!(out, "ERROR");
    }

    #[test]
    fn cpbs_query_reports_current_book() {
        let mut phonebooks = PhonebookSet::new();
        let mut vars = VariableStore::new();
        vars.set("PINNAME", "READY");
        let out = collect(|r| dispatch_phonebook(&mut phonebooks, &mut vars, "AT+CPBS?", r));
        assert_eq!(out, "+CPBS: \"SM\",0,150");
    }

    #[test]
    fn cpbs_set_rejects_unknown_book() {
        let mut phonebooks = PhonebookSet::new();
        let mut vars = VariableStore::new();
        vars.set("PINNAME", "READY");
        let out = collect(|r| dispatch_phonebook(&mut phonebooks, &mut vars, "AT+CPBS=\"FD\"", r));
        assert_eq!(out, "ERROR");
    }

    #[test]
    fn cpbw_rejects_overlong_name_accepts_cap_length() {
        let mut phonebooks = PhonebookSet::new();
        let mut vars = VariableStore::new();
        vars.set("PINNAME", "READY");

        let long_name = "a".repeat(phonebook::NAME_CAP + 1);
        let out = collect(|r| {
            dispatch_phonebook(&mut phonebooks, &mut vars, &format!(r#"AT+CPBW=1,"123",129,"{long_name}""#), r)
        });
        assert_eq!(out, "ERROR");

        let ok_name = "a".repeat(phonebook::NAME_CAP);
        let out =
            collect(|r| dispatch_phonebook(&mut phonebooks, &mut vars, &format!(r#"AT+CPBW=1,"123",129,"{ok_name}""#), r));
        assert_eq!(out, "OK");
    }

    #[test]
    fn cpbw_bare_index_clears_slot() {
        let mut phonebooks = PhonebookSet::new();
        phonebooks
            .current_mut()
            .write(1, PhonebookEntry { number: "123".into(), ..Default::default() })
            .unwrap();
        let mut vars = VariableStore::new();
        vars.set("PINNAME", "READY");
        let out = collect(|r| dispatch_phonebook(&mut phonebooks, &mut vars, "AT+CPBW=1", r));
        assert_eq!(out, "OK");
        assert_eq!(phonebooks.current().used(), 0);
    }

    #[test]
    fn cpbr_emits_one_line_per_occupied_slot_then_ok() {
        let mut phonebooks = PhonebookSet::new();
        phonebooks
            .current_mut()
            .write(
                1,
                PhonebookEntry {
                    number: "123".into(),
                    name: "Alice".into(),
                    hidden: phonebook::HIDDEN_UNSET,
                    ..Default::default()
                },
            )
            .unwrap();
        let mut vars = VariableStore::new();
        vars.set("PINNAME", "READY");
        let out = collect(|r| dispatch_phonebook(&mut phonebooks, &mut vars, "AT+CPBR=1,5", r));
        assert_eq!(out, "+CPBR: 1,\"123\",129,\"Alice\"\nOK");
    }
}
