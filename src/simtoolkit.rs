//! `AT+CSIM`/`AT+CUSATT`/`AT+CUSATE` SIM toolkit command handling: APDU-like
//! byte-level classification and status-word response construction.

use crate::collaborators::SimApplication;
use crate::hex;
use crate::variables::VariableStore;

const CLA_SIM: u8 = 0xA0;

/// Dispatches one command line. Returns `true` if this handler consumed
/// the command (the router stops here), `false` to let it fall through.
pub fn handle(
    cmd: &str,
    sim_present: bool,
    app: &mut dyn SimApplication,
    vars: &mut VariableStore,
    respond: &mut dyn FnMut(&str),
) -> bool {
    if let Some(hex_pdu) = cmd.strip_prefix("AT+CUSATT=") {
        let bytes = hex::from_hex(hex_pdu).unwrap_or_default();
        if !app.response(&bytes) {
            respond("ERROR");
        }
        return true;
    }

    if let Some(hex_pdu) = cmd.strip_prefix("AT+CUSATE=") {
        let bytes = hex::from_hex(hex_pdu).unwrap_or_default();
        if !app.envelope(&bytes) {
            respond("ERROR");
        }
        return true;
    }

    let Some(rest) = cmd.strip_prefix("AT+CSIM=") else {
        return false;
    };

    let Some(comma) = rest.find(',') else {
        return false;
    };

    if !sim_present {
        return true;
    }

    let param = match hex::from_hex(&rest[comma + 1..]) {
        Ok(p) => p,
        Err(_) => return false,
    };

    csim(&param, app, vars, respond);
    true
}

fn csim(param: &[u8], app: &mut dyn SimApplication, vars: &mut VariableStore, respond: &mut dyn FnMut(&str)) {
    if param.len() < 4 {
        emit_status(respond, &[], 0x67, 0x00);
        return;
    }
    if param[0] != CLA_SIM {
        emit_status(respond, &[], 0x68, 0x00);
        return;
    }

    match param[1] {
        // TERMINAL PROFILE
        0x10 => {
            app.abort();
            emit_ok(respond, app, &[]);
        }
        // FETCH
        0x12 => match app.fetch(true) {
            Some(pending) if !pending.is_empty() => emit_ok(respond, app, &pending),
            _ => emit_status(respond, &[], 0x6F, 0x00),
        },
        // TERMINAL RESPONSE
        0x14 if param.len() >= 5 => {
            if app.response(&param[5..]) {
                emit_ok(respond, app, &[]);
            } else {
                emit_status(respond, &[], 0x6F, 0x00);
            }
        }
        // UNBLOCK CHV (PIN unblock via PUK)
        0x2C if param.len() >= 21 && (param[3] == 0x01 || param[3] == 0x02) && param[4] == 0x10 => {
            let (pin_name, puk_name) = if param[3] == 0x02 {
                ("PIN2VALUE", "PUK2VALUE")
            } else {
                ("PINVALUE", "PUKVALUE")
            };
            let puk = strip_trailing_ff(&param[5..13]);
            let pin = strip_trailing_ff(&param[13..21]);
            let puk_str = String::from_utf8_lossy(&puk).into_owned();
            let pin_str = String::from_utf8_lossy(&pin).into_owned();

            if vars.get(puk_name) != Some(puk_str.as_str()) {
                emit_status(respond, &[], 0x98, 0x04);
            } else {
                vars.set(pin_name, pin_str);
                emit_ok(respond, app, &[]);
            }
        }
        // ENVELOPE
        0xC2 if param.len() >= 5 => {
            if app.envelope(&param[5..]) {
                emit_ok(respond, app, &[]);
            } else {
                emit_status(respond, &[], 0x6F, 0x00);
            }
        }
        // STATUS
        0xF2 => emit_ok(respond, app, &[]),
        _ => emit_status(respond, &[], 0x6D, 0x00),
    }
}

fn strip_trailing_ff(bytes: &[u8]) -> Vec<u8> {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == 0xFF {
        end -= 1;
    }
    bytes[..end].to_vec()
}

/// `9000`, unless a fresh proactive command is already pending, in which
/// case the trailing status word becomes `91<len>` to signal FETCH
/// readiness, per the original's `simCsimOk`.
fn emit_ok(respond: &mut dyn FnMut(&str), app: &mut dyn SimApplication, payload: &[u8]) {
    let mut sw1 = 0x90u8;
    let mut sw2 = 0x00u8;
    if let Some(pending) = app.fetch(true) {
        if !pending.is_empty() {
            sw1 = 0x91;
            sw2 = pending.len() as u8;
        }
    }
    emit_status(respond, payload, sw1, sw2);
}

fn emit_status(respond: &mut dyn FnMut(&str), payload: &[u8], sw1: u8, sw2: u8) {
    let mut bytes = payload.to_vec();
    bytes.push(sw1);
    bytes.push(sw2);
    respond(&format!("+CSIM: {},{}\n\nOK", bytes.len() * 2, hex::to_hex(&bytes)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolkitError {
    MalformedPdu,
}

impl std::fmt::Display for ToolkitError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ToolkitError::MalformedPdu => write!(f, "malformed sim toolkit pdu"),
        }
    }
}

impl std::error::Error for ToolkitError {}
