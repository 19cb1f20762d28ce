//! Response pipeline: variable expansion, then escape expansion, producing
//! the exact bytes a chat response or unsolicited notification puts on the
//! wire. Delay scheduling and the actual framed write live in
//! [`crate::session`], which owns the socket and the scheduler.

use crate::variables::VariableStore;

/// `\<a-z>` maps to the ASCII control character at that letter's alphabet
/// index; most letters map to themselves (so `\c`, `\d`, … are no-ops other
/// than dropping the backslash), matching the fixed table in the original.
const ESCAPES: [u8; 26] = [
    0x07, 0x08, b'c', b'd', b'e', 0x0C, b'g', b'h', b'i', b'j', b'k', b'l', b'm', 0x0A, b'o',
    b'p', b'q', 0x0D, b's', 0x09, b'u', 0x0B, b'w', b'x', b'y', b'z',
];

/// Expands `${name}` references against `vars`, then escape-expands the
/// result, returning the exact bytes to write (see [`escape_expand`]).
pub fn build(text: &str, vars: &VariableStore, eol: bool) -> Vec<u8> {
    let expanded = vars.expand(text);
    escape_expand(&expanded, eol)
}

/// Prepends `\r\n`; turns every literal `\n` into `\r\n`; interprets
/// `\<a-z>` via [`ESCAPES`]; drops bare `\r`; passes an unrecognized
/// `\<x>` through as a literal backslash followed by `x`. If `eol` and the
/// last emitted byte was not `\n`, appends a trailing `\r\n`.
pub fn escape_expand(text: &str, eol: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 8);
    out.push(b'\r');
    out.push(b'\n');

    let bytes = text.as_bytes();
    let mut i = 0;
    let mut last = 0u8;

    while i < bytes.len() {
        let ch = bytes[i];
        if ch == b'\n' {
            out.push(b'\r');
            out.push(b'\n');
            last = b'\n';
            i += 1;
            continue;
        }
        if ch == b'\\' {
            i += 1;
            if i >= bytes.len() {
                out.push(b'\\');
                break;
            }
            let escaped = bytes[i];
            if escaped == b'n' {
                out.push(b'\r');
                out.push(b'\n');
                last = b'\n';
            } else if escaped.is_ascii_lowercase() {
                let mapped = ESCAPES[(escaped - b'a') as usize];
                out.push(mapped);
                last = mapped;
            } else {
                out.push(b'\\');
                out.push(escaped);
                last = escaped;
            }
            i += 1;
            continue;
        }
        if ch != b'\r' {
            out.push(ch);
            last = ch;
        }
        i += 1;
    }

    if eol && last != b'\n' {
        out.push(b'\r');
        out.push(b'\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_prefixes_crlf() {
        assert_eq!(&escape_expand("OK", false)[..2], b"\r\n");
    }

    #[test]
    fn literal_newline_becomes_crlf() {
        assert_eq!(escape_expand("A\nB", false), b"\r\nA\r\nB");
    }

    #[test]
    fn bare_cr_is_dropped() {
        assert_eq!(escape_expand("A\rB", false), b"\r\nAB");
    }

    #[test]
    fn escaped_r_maps_to_bare_cr() {
        assert_eq!(escape_expand("A\\rB", false), b"\r\nA\rB");
    }

    #[test]
    fn escaped_t_maps_to_tab() {
        assert_eq!(escape_expand("\\t", false), b"\r\n\t");
    }

    #[test]
    fn unknown_escape_passes_through_literally() {
        assert_eq!(escape_expand("\\Z", false), b"\r\n\\Z");
    }

    #[test]
    fn eol_appends_trailing_crlf_unless_already_present() {
        assert_eq!(escape_expand("OK", true), b"\r\nOK\r\n");
        assert_eq!(escape_expand("OK\n", true), b"\r\nOK\r\n");
    }

    #[test]
    fn build_expands_variables_before_escaping() {
        let mut vars = VariableStore::new();
        vars.set("X", "42");
        assert_eq!(build("V=${X}", &vars, false), b"\r\nV=42");
    }
}
