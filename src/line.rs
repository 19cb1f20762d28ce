//! Buffers raw bytes (plain or unwrapped from a GSM 07.10 frame) into
//! complete AT command lines, terminated by `\r`, `\n`, `\r\n`, or `0x1A`.

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    capacity: usize,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends one byte, silently dropping it if the line buffer is already
    /// at capacity. Returns `Some(line)` each time a terminator completes a
    /// command; `\r\n` completes exactly one line, not two.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        if byte == b'\r' || byte == b'\n' || byte == 0x1A {
            if self.buf.is_empty() {
                return None;
            }
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf.clear();
            return Some(line);
        }
        if self.buf.len() < self.capacity {
            self.buf.push(byte);
        }
        None
    }

    /// Feeds a full chunk of bytes, returning every command line completed
    /// along the way, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_cr() {
        let mut la = LineAssembler::new();
        assert_eq!(la.feed(b"AT\r"), vec!["AT".to_string()]);
    }

    #[test]
    fn crlf_completes_a_single_line() {
        let mut la = LineAssembler::new();
        assert_eq!(la.feed(b"AT\r\n"), vec!["AT".to_string()]);
    }

    #[test]
    fn sub_completes_a_line() {
        let mut la = LineAssembler::new();
        assert_eq!(la.feed(&[b'A', b'T', 0x1A]), vec!["AT".to_string()]);
    }

    #[test]
    fn overflow_bytes_are_silently_dropped() {
        let mut la = LineAssembler::with_capacity(4);
        let lines = la.feed(b"ATABCDEF\r");
        assert_eq!(lines, vec!["ATAB".to_string()]);
    }

    #[test]
    fn empty_terminator_run_yields_no_line() {
        let mut la = LineAssembler::new();
        assert_eq!(la.feed(b"\r\r\n"), Vec::<String>::new());
    }
}
