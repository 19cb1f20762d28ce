//! GSM 07.10 basic-option framer/deframer with short headers only.
//!
//! Frame layout: `0xF9 | addr | ctrl | len | payload(0..=31) | crc | 0xF9`.
//! `addr` and `len` each carry an EA (extension) flag in bit 0, always set
//! here since only short (single-byte) headers are produced or accepted.
//! The CRC is computed over the three header bytes only, never the payload.

pub const MAX_PAYLOAD: usize = 31;
pub const FLAG: u8 = 0xF9;

const UIH: u8 = 0xEF;

#[rustfmt::skip]
const CRC_TABLE: [u8; 256] = [
    0x00, 0x91, 0xE3, 0x72, 0x07, 0x96, 0xE4, 0x75,
    0x0E, 0x9F, 0xED, 0x7C, 0x09, 0x98, 0xEA, 0x7B,
    0x1C, 0x8D, 0xFF, 0x6E, 0x1B, 0x8A, 0xF8, 0x69,
    0x12, 0x83, 0xF1, 0x60, 0x15, 0x84, 0xF6, 0x67,
    0x38, 0xA9, 0xDB, 0x4A, 0x3F, 0xAE, 0xDC, 0x4D,
    0x36, 0xA7, 0xD5, 0x44, 0x31, 0xA0, 0xD2, 0x43,
    0x24, 0xB5, 0xC7, 0x56, 0x23, 0xB2, 0xC0, 0x51,
    0x2A, 0xBB, 0xC9, 0x58, 0x2D, 0xBC, 0xCE, 0x5F,
    0x70, 0xE1, 0x93, 0x02, 0x77, 0xE6, 0x94, 0x05,
    0x7E, 0xEF, 0x9D, 0x0C, 0x79, 0xE8, 0x9A, 0x0B,
    0x6C, 0xFD, 0x8F, 0x1E, 0x6B, 0xFA, 0x88, 0x19,
    0x62, 0xF3, 0x81, 0x10, 0x65, 0xF4, 0x86, 0x17,
    0x48, 0xD9, 0xAB, 0x3A, 0x4F, 0xDE, 0xAC, 0x3D,
    0x46, 0xD7, 0xA5, 0x34, 0x41, 0xD0, 0xA2, 0x33,
    0x54, 0xC5, 0xB7, 0x26, 0x53, 0xC2, 0xB0, 0x21,
    0x5A, 0xCB, 0xB9, 0x28, 0x5D, 0xCC, 0xBE, 0x2F,
    0xE0, 0x71, 0x03, 0x92, 0xE7, 0x76, 0x04, 0x95,
    0xEE, 0x7F, 0x0D, 0x9C, 0xE9, 0x78, 0x0A, 0x9B,
    0xFC, 0x6D, 0x1F, 0x8E, 0xFB, 0x6A, 0x18, 0x89,
    0xF2, 0x63, 0x11, 0x80, 0xF5, 0x64, 0x16, 0x87,
    0xD8, 0x49, 0x3B, 0xAA, 0xDF, 0x4E, 0x3C, 0xAD,
    0xD6, 0x47, 0x35, 0xA4, 0xD1, 0x40, 0x32, 0xA3,
    0xC4, 0x55, 0x27, 0xB6, 0xC3, 0x52, 0x20, 0xB1,
    0xCA, 0x5B, 0x29, 0xB8, 0xCD, 0x5C, 0x2E, 0xBF,
    0x90, 0x01, 0x73, 0xE2, 0x97, 0x06, 0x74, 0xE5,
    0x9E, 0x0F, 0x7D, 0xEC, 0x99, 0x08, 0x7A, 0xEB,
    0x8C, 0x1D, 0x6F, 0xFE, 0x8B, 0x1A, 0x68, 0xF9,
    0x82, 0x13, 0x61, 0xF0, 0x85, 0x14, 0x66, 0xF7,
    0xA8, 0x39, 0x4B, 0xDA, 0xAF, 0x3E, 0x4C, 0xDD,
    0xA6, 0x37, 0x45, 0xD4, 0xA1, 0x30, 0x42, 0xD3,
    0xB4, 0x25, 0x57, 0xC6, 0xB3, 0x22, 0x50, 0xC1,
    0xBA, 0x2B, 0x59, 0xC8, 0xBD, 0x2C, 0x5E, 0xCF,
];

fn compute_crc(header: &[u8]) -> u8 {
    let mut sum: u8 = 0xFF;
    for &b in header {
        sum = CRC_TABLE[(sum ^ b) as usize];
    }
    0xFF_u8.wrapping_sub(sum)
}

/// One decoded GSM 07.10 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: u8,
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn is_data(&self) -> bool {
        self.frame_type == UIH || self.frame_type == 0x03
    }

    pub fn is_disc_terminate(&self) -> bool {
        self.channel == 0 && self.payload == [0xC3, 0x01]
    }
}

/// Encodes `data` as one or more UIH frames on `channel`, each carrying at
/// most [`MAX_PAYLOAD`] bytes, appended to `out`.
pub fn encode(channel: u8, data: &[u8], out: &mut Vec<u8>) {
    if data.is_empty() {
        out.extend_from_slice(&encode_one(channel, UIH, &[]));
        return;
    }
    for chunk in data.chunks(MAX_PAYLOAD) {
        out.extend_from_slice(&encode_one(channel, UIH, chunk));
    }
}

fn encode_one(channel: u8, frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let addr = (channel << 2) | 0x03;
    let len_byte = ((payload.len() as u8) << 1) | 0x01;
    let header = [addr, frame_type, len_byte];
    let crc = compute_crc(&header);

    let mut frame = Vec::with_capacity(payload.len() + 6);
    frame.push(FLAG);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    frame.push(crc);
    frame.push(FLAG);
    frame
}

/// Result of attempting to decode one frame out of a buffer.
pub enum Decoded {
    /// A well-formed frame, plus how many bytes of `buf` it consumed.
    Frame(Frame, usize),
    /// The buffer doesn't (yet) contain a complete frame.
    Incomplete,
    /// A malformed frame or stray byte; skip `usize` bytes and retry.
    Skip(usize),
}

/// Attempts to decode a single frame starting at `buf[0]`. The caller is
/// expected to have already located a leading `0xF9` and skipped any run of
/// extra `0xF9` bytes between frames.
pub fn decode_one(buf: &[u8]) -> Decoded {
    if buf.is_empty() {
        return Decoded::Incomplete;
    }
    if buf[0] != FLAG {
        return Decoded::Skip(1);
    }
    if buf.len() < 4 {
        return Decoded::Incomplete;
    }
    // Both EA bits (addr, len) must be set; we only understand short headers.
    if buf[1] & 0x01 == 0 || buf[3] & 0x01 == 0 {
        return Decoded::Skip(1);
    }

    let len = ((buf[3] >> 1) & 0x7F) as usize;
    if buf.len() < 5 + len {
        return Decoded::Incomplete;
    }

    let crc = compute_crc(&buf[1..4]);
    if crc != buf[4 + len] {
        return Decoded::Skip(len + 5);
    }

    let channel = (buf[1] >> 2) & 0x3F;
    let frame_type = buf[2] & 0xEF;
    let payload = buf[4..4 + len].to_vec();

    Decoded::Frame(
        Frame {
            channel,
            frame_type,
            payload,
        },
        len + 5,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_preserves_payload_and_channel() {
        let mut buf = Vec::new();
        encode(1, b"AT\r", &mut buf);
        match decode_one(&buf) {
            Decoded::Frame(frame, consumed) => {
                assert_eq!(frame.channel, 1);
                assert_eq!(frame.payload, b"AT\r");
                assert_eq!(consumed, buf.len());
                assert!(frame.is_data());
            }
            _ => panic!("expected a decoded frame"),
        }
    }

    #[test]
    fn detects_disc_terminate_on_channel_zero() {
        let mut buf = Vec::new();
        encode(0, &[0xC3, 0x01], &mut buf);
        match decode_one(&buf) {
            Decoded::Frame(frame, _) => assert!(frame.is_disc_terminate()),
            _ => panic!("expected a decoded frame"),
        }
    }

    #[test]
    fn bad_crc_skips_the_frame() {
        let mut buf = Vec::new();
        encode(1, b"AT\r", &mut buf);
        let last = buf.len() - 2;
        buf[last] ^= 0xFF;
        match decode_one(&buf) {
            Decoded::Skip(n) => assert_eq!(n, buf.len()),
            _ => panic!("expected a skip on bad crc"),
        }
    }

    #[test]
    fn incomplete_header_reports_incomplete() {
        let buf = [FLAG, 0x07];
        assert!(matches!(decode_one(&buf), Decoded::Incomplete));
    }

    #[test]
    fn empty_buffer_reports_incomplete_not_skip() {
        // A caller that loops `decode_one` + drain until the buffer is
        // empty must see `Incomplete` here, or it spins forever never
        // making progress (draining 0 bytes from an empty buffer).
        assert!(matches!(decode_one(&[]), Decoded::Incomplete));
    }

    #[test]
    fn stray_non_flag_bytes_are_skipped_one_at_a_time_to_exhaustion() {
        let mut buf = b"AT\r".to_vec();
        let mut skips = 0;
        loop {
            match decode_one(&buf) {
                Decoded::Incomplete => break,
                Decoded::Skip(n) => {
                    buf.drain(..n.min(buf.len()));
                    skips += 1;
                    assert!(skips <= 10, "did not converge to Incomplete");
                }
                Decoded::Frame(..) => panic!("no flag byte present, should never decode a frame"),
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn chunks_oversized_payload_into_multiple_frames() {
        let data = vec![b'x'; MAX_PAYLOAD + 5];
        let mut buf = Vec::new();
        encode(2, &data, &mut buf);

        let mut collected = Vec::new();
        let mut offset = 0;
        while offset < buf.len() {
            match decode_one(&buf[offset..]) {
                Decoded::Frame(frame, consumed) => {
                    collected.extend_from_slice(&frame.payload);
                    offset += consumed;
                }
                other => panic!("unexpected decode result at {offset}: {:?}", matches!(other, Decoded::Incomplete)),
            }
        }
        assert_eq!(collected, data);
    }
}
