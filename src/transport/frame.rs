//! WebSocket frame encoding.
//!
//! Outbound messages are always a single unfragmented, masked text frame:
//!
//! ```text
//! ┌────────┬──────────────┬───────────────────┬──────────┬────────────────┐
//! │ 0x81   │ 0x80 | len7  │ ext len (0/2/8 B) │ mask (4) │ masked payload │
//! └────────┴──────────────┴───────────────────┴──────────┴────────────────┘
//! ```
//!
//! Inbound bytes are never decoded into messages. [`FrameHeader::parse`]
//! exists only to make received data readable in trace logs.

// ============================================================================
// Constants
// ============================================================================

/// FIN bit of the first header byte.
const FIN_BIT: u8 = 0x80;

/// MASK bit of the second header byte.
const MASK_BIT: u8 = 0x80;

/// Largest length that fits in the 7-bit field.
const MAX_DIRECT_LEN: usize = 125;

/// Marker for a 16-bit extended length.
const EXT_LEN_16: u8 = 126;

/// Marker for a 64-bit extended length.
const EXT_LEN_64: u8 = 127;

// ============================================================================
// OpCode
// ============================================================================

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Reserved opcode.
    Reserved(u8),
}

impl OpCode {
    /// Decodes the low nibble of the first header byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }

    /// Returns the 4-bit wire value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::Reserved(bits) => bits & 0x0F,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Generates a fresh random 4-byte mask key.
#[inline]
#[must_use]
pub fn new_mask_key() -> [u8; 4] {
    rand::random()
}

/// XORs `data` in place with `mask` (index mod 4).
///
/// Applying the same mask twice restores the original bytes.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Encodes `payload` as a masked, final text frame using `mask`.
#[must_use]
pub fn encode_text_frame(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 14);

    frame.push(FIN_BIT | OpCode::Text.bits());

    if len <= MAX_DIRECT_LEN {
        frame.push(MASK_BIT | len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(MASK_BIT | EXT_LEN_16);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(MASK_BIT | EXT_LEN_64);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(&mask);

    let start = frame.len();
    frame.extend_from_slice(payload);
    apply_mask(&mut frame[start..], mask);

    frame
}

// ============================================================================
// FrameHeader
// ============================================================================

/// Decoded frame header, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Mask key, if the frame is masked.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: u64,
    /// Bytes occupied by the header (including mask key).
    pub header_len: usize,
}

impl FrameHeader {
    /// Parses a header from the start of `buf`.
    ///
    /// Returns `None` if `buf` is too short to hold the full header.
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let first = *buf.first()?;
        let second = *buf.get(1)?;

        let masked = second & MASK_BIT != 0;
        let mut offset = 2;

        let payload_len = match second & 0x7F {
            EXT_LEN_16 => {
                let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
                offset += 2;
                u64::from(u16::from_be_bytes(bytes))
            }
            EXT_LEN_64 => {
                let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
                offset += 8;
                u64::from_be_bytes(bytes)
            }
            direct => u64::from(direct),
        };

        let mask = if masked {
            let key: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
            offset += 4;
            Some(key)
        } else {
            None
        };

        Some(Self {
            fin: first & FIN_BIT != 0,
            opcode: OpCode::from_bits(first),
            mask,
            payload_len,
            header_len: offset,
        })
    }

    /// Returns the unmasked payload bytes present in `buf`, possibly truncated.
    #[must_use]
    pub fn payload<'a>(&self, buf: &'a [u8]) -> std::borrow::Cow<'a, [u8]> {
        let available = buf.len().saturating_sub(self.header_len);
        let take = available.min(usize::try_from(self.payload_len).unwrap_or(usize::MAX));
        let bytes = &buf[self.header_len..self.header_len + take];

        match self.mask {
            Some(mask) => {
                let mut owned = bytes.to_vec();
                apply_mask(&mut owned, mask);
                std::borrow::Cow::Owned(owned)
            }
            None => std::borrow::Cow::Borrowed(bytes),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
