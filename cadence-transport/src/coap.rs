//! CoAP message framing (RFC 7252 subset)
//!
//! ## Message Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Token (if any, TKL bytes) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Options (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Only the Uri-Path option is interpreted. Other options are skipped on
//! decode and never emitted.

use crate::{Error, Result};

const VERSION: u8 = 1;
const HEADER_SIZE: usize = 4;
const MAX_TOKEN_LEN: usize = 8;
const PAYLOAD_MARKER: u8 = 0xFF;
const OPTION_URI_PATH: u16 = 11;

/// Message type (T field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn to_bits(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }
}

/// Message code, `class.detail` packed as `ccc ddddd`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code::new(0, 0);
    pub const GET: Code = Code::new(0, 1);
    pub const POST: Code = Code::new(0, 2);
    pub const VALID: Code = Code::new(2, 3);
    pub const NOT_FOUND: Code = Code::new(4, 4);

    pub const fn new(class: u8, detail: u8) -> Self {
        Code((class << 5) | (detail & 0x1F))
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    /// 2.xx response codes
    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// A decoded CoAP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub uri_path: Vec<String>,
    pub payload: Vec<u8>,
}

impl Message {
    /// Confirmable request with a Uri-Path and payload
    pub fn request(
        code: Code,
        message_id: u16,
        token: Vec<u8>,
        path: &str,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            kind: MessageType::Confirmable,
            code,
            message_id,
            token,
            uri_path: path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            payload,
        }
    }

    /// Piggy-backed acknowledgment echoing `message_id` and `token`
    pub fn ack(code: Code, message_id: u16, token: Vec<u8>) -> Self {
        Self {
            kind: MessageType::Acknowledgement,
            code,
            message_id,
            token,
            uri_path: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// CoAP ping: an empty confirmable message
    pub fn ping(message_id: u16) -> Self {
        Self::empty(MessageType::Confirmable, message_id)
    }

    /// Reset answering `message_id`
    pub fn reset(message_id: u16) -> Self {
        Self::empty(MessageType::Reset, message_id)
    }

    fn empty(kind: MessageType, message_id: u16) -> Self {
        Self {
            kind,
            code: Code::EMPTY,
            message_id,
            token: Vec::new(),
            uri_path: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn is_ping(&self) -> bool {
        self.kind == MessageType::Confirmable && self.code.is_empty()
    }

    /// Uri-Path segments joined with '/'
    pub fn path(&self) -> String {
        self.uri_path.join("/")
    }

    /// Serialize to wire format
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(Error::Codec(format!("token too long: {} bytes", self.token.len())));
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.token.len() + 16 + self.payload.len());
        buf.push((VERSION << 6) | (self.kind.to_bits() << 4) | self.token.len() as u8);
        buf.push(self.code.0);
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.token);

        let mut last_option = 0u16;
        for segment in &self.uri_path {
            let delta = OPTION_URI_PATH - last_option;
            last_option = OPTION_URI_PATH;
            encode_option(&mut buf, delta, segment.as_bytes())?;
        }

        if !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }
        Ok(buf)
    }

    /// Parse from wire format
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Codec(format!("datagram too short: {} bytes", data.len())));
        }

        let version = data[0] >> 6;
        if version != VERSION {
            return Err(Error::Codec(format!("unsupported version {version}")));
        }
        let kind = MessageType::from_bits(data[0] >> 4);
        let token_len = (data[0] & 0x0F) as usize;
        if token_len > MAX_TOKEN_LEN {
            return Err(Error::Codec(format!("invalid token length {token_len}")));
        }
        let code = Code(data[1]);
        let message_id = u16::from_be_bytes([data[2], data[3]]);

        let mut pos = HEADER_SIZE;
        let token = data
            .get(pos..pos + token_len)
            .ok_or_else(|| Error::Codec("truncated token".to_string()))?
            .to_vec();
        pos += token_len;

        let mut uri_path = Vec::new();
        let mut payload = Vec::new();
        let mut option_number = 0u16;

        while pos < data.len() {
            if data[pos] == PAYLOAD_MARKER {
                pos += 1;
                if pos == data.len() {
                    return Err(Error::Codec("payload marker without payload".to_string()));
                }
                payload = data[pos..].to_vec();
                break;
            }

            let header = data[pos];
            pos += 1;
            let delta = read_extended(data, &mut pos, header >> 4)?;
            let length = read_extended(data, &mut pos, header & 0x0F)? as usize;

            option_number = option_number
                .checked_add(delta)
                .ok_or_else(|| Error::Codec("option number overflow".to_string()))?;
            let value = data
                .get(pos..pos + length)
                .ok_or_else(|| Error::Codec("truncated option value".to_string()))?;
            pos += length;

            if option_number == OPTION_URI_PATH {
                let segment = std::str::from_utf8(value)
                    .map_err(|_| Error::Codec("Uri-Path is not UTF-8".to_string()))?;
                uri_path.push(segment.to_string());
            }
        }

        if code.is_empty() && (!token.is_empty() || !uri_path.is_empty() || !payload.is_empty()) {
            return Err(Error::Codec("empty message with content".to_string()));
        }

        Ok(Self { kind, code, message_id, token, uri_path, payload })
    }
}

fn encode_option(buf: &mut Vec<u8>, delta: u16, value: &[u8]) -> Result<()> {
    let length = u16::try_from(value.len())
        .map_err(|_| Error::Codec(format!("option value too long: {} bytes", value.len())))?;
    let (delta_nibble, delta_ext) = split_extended(delta);
    let (length_nibble, length_ext) = split_extended(length);

    buf.push((delta_nibble << 4) | length_nibble);
    buf.extend_from_slice(&delta_ext);
    buf.extend_from_slice(&length_ext);
    buf.extend_from_slice(value);
    Ok(())
}

/// Nibble plus extended bytes for an option delta or length
fn split_extended(value: u16) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, (value - 269).to_be_bytes().to_vec()),
    }
}

fn read_extended(data: &[u8], pos: &mut usize, nibble: u8) -> Result<u16> {
    match nibble {
        0..=12 => Ok(nibble as u16),
        13 => {
            let b = *data.get(*pos).ok_or_else(|| Error::Codec("truncated option".to_string()))?;
            *pos += 1;
            Ok(b as u16 + 13)
        }
        14 => {
            let bytes = data
                .get(*pos..*pos + 2)
                .ok_or_else(|| Error::Codec("truncated option".to_string()))?;
            *pos += 2;
            u16::from_be_bytes([bytes[0], bytes[1]])
                .checked_add(269)
                .ok_or_else(|| Error::Codec("option field overflow".to_string()))
        }
        _ => Err(Error::Codec("reserved option nibble 15".to_string())),
    }
}
