//! Record decoding for the call log
//!
//! One record per line:
//!
//! ```text
//! callerName,callerIp,responderName,responderIp,success,elapsedMs,epochMillis[,opaque...]
//! rd_A,10.1.2.3,rd_B,10.4.5.6,true,87,1592841600123
//! ```
//!
//! Decoding goes through [`ByteCursor`], a bounds-checked reader over a byte
//! slice: every field read either yields a typed value or a [`DecodeError`],
//! never an out-of-range index. The line format itself sits behind the
//! [`RecordDecoder`] trait so the ingestion pipeline does not depend on it.

use crate::error::DecodeError;
use std::fmt;
use std::net::Ipv4Addr;

/// Milliseconds in one minute bucket
pub const MILLIS_PER_MINUTE: u64 = 60_000;

/// One decoded call record, borrowing service names from the input block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCall<'a> {
    pub caller: &'a str,
    pub caller_ip: u32,
    pub responder: &'a str,
    pub responder_ip: u32,
    pub success: bool,
    pub elapsed_ms: u32,
    pub timestamp_ms: u64,
}

impl RawCall<'_> {
    /// Absolute minute (minutes since the Unix epoch)
    pub fn epoch_minute(&self) -> i64 {
        (self.timestamp_ms / MILLIS_PER_MINUTE) as i64
    }

    /// Packed identity of this record's IP pair
    pub fn pair_key(&self) -> IpPairKey {
        IpPairKey::pack(self.caller_ip, self.responder_ip)
    }
}

/// Identity of an IP pair: low 16 bits of each address, caller first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpPairKey(pub u32);

impl IpPairKey {
    pub fn pack(caller_ip: u32, responder_ip: u32) -> Self {
        IpPairKey(((caller_ip & 0xFFFF) << 16) | (responder_ip & 0xFFFF))
    }
}

impl fmt::Display for IpPairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Render a packed IPv4 address in dotted form
pub fn format_ip(ip: u32) -> String {
    Ipv4Addr::from(ip).to_string()
}

/// Decodes one line (without its terminating newline) into a [`RawCall`]
///
/// Implementations must be pure: the same bytes always decode the same way.
pub trait RecordDecoder: Send {
    fn decode<'a>(&self, line: &'a [u8]) -> Result<RawCall<'a>, DecodeError>;
}

/// Decoder for the comma-delimited log format
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRecordDecoder;

impl RecordDecoder for CsvRecordDecoder {
    fn decode<'a>(&self, line: &'a [u8]) -> Result<RawCall<'a>, DecodeError> {
        let mut cursor = ByteCursor::new(line);
        let caller = cursor.str_field("caller")?;
        let caller_ip = cursor.ip_field("caller_ip")?;
        let responder = cursor.str_field("responder")?;
        let responder_ip = cursor.ip_field("responder_ip")?;
        let success = cursor.bool_field("success")?;
        let elapsed_ms = cursor.u32_field("elapsed_ms")?;
        let timestamp_ms = cursor.u64_field("timestamp_ms")?;
        // Trailing fields are opaque.

        Ok(RawCall {
            caller,
            caller_ip,
            responder,
            responder_ip,
            success,
            elapsed_ms,
            timestamp_ms,
        })
    }
}

/// Bounds-checked field reader over a comma-delimited byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    exhausted: bool,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            exhausted: false,
        }
    }

    /// Byte offset of the next unread field
    pub fn position(&self) -> usize {
        self.pos
    }

    /// True once the last field has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next raw field, consuming the delimiter that ends it
    pub fn field(&mut self, name: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.exhausted {
            return Err(DecodeError::UnexpectedEnd { field: name });
        }
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&b| b == b',') {
            Some(len) => {
                self.pos += len + 1;
                Ok(&rest[..len])
            }
            None => {
                self.pos = self.buf.len();
                self.exhausted = true;
                Ok(rest)
            }
        }
    }

    /// Next field, required to be non-empty
    fn non_empty(&mut self, name: &'static str) -> Result<&'a [u8], DecodeError> {
        let raw = self.field(name)?;
        if raw.is_empty() {
            return Err(DecodeError::MissingField { field: name });
        }
        Ok(raw)
    }

    pub fn str_field(&mut self, name: &'static str) -> Result<&'a str, DecodeError> {
        let raw = self.non_empty(name)?;
        std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn u64_field(&mut self, name: &'static str) -> Result<u64, DecodeError> {
        let raw = self.non_empty(name)?;
        parse_decimal(raw, name)
    }

    pub fn u32_field(&mut self, name: &'static str) -> Result<u32, DecodeError> {
        let value = self.u64_field(name)?;
        u32::try_from(value).map_err(|_| DecodeError::Overflow { field: name })
    }

    pub fn bool_field(&mut self, name: &'static str) -> Result<bool, DecodeError> {
        match self.non_empty(name)? {
            b"true" => Ok(true),
            b"false" => Ok(false),
            _ => Err(DecodeError::InvalidBool),
        }
    }

    /// Dotted IPv4 address packed big-endian into a `u32`
    pub fn ip_field(&mut self, name: &'static str) -> Result<u32, DecodeError> {
        let raw = self.non_empty(name)?;
        let mut ip: u32 = 0;
        let mut octets = 0;
        for part in raw.split(|&b| b == b'.') {
            if part.is_empty() || part.len() > 3 {
                return Err(DecodeError::InvalidIp { field: name });
            }
            let octet = parse_decimal(part, name)?;
            if octet > 255 {
                return Err(DecodeError::InvalidIp { field: name });
            }
            ip = (ip << 8) | octet as u32;
            octets += 1;
        }
        if octets != 4 {
            return Err(DecodeError::InvalidIp { field: name });
        }
        Ok(ip)
    }
}

fn parse_decimal(raw: &[u8], field: &'static str) -> Result<u64, DecodeError> {
    raw.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return Err(DecodeError::InvalidDigit { field, byte: b });
        }
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(DecodeError::Overflow { field })
    })
}
