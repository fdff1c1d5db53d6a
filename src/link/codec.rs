//! Word-level encoding of [`StatusEvent`] for the inter-context channel.
//!
//! Every event becomes a [`Frame`] of one or two 32-bit words. The high half
//! of the first word carries either the attempt number or one of the reserved
//! tags, the low half carries the status or payload:
//!
//! | event                 | high 16     | low 16          | extra word       |
//! |-----------------------|-------------|-----------------|------------------|
//! | `WifiStatus`          | attempt     | status code     | -                |
//! | `IpAssigned`          | `0xFFFE`    | `0`             | address, BE      |
//! | `PingAck`             | `0x9999`    | `0` ok, `1` err | -                |

use core::net::Ipv4Addr;

pub const TAG_IP_FOLLOWS: u16 = 0xFFFE;
pub const TAG_PING_ACK: u16 = 0x9999;
/// Largest attempt number the attempt field may ever carry. Raising it must
/// keep it below both reserved tags.
pub const ATTEMPT_CEILING: u16 = 0x00FF;

const STATUS_MAX_VALID: u16 = LinkStatus::Failed.code();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Initializing,
    Connected,
    Failed,
    Unknown,
}

impl LinkStatus {
    pub const fn code(self) -> u16 {
        match self {
            Self::Initializing => 0,
            Self::Connected => 1,
            Self::Failed => 2,
            Self::Unknown => 3,
        }
    }

    pub const fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Initializing,
            1 => Self::Connected,
            2 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Connected => "CONNECTED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    WifiStatus { attempt: u16, status: LinkStatus },
    IpAssigned { addr: Ipv4Addr },
    PingAck { ok: bool },
}

impl StatusEvent {
    pub const fn wifi(attempt: u16, status: LinkStatus) -> Self {
        Self::WifiStatus { attempt, status }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    words: [u32; 2],
    len: u8,
}

impl Frame {
    pub const MAX_WORDS: usize = 2;

    const fn single(word: u32) -> Self {
        Self {
            words: [word, 0],
            len: 1,
        }
    }

    const fn pair(first: u32, second: u32) -> Self {
        Self {
            words: [first, second],
            len: 2,
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.len as usize]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Result of decoding the first word of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decoded {
    Event(StatusEvent),
    /// The next channel word is the address of an `IpAssigned` event.
    AddressFollows,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    InvalidStatus { attempt: u16, status: u16 },
}

impl DecodeError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidStatus { .. } => "invalid_status",
        }
    }
}

const fn pack(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

pub const fn encode_address(addr: Ipv4Addr) -> u32 {
    u32::from_be_bytes(addr.octets())
}

pub const fn decode_address(word: u32) -> Ipv4Addr {
    let [a, b, c, d] = word.to_be_bytes();
    Ipv4Addr::new(a, b, c, d)
}

pub const fn encode(event: StatusEvent) -> Frame {
    match event {
        StatusEvent::WifiStatus { attempt, status } => Frame::single(pack(attempt, status.code())),
        StatusEvent::IpAssigned { addr } => {
            Frame::pair(pack(TAG_IP_FOLLOWS, 0), encode_address(addr))
        }
        StatusEvent::PingAck { ok } => Frame::single(pack(TAG_PING_ACK, if ok { 0 } else { 1 })),
    }
}

pub const fn decode(word: u32) -> Result<Decoded, DecodeError> {
    let tag = (word >> 16) as u16;
    let low = (word & 0xFFFF) as u16;

    if tag == TAG_IP_FOLLOWS {
        return Ok(Decoded::AddressFollows);
    }
    if tag == TAG_PING_ACK {
        return Ok(Decoded::Event(StatusEvent::PingAck { ok: low == 0 }));
    }
    if low > STATUS_MAX_VALID {
        return Err(DecodeError::InvalidStatus {
            attempt: tag,
            status: low,
        });
    }
    Ok(Decoded::Event(StatusEvent::WifiStatus {
        attempt: tag,
        status: LinkStatus::from_code(low),
    }))
}
