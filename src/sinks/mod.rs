//! Output collaborators of the dispatch loop.
//!
//! The loop only talks to the traits below. Concrete sinks live in the
//! submodules and are wired together by the firmware.

pub mod mqtt;
#[cfg(feature = "graphics")]
pub mod oled;
pub mod rgb;

use embassy_time::Instant;

use crate::config::BrokerConfig;

/// Three-channel intensity, each channel in `0..=0xFFFF`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl Rgb {
    pub const OFF: Self = Self::new(0, 0, 0);
    pub const RED: Self = Self::new(0xFFFF, 0, 0);
    pub const GREEN: Self = Self::new(0, 0xFFFF, 0);
    pub const BLUE: Self = Self::new(0, 0, 0xFFFF);
    pub const YELLOW: Self = Self::new(0xFFFF, 0xFFFF, 0);
    pub const WHITE: Self = Self::new(0xFFFF, 0xFFFF, 0xFFFF);

    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b }
    }
}

/// Text rows of the status panel, 16 px apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayLine {
    Status,
    Network,
    Ack,
    Broker,
}

impl DisplayLine {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [Self::Status, Self::Network, Self::Ack, Self::Broker];

    pub const fn index(self) -> usize {
        match self {
            Self::Status => 0,
            Self::Network => 1,
            Self::Ack => 2,
            Self::Broker => 3,
        }
    }

    pub const fn top_px(self) -> i32 {
        self.index() as i32 * 16
    }
}

/// Fire-and-forget text output. A shown line stays up for the sink's hold
/// time and is cleared by a later `service` call.
pub trait StatusDisplay {
    fn show(&mut self, line: DisplayLine, text: &str, now: Instant);
    fn service(&mut self, now: Instant);
}

pub trait Indicator {
    fn set_color(&mut self, color: Rgb);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishError {
    NotStarted,
    NotConnected,
    QueueFull,
    TooLarge,
}

impl PublishError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NO CLIENT",
            Self::NotConnected => "DISCONNECTED",
            Self::QueueFull => "PUB FAILED",
            Self::TooLarge => "TOO LARGE",
        }
    }
}

/// Broker session changes reported back by the publish client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Failed,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Failed => "FAILED",
        }
    }
}

/// Submission side of the publish client. Both calls only queue work;
/// publish completions come back as `PingAck` events on the word channel.
pub trait Publisher {
    fn connect(&mut self, broker: BrokerConfig) -> Result<(), PublishError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
    fn session_change(&mut self) -> Option<SessionState>;
}
