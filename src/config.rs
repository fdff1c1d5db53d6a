use core::net::Ipv4Addr;

use crate::link::codec::{ATTEMPT_CEILING, TAG_IP_FOLLOWS, TAG_PING_ACK};

pub const MAX_ATTEMPTS: u16 = 5;
pub const RETRY_INTERVAL_MS: u64 = 2_000;
pub const JOIN_TIMEOUT_MS: u64 = 3_000;
pub const MONITOR_INTERVAL_MS: u64 = 2_000;
pub const MAILBOX_CAPACITY: usize = 16;
// Depth of the hardware inter-core FIFO the word protocol was sized for.
pub const CHANNEL_DEPTH: usize = 8;
pub const PING_INTERVAL_MS: u64 = 5_000;
pub const NOTICE_HOLD_MS: u64 = 3_000;
pub const ACK_FLASH_MS: u64 = 1_000;
// Upper bound for the dispatch loop wait when no deadline is pending.
pub const DISPATCH_IDLE_WAIT_MS: u64 = 50;

pub const PING_TOPIC: &str = "pico/PING";
pub const PING_PAYLOAD: &[u8] = b"PING";
pub const ONLINE_PAYLOAD: &[u8] = b"online";
pub const MQTT_CLIENT_ID: &str = "corelink";
pub const MQTT_DEFAULT_PORT: u16 = 1883;
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;

pub const WIFI_SSID_MAX: usize = 32;
pub const WIFI_PASSWORD_MAX: usize = 64;

const _: () = assert!(MAX_ATTEMPTS >= 1 && MAX_ATTEMPTS <= ATTEMPT_CEILING);
const _: () = assert!((ATTEMPT_CEILING as u32) < TAG_PING_ACK as u32);
const _: () = assert!((ATTEMPT_CEILING as u32) < TAG_IP_FOLLOWS as u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wpa2Personal,
    WpaWpa2Personal,
    Wpa3Personal,
}

impl AuthMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wpa2Personal => "wpa2_personal",
            Self::WpaWpa2Personal => "wpa_wpa2_personal",
            Self::Wpa3Personal => "wpa3_personal",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: [u8; WIFI_SSID_MAX],
    pub ssid_len: u8,
    pub password: [u8; WIFI_PASSWORD_MAX],
    pub password_len: u8,
}

impl WifiCredentials {
    pub fn from_parts(ssid: &[u8], password: &[u8]) -> Result<Self, &'static str> {
        if ssid.is_empty() || ssid.len() > WIFI_SSID_MAX || password.len() > WIFI_PASSWORD_MAX {
            return Err("invalid wifi credentials length");
        }
        let mut result = Self {
            ssid: [0u8; WIFI_SSID_MAX],
            ssid_len: ssid.len() as u8,
            password: [0u8; WIFI_PASSWORD_MAX],
            password_len: password.len() as u8,
        };
        result.ssid[..ssid.len()].copy_from_slice(ssid);
        result.password[..password.len()].copy_from_slice(password);
        Ok(result)
    }

    pub fn ssid(&self) -> Option<&str> {
        core::str::from_utf8(&self.ssid[..self.ssid_len as usize]).ok()
    }

    pub fn password(&self) -> Option<&str> {
        core::str::from_utf8(&self.password[..self.password_len as usize]).ok()
    }

    /// Open networks are joined without a passphrase regardless of the
    /// requested mode.
    pub fn auth_mode(&self, requested: AuthMode) -> AuthMode {
        if self.password_len == 0 {
            AuthMode::Open
        } else {
            requested
        }
    }
}

pub fn compiled_wifi_credentials() -> Option<WifiCredentials> {
    let ssid = option_env!("CORELINK_WIFI_SSID").or(option_env!("SSID"))?;
    let password = option_env!("CORELINK_WIFI_PASSWORD")
        .or(option_env!("PASSWORD"))
        .unwrap_or("");
    WifiCredentials::from_parts(ssid.as_bytes(), password.as_bytes()).ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl BrokerConfig {
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// Parses `a.b.c.d` or `a.b.c.d:port`.
    pub fn parse(text: &str) -> Option<Self> {
        let (host, port) = match text.split_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()?),
            None => (text, MQTT_DEFAULT_PORT),
        };
        let address = host.parse::<Ipv4Addr>().ok()?;
        Some(Self { address, port })
    }
}

pub fn compiled_broker() -> Option<BrokerConfig> {
    option_env!("CORELINK_MQTT_BROKER").and_then(BrokerConfig::parse)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub max_attempts: u16,
    pub join_timeout_ms: u64,
    pub retry_interval_ms: u64,
    pub monitor_interval_ms: u64,
    pub auth_mode: AuthMode,
}

impl SupervisorPolicy {
    pub const fn defaults() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            join_timeout_ms: JOIN_TIMEOUT_MS,
            retry_interval_ms: RETRY_INTERVAL_MS,
            monitor_interval_ms: MONITOR_INTERVAL_MS,
            auth_mode: AuthMode::Wpa2Personal,
        }
    }

    pub const fn sanitized(self) -> Self {
        let max_attempts = if self.max_attempts == 0 {
            1
        } else if self.max_attempts > ATTEMPT_CEILING {
            ATTEMPT_CEILING
        } else {
            self.max_attempts
        };
        let join_timeout_ms = if self.join_timeout_ms == 0 {
            JOIN_TIMEOUT_MS
        } else {
            self.join_timeout_ms
        };
        Self {
            max_attempts,
            join_timeout_ms,
            ..self
        }
    }
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub ping_interval_ms: u64,
    pub ack_flash_ms: u64,
    pub idle_wait_ms: u64,
}

impl DispatchPolicy {
    pub const fn defaults() -> Self {
        Self {
            ping_interval_ms: PING_INTERVAL_MS,
            ack_flash_ms: ACK_FLASH_MS,
            idle_wait_ms: DISPATCH_IDLE_WAIT_MS,
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_parses_with_and_without_port() {
        let plain = BrokerConfig::parse("192.168.15.13").unwrap();
        assert_eq!(plain.address, Ipv4Addr::new(192, 168, 15, 13));
        assert_eq!(plain.port, MQTT_DEFAULT_PORT);

        let with_port = BrokerConfig::parse("10.0.0.2:8883").unwrap();
        assert_eq!(with_port.address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(with_port.port, 8883);

        assert!(BrokerConfig::parse("broker.local").is_none());
        assert!(BrokerConfig::parse("10.0.0.2:port").is_none());
    }

    #[test]
    fn sanitized_policy_clamps_attempts_below_reserved_tags() {
        let mut policy = SupervisorPolicy::defaults();
        policy.max_attempts = u16::MAX;
        assert_eq!(policy.sanitized().max_attempts, ATTEMPT_CEILING);

        policy.max_attempts = 0;
        assert_eq!(policy.sanitized().max_attempts, 1);

        assert_eq!(
            SupervisorPolicy::defaults().sanitized(),
            SupervisorPolicy::defaults()
        );
    }

    #[test]
    fn credentials_reject_bad_lengths_and_pick_open_auth() {
        assert!(WifiCredentials::from_parts(b"", b"secret").is_err());
        assert!(WifiCredentials::from_parts(&[b'a'; 33], b"").is_err());

        let open = WifiCredentials::from_parts(b"cafe", b"").unwrap();
        assert_eq!(open.ssid(), Some("cafe"));
        assert_eq!(open.auth_mode(AuthMode::Wpa2Personal), AuthMode::Open);

        let secured = WifiCredentials::from_parts(b"home", b"hunter22").unwrap();
        assert_eq!(secured.password(), Some("hunter22"));
        assert_eq!(
            secured.auth_mode(AuthMode::Wpa2Personal),
            AuthMode::Wpa2Personal
        );
    }
}
