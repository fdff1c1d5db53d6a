//! Minimal MQTT 3.1.1 publisher: QoS 0 only, clean session, no subscriptions.
//!
//! [`PublishQueue`] is the consumer-side [`Publisher`]; it only queues
//! requests into an [`MqttLink`]. The socket side runs [`run_session`] on
//! the network context and reports every publish outcome through an
//! [`AckReporter`].

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel, signal::Signal};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Error as _, ErrorKind, Read, ReadExactError, Write};
use heapless::{String, Vec};

use super::{PublishError, Publisher, SessionState};
use crate::{
    config::{BrokerConfig, MQTT_KEEP_ALIVE_SECS, ONLINE_PAYLOAD, PING_TOPIC},
    link::AckReporter,
};

pub const TOPIC_MAX: usize = 64;
pub const PAYLOAD_MAX: usize = 64;
pub const CLIENT_ID_MAX: usize = 23;
const PACKET_MAX: usize = 2 + 4 + 2 + TOPIC_MAX + PAYLOAD_MAX;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH_QOS0: u8 = 0x30;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;
const PROTOCOL_LEVEL_311: u8 = 0x04;
const CLEAN_SESSION: u8 = 0x02;

pub type Packet = Vec<u8, PACKET_MAX>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MqttError {
    Io(ErrorKind),
    Closed,
    Rejected(u8),
    Malformed,
    TooLarge,
}

impl MqttError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Closed => "closed",
            Self::Rejected(_) => "rejected",
            Self::Malformed => "malformed",
            Self::TooLarge => "too_large",
        }
    }
}

impl<E: embedded_io_async::Error> From<ReadExactError<E>> for MqttError {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Self::Closed,
            ReadExactError::Other(err) => Self::Io(err.kind()),
        }
    }
}

fn push_all(packet: &mut Packet, bytes: &[u8]) -> Result<(), MqttError> {
    packet
        .extend_from_slice(bytes)
        .map_err(|_| MqttError::TooLarge)
}

fn push_str(packet: &mut Packet, text: &[u8]) -> Result<(), MqttError> {
    let len = u16::try_from(text.len()).map_err(|_| MqttError::TooLarge)?;
    push_all(packet, &len.to_be_bytes())?;
    push_all(packet, text)
}

/// Variable-length "remaining length" field, 7 bits per byte.
pub fn push_remaining_length(packet: &mut Packet, mut len: usize) -> Result<(), MqttError> {
    if len > 268_435_455 {
        return Err(MqttError::TooLarge);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        packet.push(byte).map_err(|_| MqttError::TooLarge)?;
        if len == 0 {
            return Ok(());
        }
    }
}

pub fn encode_connect(client_id: &str, keep_alive_secs: u16) -> Result<Packet, MqttError> {
    if client_id.len() > CLIENT_ID_MAX {
        return Err(MqttError::TooLarge);
    }
    let mut packet = Packet::new();
    push_all(&mut packet, &[CONNECT])?;
    push_remaining_length(&mut packet, 10 + 2 + client_id.len())?;
    push_str(&mut packet, b"MQTT")?;
    push_all(&mut packet, &[PROTOCOL_LEVEL_311, CLEAN_SESSION])?;
    push_all(&mut packet, &keep_alive_secs.to_be_bytes())?;
    push_str(&mut packet, client_id.as_bytes())?;
    Ok(packet)
}

pub fn encode_publish(topic: &str, payload: &[u8]) -> Result<Packet, MqttError> {
    if topic.is_empty() || topic.len() > TOPIC_MAX || payload.len() > PAYLOAD_MAX {
        return Err(MqttError::TooLarge);
    }
    let mut packet = Packet::new();
    push_all(&mut packet, &[PUBLISH_QOS0])?;
    push_remaining_length(&mut packet, 2 + topic.len() + payload.len())?;
    push_str(&mut packet, topic.as_bytes())?;
    push_all(&mut packet, payload)?;
    Ok(packet)
}

pub const fn encode_pingreq() -> [u8; 2] {
    [PINGREQ, 0]
}

pub const fn encode_disconnect() -> [u8; 2] {
    [DISCONNECT, 0]
}

pub fn parse_connack(bytes: [u8; 4]) -> Result<(), MqttError> {
    match bytes {
        [CONNACK, 0x02, _, 0x00] => Ok(()),
        [CONNACK, 0x02, _, code] => Err(MqttError::Rejected(code)),
        _ => Err(MqttError::Malformed),
    }
}

/// One open broker connection over any async byte stream.
pub struct MqttSession<T> {
    transport: T,
}

impl<T: Read + Write> MqttSession<T> {
    pub async fn open(
        mut transport: T,
        client_id: &str,
        keep_alive_secs: u16,
    ) -> Result<Self, MqttError> {
        let connect = encode_connect(client_id, keep_alive_secs)?;
        write_packet(&mut transport, &connect).await?;

        let mut connack = [0u8; 4];
        transport.read_exact(&mut connack).await?;
        parse_connack(connack)?;
        Ok(Self { transport })
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        let packet = encode_publish(topic, payload)?;
        write_packet(&mut self.transport, &packet).await
    }

    pub async fn ping(&mut self) -> Result<(), MqttError> {
        write_packet(&mut self.transport, &encode_pingreq()).await?;
        let mut response = [0u8; 2];
        self.transport.read_exact(&mut response).await?;
        if response != [PINGRESP, 0] {
            return Err(MqttError::Malformed);
        }
        Ok(())
    }

    /// Best-effort DISCONNECT; hands the transport back either way.
    pub async fn close(mut self) -> T {
        if let Err(err) = write_packet(&mut self.transport, &encode_disconnect()).await {
            log::debug!("mqtt: disconnect err={}", err.as_str());
        }
        self.transport
    }
}

async fn write_packet<T: Write>(transport: &mut T, bytes: &[u8]) -> Result<(), MqttError> {
    transport
        .write_all(bytes)
        .await
        .map_err(|err| MqttError::Io(err.kind()))?;
    transport
        .flush()
        .await
        .map_err(|err| MqttError::Io(err.kind()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String<TOPIC_MAX>,
    pub payload: Vec<u8, PAYLOAD_MAX>,
}

/// State shared between [`PublishQueue`] and the session task.
pub struct MqttLink<M: RawMutex, const N: usize> {
    requests: Channel<M, PublishRequest, N>,
    broker: Signal<M, BrokerConfig>,
    session: Signal<M, SessionState>,
    connected: AtomicBool,
}

impl<M: RawMutex, const N: usize> MqttLink<M, N> {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            broker: Signal::new(),
            session: Signal::new(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Waits for the consumer to ask for a broker connection.
    pub async fn wait_broker(&self) -> BrokerConfig {
        self.broker.wait().await
    }

    pub async fn next_request(&self) -> PublishRequest {
        self.requests.receive().await
    }

    pub fn report_session(&self, state: SessionState) {
        self.connected
            .store(matches!(state, SessionState::Connected), Ordering::Release);
        self.session.signal(state);
    }
}

impl<M: RawMutex, const N: usize> Default for MqttLink<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PublishQueue<'a, M: RawMutex, const N: usize> {
    link: &'a MqttLink<M, N>,
    started: bool,
}

impl<'a, M: RawMutex, const N: usize> PublishQueue<'a, M, N> {
    pub const fn new(link: &'a MqttLink<M, N>) -> Self {
        Self {
            link,
            started: false,
        }
    }
}

impl<M: RawMutex, const N: usize> Publisher for PublishQueue<'_, M, N> {
    fn connect(&mut self, broker: BrokerConfig) -> Result<(), PublishError> {
        log::info!("mqtt: starting client broker={}:{}", broker.address, broker.port);
        self.link.broker.signal(broker);
        self.started = true;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.started {
            return Err(PublishError::NotStarted);
        }
        if !self.link.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let mut request = PublishRequest {
            topic: String::new(),
            payload: Vec::new(),
        };
        request
            .topic
            .push_str(topic)
            .map_err(|_| PublishError::TooLarge)?;
        request
            .payload
            .extend_from_slice(payload)
            .map_err(|_| PublishError::TooLarge)?;
        self.link
            .requests
            .try_send(request)
            .map_err(|_| PublishError::QueueFull)
    }

    fn session_change(&mut self) -> Option<SessionState> {
        self.link.session.try_take()
    }
}

/// Publishes queued requests until the connection fails, pinging the
/// broker at half the keep-alive interval while idle.
pub async fn serve<T, M, const N: usize, const C: usize>(
    session: &mut MqttSession<T>,
    link: &MqttLink<M, N>,
    acks: AckReporter<'_, M, C>,
    keep_alive_secs: u16,
) -> MqttError
where
    T: Read + Write,
    M: RawMutex,
{
    let idle = Duration::from_secs(u64::from(keep_alive_secs.max(2)) / 2);
    loop {
        match select(link.next_request(), Timer::after(idle)).await {
            Either::First(request) => {
                let result = session.publish(&request.topic, &request.payload).await;
                acks.report(result.is_ok()).await;
                if let Err(err) = result {
                    return err;
                }
            }
            Either::Second(()) => {
                if let Err(err) = session.ping().await {
                    return err;
                }
            }
        }
    }
}

/// Runs one broker connection to completion: handshake, online
/// announcement, then [`serve`]. The broker gets a DISCONNECT when the
/// session ends after a successful handshake. Returns the error that ended it.
pub async fn run_session<T, M, const N: usize, const C: usize>(
    transport: T,
    link: &MqttLink<M, N>,
    acks: AckReporter<'_, M, C>,
    client_id: &str,
) -> MqttError
where
    T: Read + Write,
    M: RawMutex,
{
    let mut session = match MqttSession::open(transport, client_id, MQTT_KEEP_ALIVE_SECS).await {
        Ok(session) => session,
        Err(err) => {
            log::warn!("mqtt: connect failed err={}", err.as_str());
            link.report_session(SessionState::Failed);
            return err;
        }
    };
    log::info!("mqtt: session open client_id={}", client_id);
    link.report_session(SessionState::Connected);

    let online = session.publish(PING_TOPIC, ONLINE_PAYLOAD).await;
    acks.report(online.is_ok()).await;
    let err = match online {
        Ok(()) => serve(&mut session, link, acks, MQTT_KEEP_ALIVE_SECS).await,
        Err(err) => err,
    };
    log::warn!("mqtt: session ended err={}", err.as_str());
    link.report_session(SessionState::Failed);
    session.close().await;
    err
}
