//! Consumer-side loop: channel -> mailbox -> handlers, plus timer actions.
//!
//! Every [`DispatchLoop::tick`] moves at most one channel frame into the
//! mailbox, handles at most one mailbox event and then checks three
//! deadlines: the one-shot publisher start, the periodic PING and the end
//! of the indicator flash. Nothing in a tick sleeps; [`DispatchLoop::run`]
//! waits for channel readiness bounded by the nearest deadline instead.

mod present;

use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration, Instant};

use crate::{
    config::{BrokerConfig, DispatchPolicy, PING_PAYLOAD, PING_TOPIC},
    fault::Fault,
    link::{
        codec::{decode, decode_address, Decoded, StatusEvent},
        WordChannel,
    },
    mailbox::Mailbox,
    sinks::{DisplayLine, Indicator, Publisher, Rgb, StatusDisplay},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchCounters {
    pub handled: u32,
    pub dropped: u32,
    pub invalid: u32,
    pub pings: u32,
}

/// Consumer-owned state that outlives a single event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchContext {
    /// Last non-zero address seen; `None` until the first one arrives.
    pub last_address: Option<Ipv4Addr>,
    pub publisher_started: bool,
    pub next_ping: Option<Instant>,
    pub flash_until: Option<Instant>,
    /// Position in the flash rotation, always below its length.
    pub flash_index: u8,
    /// Color of the latest link status; the flash reverts to it.
    pub status_color: Option<Rgb>,
    pub counters: DispatchCounters,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Drained {
    #[default]
    Nothing,
    Queued(StatusEvent),
    Dropped(StatusEvent),
    Invalid(u32),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub drained: Drained,
    pub handled: Option<StatusEvent>,
    pub publisher_started: bool,
    pub ping_fired: bool,
    pub flash_reverted: bool,
}

impl TickReport {
    /// Nothing was read from the channel or the mailbox.
    pub fn is_idle(&self) -> bool {
        matches!(self.drained, Drained::Nothing) && self.handled.is_none()
    }
}

pub struct DispatchLoop<'a, M, D, I, P, const C: usize, const Q: usize>
where
    M: RawMutex,
{
    channel: &'a WordChannel<M, C>,
    mailbox: &'a Mailbox<M, StatusEvent, Q>,
    display: D,
    indicator: I,
    publisher: P,
    broker: BrokerConfig,
    policy: DispatchPolicy,
    context: DispatchContext,
}

impl<'a, M, D, I, P, const C: usize, const Q: usize> DispatchLoop<'a, M, D, I, P, C, Q>
where
    M: RawMutex,
    D: StatusDisplay,
    I: Indicator,
    P: Publisher,
{
    pub fn new(
        channel: &'a WordChannel<M, C>,
        mailbox: &'a Mailbox<M, StatusEvent, Q>,
        display: D,
        indicator: I,
        publisher: P,
        broker: BrokerConfig,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            channel,
            mailbox,
            display,
            indicator,
            publisher,
            broker,
            policy,
            context: DispatchContext::default(),
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub async fn run(&mut self) -> ! {
        log::info!(
            "dispatch: running ping_interval_ms={} broker={}:{}",
            self.policy.ping_interval_ms,
            self.broker.address,
            self.broker.port
        );
        loop {
            let report = self.tick().await;
            if report.is_idle() {
                let wait = self.next_wait(Instant::now());
                let _ = with_timeout(wait, self.channel.wait_ready()).await;
            } else {
                embassy_futures::yield_now().await;
            }
        }
    }

    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now()).await
    }

    /// One iteration against an explicit timestamp.
    pub async fn tick_at(&mut self, now: Instant) -> TickReport {
        let drained = self.drain_one(now).await;
        let handled = self.mailbox.try_pop();
        if let Some(event) = handled {
            self.handle(event, now);
        }
        let publisher_started = self.start_publisher_once(now);
        let ping_fired = self.ping_if_due(now);
        let flash_reverted = self.revert_flash_if_due(now);
        self.poll_session(now);
        self.display.service(now);

        TickReport {
            drained,
            handled,
            publisher_started,
            ping_fired,
            flash_reverted,
        }
    }

    /// Time until the nearest pending deadline, capped at the idle wait.
    pub fn next_wait(&self, now: Instant) -> Duration {
        let cap = Duration::from_millis(self.policy.idle_wait_ms);
        [self.context.next_ping, self.context.flash_until]
            .into_iter()
            .flatten()
            .map(|deadline| deadline.saturating_duration_since(now))
            .fold(cap, |wait, until| wait.min(until))
    }

    async fn drain_one(&mut self, now: Instant) -> Drained {
        let Some(word) = self.channel.try_pop() else {
            return Drained::Nothing;
        };

        let event = match decode(word) {
            Ok(Decoded::Event(event)) => event,
            Ok(Decoded::AddressFollows) => StatusEvent::IpAssigned {
                addr: decode_address(self.channel.pop().await),
            },
            Err(err) => {
                self.context.counters.invalid = self.context.counters.invalid.wrapping_add(1);
                log::warn!(
                    "dispatch: {} word={:#010x} reason={}",
                    Fault::InvalidDecodedEvent.as_str(),
                    word,
                    err.as_str()
                );
                self.show_fault(DisplayLine::Status, Fault::InvalidDecodedEvent, now);
                return Drained::Invalid(word);
            }
        };

        if self.mailbox.try_push(event) {
            return Drained::Queued(event);
        }
        self.context.counters.dropped = self.context.counters.dropped.wrapping_add(1);
        log::warn!(
            "dispatch: {} dropped={} event={:?}",
            Fault::MailboxFull.as_str(),
            self.context.counters.dropped,
            event
        );
        self.show_fault(DisplayLine::Status, Fault::MailboxFull, now);
        Drained::Dropped(event)
    }

    fn handle(&mut self, event: StatusEvent, now: Instant) {
        self.context.counters.handled = self.context.counters.handled.wrapping_add(1);
        match event {
            StatusEvent::WifiStatus { attempt, status } => {
                log::info!("dispatch: wifi attempt={} status={}", attempt, status.as_str());
                let color = present::status_color(status);
                self.context.status_color = Some(color);
                self.indicator.set_color(color);
                self.display
                    .show(DisplayLine::Status, &present::wifi_notice(status), now);
            }
            StatusEvent::IpAssigned { addr } => {
                log::info!("dispatch: address {}", addr);
                self.display
                    .show(DisplayLine::Network, &present::address_notice(addr), now);
                if !addr.is_unspecified() {
                    self.context.last_address = Some(addr);
                }
            }
            StatusEvent::PingAck { ok: true } => {
                let color = present::flash_color(self.context.flash_index);
                self.context.flash_index = present::next_flash_index(self.context.flash_index);
                self.context.flash_until =
                    Some(now + Duration::from_millis(self.policy.ack_flash_ms));
                self.indicator.set_color(color);
                self.display.show(DisplayLine::Ack, present::ACK_OK, now);
            }
            StatusEvent::PingAck { ok: false } => {
                log::warn!("dispatch: {}", Fault::PublishFailure.as_str());
                self.context.flash_until = None;
                self.indicator.set_color(Rgb::RED);
                self.show_fault(DisplayLine::Ack, Fault::PublishFailure, now);
            }
        }
    }

    fn show_fault(&mut self, line: DisplayLine, fault: Fault, now: Instant) {
        if let Some(notice) = fault.notice() {
            self.display.show(line, notice, now);
        }
    }

    fn start_publisher_once(&mut self, now: Instant) -> bool {
        if self.context.publisher_started || self.context.last_address.is_none() {
            return false;
        }
        self.context.publisher_started = true;
        self.context.next_ping = Some(now + Duration::from_millis(self.policy.ping_interval_ms));
        if let Err(err) = self.publisher.connect(self.broker) {
            log::warn!("dispatch: publisher start err={}", err.as_str());
            self.display
                .show(DisplayLine::Broker, &present::broker_notice(err.as_str()), now);
        }
        true
    }

    fn ping_if_due(&mut self, now: Instant) -> bool {
        if !self.context.publisher_started {
            return false;
        }
        let Some(deadline) = self.context.next_ping else {
            return false;
        };
        if now < deadline {
            return false;
        }
        self.context.next_ping = Some(now + Duration::from_millis(self.policy.ping_interval_ms));

        match self.publisher.publish(PING_TOPIC, PING_PAYLOAD) {
            Ok(()) => {
                self.context.counters.pings = self.context.counters.pings.wrapping_add(1);
                self.display.show(DisplayLine::Broker, present::PING_SENT, now);
            }
            Err(err) => {
                log::warn!("dispatch: ping not queued err={}", err.as_str());
                self.display
                    .show(DisplayLine::Broker, &present::broker_notice(err.as_str()), now);
            }
        }
        true
    }

    fn revert_flash_if_due(&mut self, now: Instant) -> bool {
        match self.context.flash_until {
            Some(deadline) if now >= deadline => {
                self.context.flash_until = None;
                let color = self.context.status_color.unwrap_or(Rgb::GREEN);
                self.indicator.set_color(color);
                true
            }
            _ => false,
        }
    }

    fn poll_session(&mut self, now: Instant) {
        if let Some(state) = self.publisher.session_change() {
            log::info!("dispatch: broker session {}", state.as_str());
            self.display
                .show(DisplayLine::Broker, &present::broker_notice(state.as_str()), now);
        }
    }
}
