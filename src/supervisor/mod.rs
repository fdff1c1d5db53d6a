//! Network-association supervisor for the producer context.
//!
//! The cycle logic lives in a `statig` machine ([`machine`]) that only decides
//! which events to report and what to do next. [`Supervisor`] performs those
//! steps against a [`Radio`] and pushes every reported event onto the word
//! channel, in order, before starting the next step.

mod machine;

use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration, Timer};
use statig::blocking::IntoStateMachineExt as _;

use crate::{
    config::{AuthMode, SupervisorPolicy, WifiCredentials},
    fault::Fault,
    link::EventSender,
};

use self::machine::{CycleEvent, CycleMachine, CycleOutput, CycleStep};

/// Parameters for one join attempt.
#[derive(Clone, Copy, Debug)]
pub struct JoinRequest<'a> {
    pub credentials: &'a WifiCredentials,
    pub auth_mode: AuthMode,
    pub timeout: Duration,
}

/// Join primitive and link queries of the radio/network stack.
///
/// A successful `join` is not trusted on its own; the supervisor confirms it
/// with `link_up` before reporting the attempt as connected.
#[allow(async_fn_in_trait)]
pub trait Radio {
    type Error: core::fmt::Debug;

    async fn init(&mut self) -> Result<(), Self::Error>;
    async fn enable_station(&mut self) -> Result<(), Self::Error>;
    async fn join(&mut self, request: JoinRequest<'_>) -> Result<(), Self::Error>;
    fn link_up(&mut self) -> bool;
    fn ipv4(&self) -> Option<Ipv4Addr>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Connected { attempt: u16, addr: Ipv4Addr },
    Exhausted,
    RadioInitFailed,
    /// The monitor found the link up and did nothing.
    Unchanged,
}

impl CycleOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Exhausted => "exhausted",
            Self::RadioInitFailed => "radio_init_failed",
            Self::Unchanged => "unchanged",
        }
    }
}

pub struct Supervisor<'a, R: Radio, M: RawMutex, const N: usize> {
    radio: R,
    events: EventSender<'a, M, N>,
    credentials: WifiCredentials,
    policy: SupervisorPolicy,
    machine: statig::blocking::StateMachine<CycleMachine>,
    radio_ready: bool,
}

impl<'a, R: Radio, M: RawMutex, const N: usize> Supervisor<'a, R, M, N> {
    pub fn new(
        radio: R,
        events: EventSender<'a, M, N>,
        credentials: WifiCredentials,
        policy: SupervisorPolicy,
    ) -> Self {
        let policy = policy.sanitized();
        Self {
            radio,
            events,
            credentials,
            machine: CycleMachine::new(policy.max_attempts).state_machine(),
            policy,
            radio_ready: false,
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub async fn run(&mut self) -> ! {
        let outcome = self.connect().await;
        log::info!("supervisor: initial cycle outcome={}", outcome.as_str());
        self.monitor().await
    }

    /// Brings the radio up and runs one bounded attempt loop.
    pub async fn connect(&mut self) -> CycleOutcome {
        let step = self.apply(CycleEvent::CycleStarted).await;
        self.drive(step).await
    }

    pub async fn monitor(&mut self) -> ! {
        loop {
            self.monitor_once().await;
        }
    }

    /// One monitor poll: wait the poll interval, then recover if the link is
    /// down or the radio never came up.
    pub async fn monitor_once(&mut self) -> CycleOutcome {
        Timer::after(Duration::from_millis(self.policy.monitor_interval_ms)).await;

        if self.radio_ready && self.radio.link_up() {
            return CycleOutcome::Unchanged;
        }
        if self.radio_ready {
            log::warn!("supervisor: link lost, reconnecting");
        } else {
            log::warn!("supervisor: radio down, retrying init");
        }

        let step = self
            .apply(CycleEvent::LinkLost {
                radio_ready: self.radio_ready,
            })
            .await;
        let outcome = self.drive(step).await;
        log::info!("supervisor: recovery outcome={}", outcome.as_str());
        outcome
    }

    async fn drive(&mut self, mut step: CycleStep) -> CycleOutcome {
        loop {
            let event = match step {
                CycleStep::Finished(outcome) => return outcome,
                CycleStep::InitRadio => self.init_radio().await,
                CycleStep::Join { attempt } => self.join(attempt).await,
                CycleStep::Backoff { attempt } => {
                    Timer::after(Duration::from_millis(self.policy.retry_interval_ms)).await;
                    self.join(attempt).await
                }
                CycleStep::Rejoin => {
                    if let Err(err) = self.radio.enable_station().await {
                        log::warn!("supervisor: enable station err={:?}", err);
                    }
                    self.join(1).await
                }
            };
            step = self.apply(event).await;
        }
    }

    async fn init_radio(&mut self) -> CycleEvent {
        match self.radio.init().await {
            Ok(()) => {
                self.radio_ready = true;
                CycleEvent::RadioReady
            }
            Err(err) => {
                log::error!(
                    "supervisor: {} err={:?}",
                    Fault::RadioInitFailure.as_str(),
                    err
                );
                CycleEvent::RadioInitFailed
            }
        }
    }

    async fn join(&mut self, attempt: u16) -> CycleEvent {
        let timeout = Duration::from_millis(self.policy.join_timeout_ms);
        let request = JoinRequest {
            credentials: &self.credentials,
            auth_mode: self.credentials.auth_mode(self.policy.auth_mode),
            timeout,
        };
        log::info!(
            "supervisor: join attempt={}/{} auth={}",
            attempt,
            self.policy.max_attempts,
            request.auth_mode.as_str()
        );

        let joined = match with_timeout(timeout, self.radio.join(request)).await {
            Ok(Ok(())) => self.radio.link_up(),
            Ok(Err(err)) => {
                log::warn!(
                    "supervisor: {} attempt={} err={:?}",
                    Fault::TransientJoinFailure.as_str(),
                    attempt,
                    err
                );
                false
            }
            Err(_) => {
                log::warn!(
                    "supervisor: {} attempt={} timeout_ms={}",
                    Fault::TransientJoinFailure.as_str(),
                    attempt,
                    self.policy.join_timeout_ms
                );
                false
            }
        };

        if joined {
            log::info!("supervisor: joined attempt={}", attempt);
        } else if attempt >= self.policy.max_attempts {
            log::warn!(
                "supervisor: {} attempts={}",
                Fault::ExhaustedRetries.as_str(),
                attempt
            );
        }

        let addr = if joined {
            self.radio.ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED)
        } else {
            Ipv4Addr::UNSPECIFIED
        };
        CycleEvent::JoinFinished { joined, addr }
    }

    async fn apply(&mut self, event: CycleEvent) -> CycleStep {
        let mut output = CycleOutput::default();
        self.machine.handle_with_context(&event, &mut output);
        for status in output.emitted {
            self.events.send(status).await;
        }
        output.next
    }
}
