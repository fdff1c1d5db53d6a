use core::net::Ipv4Addr;

use heapless::Vec;
use statig::prelude::*;

use crate::link::codec::{LinkStatus, StatusEvent};

use super::CycleOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CycleEvent {
    CycleStarted,
    RadioReady,
    RadioInitFailed,
    JoinFinished { joined: bool, addr: Ipv4Addr },
    LinkLost { radio_ready: bool },
}

/// Side effect the driver performs after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CycleStep {
    InitRadio,
    Join { attempt: u16 },
    Backoff { attempt: u16 },
    Rejoin,
    Finished(CycleOutcome),
}

// Worst case is a successful join: `Connected` followed by `IpAssigned`.
pub(super) type Emitted = Vec<StatusEvent, 2>;

pub(super) struct CycleOutput {
    pub(super) emitted: Emitted,
    pub(super) next: CycleStep,
}

impl Default for CycleOutput {
    fn default() -> Self {
        Self {
            emitted: Emitted::new(),
            next: CycleStep::Finished(CycleOutcome::Unchanged),
        }
    }
}

impl CycleOutput {
    fn emit(&mut self, attempt: u16, status: LinkStatus) {
        self.push(StatusEvent::wifi(attempt, status));
    }

    fn push(&mut self, event: StatusEvent) {
        if self.emitted.push(event).is_err() {
            log::error!("supervisor: emit buffer overflow event={:?}", event);
        }
    }
}

pub(super) struct CycleMachine {
    max_attempts: u16,
}

impl CycleMachine {
    pub(super) fn new(max_attempts: u16) -> Self {
        Self { max_attempts }
    }
}

#[state_machine(initial = "State::init()")]
impl CycleMachine {
    #[state]
    fn init(&mut self, context: &mut CycleOutput, event: &CycleEvent) -> Outcome<State> {
        match event {
            CycleEvent::CycleStarted => {
                context.emit(0, LinkStatus::Initializing);
                context.next = CycleStep::InitRadio;
                Handled
            }
            CycleEvent::RadioReady => {
                context.next = CycleStep::Join { attempt: 1 };
                Transition(State::connecting(1))
            }
            CycleEvent::RadioInitFailed => {
                context.emit(0, LinkStatus::Failed);
                context.next = CycleStep::Finished(CycleOutcome::RadioInitFailed);
                Transition(State::failed())
            }
            _ => Handled,
        }
    }

    #[state]
    fn connecting(
        &mut self,
        attempt: &mut u16,
        context: &mut CycleOutput,
        event: &CycleEvent,
    ) -> Outcome<State> {
        let CycleEvent::JoinFinished { joined, addr } = *event else {
            return Handled;
        };
        let attempt = *attempt;

        if joined {
            context.emit(attempt, LinkStatus::Connected);
            context.push(StatusEvent::IpAssigned { addr });
            context.next = CycleStep::Finished(CycleOutcome::Connected { attempt, addr });
            return Transition(State::connected());
        }

        context.emit(attempt, LinkStatus::Failed);
        if attempt < self.max_attempts {
            let attempt = attempt + 1;
            context.next = CycleStep::Backoff { attempt };
            return Transition(State::connecting(attempt));
        }

        context.emit(0, LinkStatus::Failed);
        context.next = CycleStep::Finished(CycleOutcome::Exhausted);
        Transition(State::failed())
    }

    #[state(superstate = "settled")]
    fn connected() -> Outcome<State> {
        Super
    }

    #[state(superstate = "settled")]
    fn failed() -> Outcome<State> {
        Super
    }

    #[superstate]
    fn settled(&mut self, context: &mut CycleOutput, event: &CycleEvent) -> Outcome<State> {
        match event {
            CycleEvent::CycleStarted => {
                context.emit(0, LinkStatus::Initializing);
                context.next = CycleStep::InitRadio;
                Transition(State::init())
            }
            CycleEvent::LinkLost { radio_ready: true } => {
                context.emit(0, LinkStatus::Failed);
                context.next = CycleStep::Rejoin;
                Transition(State::connecting(1))
            }
            CycleEvent::LinkLost { radio_ready: false } => {
                context.emit(0, LinkStatus::Initializing);
                context.next = CycleStep::InitRadio;
                Transition(State::init())
            }
            _ => Handled,
        }
    }
}
