#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod dispatch;
pub mod fault;
pub mod link;
pub mod mailbox;
pub mod sinks;
pub mod supervisor;

pub use dispatch::{DispatchContext, DispatchLoop, TickReport};
pub use fault::Fault;
pub use link::{
    codec::{LinkStatus, StatusEvent},
    AckReporter, EventSender, WordChannel,
};
pub use mailbox::Mailbox;
pub use supervisor::{CycleOutcome, Radio, Supervisor};
