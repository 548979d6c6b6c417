//! Session orchestration: the state machine and the loop that drives it.

mod controller;
mod state;

pub use controller::{Controller, ControllerHandle, Services};
pub use state::{
    Effect, Event, Outstanding, PhotoFault, Session, SessionState, TimerKind, TimerToken, Timings,
};
