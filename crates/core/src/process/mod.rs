//! Process supervision for the external transcoder and prober.
//!
//! [`CommandRunner`] spawns one command, streams its output line by line as
//! [`CommandEvent`]s and always resolves with a [`CommandInvocationResult`].
//! The event sequence has exactly one terminal event (`Finished`, `Errored`
//! or `TimedOut`) and nothing is emitted after it.

mod runner;
mod types;

pub use runner::CommandRunner;
pub use types::{
    CommandEvent, CommandEventSender, CommandId, CommandInvocationResult, CommandRequest,
    OutputStream,
};
