//! Scheduler engine actor.
//!
//! One task owns the piece scheduler and the output file; peers talk to it
//! through cloned [`EngineHandle`]s and learn about progress from
//! [`EngineEvent`]s.

mod actor;
mod commands;
mod core;
mod handle;

pub use actor::spawn_scheduler_engine;
pub use commands::{EngineCommand, EngineEvent, PieceFailure};
pub use self::core::SchedulerEngine;
pub use handle::EngineHandle;
