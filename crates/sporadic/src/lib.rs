//! Sporadic-server scheduling contexts: bandwidth reservations of at most `budget` ticks of execution per sliding
//! window of `period` ticks, enforced through a fixed-capacity queue of refills.
//!
//! The crate is the replenishment engine only.  The dispatcher, the capability system, and the platform clock are the
//! embedding kernel's business; they talk to the engine through [SchedContext], [KernelCtx], and the [CoreClock]
//! trait.

#[macro_use]
mod logging;

mod config;
mod context;
mod critical_section;
mod data_structures;
mod error;
mod sched_context;
mod time;

pub use config::{KernelTimings, DEFAULT_CAP, DEFAULT_WCET_SCALE};
pub use context::KernelCtx;
pub use critical_section::{enter_critical_section, exit_critical_section};
pub use data_structures::refill_ring::Refill;
pub use error::{Error, Result};
pub use logging::drain_deferred_logs;
pub use sched_context::{SchedContext, SchedParams};
pub use time::{CoreClock, CoreId, ManualClock, Ticks};
