//! A controlled concurrency scheduler for systematic testing of
//! multithreaded programs.
//!
//! Host threads call into a shared [`Scheduler`] at the points where they
//! would otherwise race: before touching shared state, and whenever they
//! would block on a resource. The scheduler runs exactly one operation at a
//! time and, across repeated iterations with the same seed, a pluggable
//! [`strategy`] reproduces the same schedule, turning "it failed once in
//! CI" into "it fails on iteration 37 with seed 42, every time".
//!
//! ```no_run
//! use coyote::{Scheduler, Settings};
//!
//! let mut settings = Settings::new();
//! settings.use_random_strategy(42);
//! let scheduler = Scheduler::new(settings);
//!
//! scheduler.attach();
//! // ... create operations, start threads, schedule_next_operation() ...
//! scheduler.detach();
//! ```

pub mod error;
pub mod operation;
pub mod resource;
pub mod rng;
pub mod scheduler;
pub mod settings;
pub mod strategy;

pub use error::ErrorCode;
pub use operation::{Operation, OperationId, OperationStatus, WaitTarget};
pub use resource::{Resource, ResourceId};
pub use scheduler::{Scheduler, MAIN_OPERATION_ID};
pub use settings::{ExplorationStrategy, Settings};
pub use strategy::{Strategy, StrategyKind};
