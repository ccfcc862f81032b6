//! `herald-scheduler`: durable publish schedules and the loop that runs them.
//!
//! # Overview
//!
//! Schedules live in a SQLite `schedules` table. The [`SchedulerEngine`]
//! polls for due rows, claims each with a conditional UPDATE and hands it to
//! the [`PublishExecutor`] on a bounded worker pool.
//!
//! # States
//!
//! | Status       | Meaning                                              |
//! |--------------|------------------------------------------------------|
//! | `PENDING`    | Waiting for `scheduledAt` / `nextEligibleAt`         |
//! | `CLAIMED`    | Owned by a worker                                    |
//! | `PUBLISHING` | Provider call in flight, attempt counted             |
//! | `PUBLISHED`  | Terminal; `externalRef` set                          |
//! | `FAILED`     | Terminal; `lastError` set                            |

pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod policy;
pub mod store;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use executor::{PublishExecutor, PublishNow};
pub use policy::RetryPolicy;
pub use store::{PublishLog, ScheduleStore};
pub use types::{AttemptOutcome, PublishLogEntry, Schedule, ScheduleStatus};
