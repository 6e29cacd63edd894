//! # irrigo-domain
//!
//! Pure domain model for the irrigo irrigation controller.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Zones** (valve circuits) and **User settings** (layout + safety limits)
//! - Define **Programs** (named step sequences with a schedule)
//! - Define the **Execution state** and its pure countdown (`advance`)
//! - Decide activations through the **Safety limiter**
//! - Evaluate **Schedules** (recurrence, due programs, tie-break)
//! - Define **Events** (system log entries)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod event;
pub mod execution;
pub mod program;
pub mod safety;
pub mod schedule;
pub mod settings;
pub mod zone;
