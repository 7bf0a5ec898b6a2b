#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Stove air-intake control (hardware-agnostic).
//!
//! All hardware goes through the `stove_traits` contracts: a temperature
//! sensor, two relays for the valve motor, buttons and user feedback.
//!
//! ## Architecture
//!
//! - **Time series**: timestamped values, windows, resampling, differencing (`timeseries`)
//! - **Signals**: observable current-value cells with push notification (`signal`)
//! - **Pipeline**: raw temperature → smoothed temperature and °/h rate (`pipeline`)
//! - **Fuzzy algebra**: sigmoid atoms, AND/OR/NOT, implication, weighted disjunction (`fuzzy`)
//! - **Rules**: combustion phases and the target open rate (`rules`)
//! - **Valve**: timing-based position state machine over two relays (`valve`)
//! - **Auto mode**: periodic rule evaluation driving the valve (`auto_mode`)
//! - **Controller**: builder, task wiring, user commands (`controller`)
//!
//! Long-running work runs on plain threads grouped in a `tasks::TaskGroup`;
//! tests and replays swap in `stove_traits::ManualClock`.

pub mod auto_mode;
pub mod buttons;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod fuzzy;
pub mod history;
pub mod hw_error;
pub mod mocks;
pub mod persistent;
pub mod pipeline;
pub mod rules;
pub mod sampler;
pub mod signal;
pub mod tasks;
pub mod timeseries;
pub mod util;
pub mod valve;

pub use auto_mode::{AutoModeController, PollOutcome};
pub use buttons::{ButtonRole, UserCommand};
pub use controller::{RunningStove, StartOptions, Stove, StoveBuilder, StoveController};
pub use error::{BuildError, Result, StoveError};
pub use fuzzy::{Condition, ConfidenceValue, Membership, Valued};
pub use pipeline::{StoveSignals, TemperaturePipeline};
pub use rules::{CombustionRules, Phase, RuleInputs};
pub use timeseries::TimestampedValue;
pub use valve::{ValveController, ValveState};
