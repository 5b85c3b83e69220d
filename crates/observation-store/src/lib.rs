//! Time-aware observation store for Regelverk
//!
//! This crate records boolean propositions about the home together with
//! the times they were last asserted, folds them into Bayesian beliefs, and
//! provides the extractors that turn bus events into store writes.

pub mod bayesian;
pub mod cec;
pub mod clock;
pub mod error;
pub mod extractor;
pub mod gauge;
pub mod record;
pub mod store;
pub mod wifi;

pub use bayesian::{apply_decay, BayesianEngine, BayesianModel, Evaluator, Inference, Likelihood};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ExtractError;
pub use extractor::{Extractor, JsonBool, JsonNumeric, JsonThreshold, RawEnum, TimeOfDayPhase};
pub use gauge::Gauges;
pub use record::ObservationRecord;
pub use store::{Change, SetOutcome, StateValueMap};
