//! Validation — the fixed initialize → tools/list → tools/call script run
//! against one server, and the report it produces.

pub mod reporter;
pub mod sequencer;
pub mod types;

pub use reporter::{ConsoleReporter, NullReporter, Reporter};
pub use sequencer::{run_validation, Sequencer};
pub use types::{SequencerState, StepStatus, ValidationOutcome, ValidationReport};
