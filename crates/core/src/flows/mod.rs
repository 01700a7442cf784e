pub mod engine;
pub mod states;

pub use engine::{DecisionInput, DocumentStateMachine};
pub use states::{DocumentOperation, TransitionOutcome};
