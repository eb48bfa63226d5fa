//! Run lifecycle: state machine, cleanup, registry and session context

pub mod cleanup;
pub mod events;
pub mod machine;
pub mod registry;
pub mod session;

pub use cleanup::{CleanupGuarantor, CleanupOutcome};
pub use events::{Observer, ObserverMessage, StateUpdateEvent};
pub use machine::{RunServices, RunStateMachine, RunTicket};
pub use registry::{RunHandle, RunRegistry};
pub use session::{Session, SessionDependencies, SessionManager};
