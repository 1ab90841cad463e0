pub mod state;

pub use state::{Principal, SessionPhase, SessionSnapshot, SessionState};
