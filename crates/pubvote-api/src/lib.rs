pub mod coordinator;
pub mod reply;
pub mod routes;
pub mod slack;
pub mod state;

pub use coordinator::{Coordinator, RoundConfig, RoundError};
pub use state::{AppState, AppStateInner};
