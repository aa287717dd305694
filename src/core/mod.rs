pub mod error;
pub mod session_supervisor;

pub use error::AgentError;
pub use session_supervisor::SessionSupervisor;
