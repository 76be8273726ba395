pub mod error;
pub mod manager;
pub mod reset;
pub mod supervisor;

pub use error::{SessionError, SessionResult};
pub use manager::{ConnectionManager, SessionPolicy, SessionStatus};
pub use reset::SessionResetCoordinator;
pub use supervisor::RetryPolicy;
