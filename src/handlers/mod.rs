pub mod registry;
pub mod session;
pub mod sweeper;

pub use registry::SessionRegistry;
pub use session::{SessionController, SessionError, SessionSnapshot, SessionStage};
pub use sweeper::SessionSweeper;
