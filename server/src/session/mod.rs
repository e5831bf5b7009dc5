pub mod clock;
pub mod manager;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use manager::SessionManager;
pub use state::*;
pub use store::{MemorySessionStore, SessionStore, SharedSession};
