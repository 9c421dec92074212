pub mod errors;
pub mod events;
pub mod id;
pub mod types;

pub use errors::{ConfigError, ConnectifyError};
pub use events::{Event, EventBus};
pub use id::{new_id, SessionId};
pub use types::UserStatus;

pub type Result<T> = std::result::Result<T, ConnectifyError>;
