pub mod cache;
pub mod clock;
pub mod confidence;
pub mod error;
pub mod same;
pub mod tracing_init;

pub use cache::{CacheConfig, CacheEvent, Location, MessageCache};
pub use clock::{Clock, SharedClock, SystemClock, TestClock};
pub use confidence::ConfidentByte;
pub use error::{Result, SameError};
pub use same::{MessageSummary, RawHeader, SameMessage};
