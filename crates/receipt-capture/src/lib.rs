pub mod catchup;
pub mod error;
pub mod filter;
pub mod live;
pub mod monitor;
pub mod queue;

pub use error::CaptureError;
pub use monitor::{MonitorRegistry, MonitoredChat};
pub use queue::WorkQueue;
