// HTTP routes
pub mod health;
pub mod jobs;
pub mod logs;
pub mod monitor;

pub use health::*;
pub use jobs::*;
pub use logs::*;
pub use monitor::*;
