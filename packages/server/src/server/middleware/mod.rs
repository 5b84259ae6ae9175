// HTTP middleware
pub mod ip_extractor;
pub mod rate_limit;
pub mod response_cache;

pub use ip_extractor::*;
pub use rate_limit::*;
pub use response_cache::*;
