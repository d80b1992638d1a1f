pub mod config;
pub mod result;
pub mod scenario;

pub use config::Config;
pub use result::*;
pub use scenario::*;
