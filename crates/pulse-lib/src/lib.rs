pub mod config;
pub mod io;
pub mod metrics;
pub mod session;
pub mod signal;

pub use metrics::*;
pub use session::*;
pub use signal::*;
