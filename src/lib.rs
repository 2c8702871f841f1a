pub mod env;
pub mod severity;
pub mod record;
pub mod correlation;
pub mod payload;
pub mod formatter;
pub mod query;

pub mod sink;
pub mod writer_sink;
pub mod memory_sink;
pub mod noop_sink;

pub mod middleware;

#[cfg(feature = "subscriber")]
pub mod layer;

#[cfg(feature = "subscriber")]
pub mod init;
