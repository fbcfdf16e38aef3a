pub mod handler;
pub mod metrics;
pub mod response;
pub mod state;
