//! Network transport: TCP control connection plus UDP datagrams.

pub mod frame;
pub mod session;
pub mod status;
pub mod udp;

pub use session::Session;
