pub mod connection;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod transport;
