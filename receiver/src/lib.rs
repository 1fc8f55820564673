pub mod buffer;
pub mod decoder;
pub mod hook;
pub mod preview;
pub mod server;
pub mod stats;
pub mod stream;
