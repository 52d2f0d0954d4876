//! Camera sender
//!
//! The sender pipeline flow:
//! ```text
//! Camera → Convert → Encode → Mux → File
//! Camera → Convert → Encode → Parse → Payload → UDP
//! ```

pub mod coordinator;
pub mod topology;

pub use coordinator::Sender;
