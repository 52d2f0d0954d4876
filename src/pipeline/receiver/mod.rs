//! Video receiver
//!
//! The receiver pipeline flow:
//! ```text
//! File → Demux ⇢ Parse → Decode → Convert → Render
//! UDP  → Caps → Depayload → Decode → Convert → Render
//! ```

pub mod coordinator;
pub mod topology;

pub use coordinator::Receiver;
