//! Transport-stream file player
//!
//! ```text
//! File → Queue → Demux ⇢ Decode → Convert → Render
//! ```

pub mod coordinator;
pub mod topology;

pub use coordinator::Player;
