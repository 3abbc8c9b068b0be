//! # Stream Decoding
//!
//! Pure data transformation from raw response chunks to reply text.
//! No network and no rendering happen here.
//!
//! ```text
//! chunks ──► StreamDecoder ──► DeltaPayload* ──► DeltaAccumulator ──► reply text
//! ```

pub mod accumulator;
pub mod decoder;

pub use accumulator::DeltaAccumulator;
pub use decoder::{DeltaPayload, FrameError, StreamDecoder};
