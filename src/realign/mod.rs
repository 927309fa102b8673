//! Realigns free-running recognizer output onto the span list.

pub mod realigner;
pub mod recognizer;
pub mod window;

pub use realigner::SpanRealigner;
pub use recognizer::WindowedRecognizer;
pub use window::{WindowController, degenerate_run_start};
