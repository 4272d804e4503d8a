//! Capture-line sources

pub mod replay;
pub mod tail;

pub use replay::CaptureReplay;
pub use tail::FileTailer;
