//! Stage processors
//!
//! The processing units run by the local engine's real-time thread.
//! All of them implement the `Processor` trait for uniform scheduling.

mod fade;
mod gain;
mod ingest;
mod processor;
mod routing;
mod sink;

pub use fade::{FadeIn, FadeOut};
pub use gain::GainProcessor;
pub use ingest::StreamIn;
pub use processor::{Flow, Processor};
pub use routing::{Deinterleave, Duplicator, FormatAdapter, Interleave, PassThrough};
#[cfg(feature = "device-output")]
pub use sink::DeviceSink;
pub use sink::{ByteSink, DiscardSink, FileWriter};
