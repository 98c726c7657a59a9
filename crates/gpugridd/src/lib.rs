//! gpugridd: process assembly for the gpugrid scheduler.
//!
//! - [`daemon`]: long-running mode with maintenance loops and a durable store
//! - [`simulate`]: in-process pull-model workers driving a full job lifecycle

pub mod daemon;
pub mod simulate;
