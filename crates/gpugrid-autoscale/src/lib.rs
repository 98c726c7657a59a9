//! gpugrid-autoscale: worker-pool scaling recommendations.
//!
//! Looks at the pending-queue length and the worker pool, and recommends
//! growing or shrinking the pool. Acting on the recommendation belongs to an
//! external node-pool manager, reached through a [`ScaleCallback`].
//!
//! # Scaling Algorithm
//!
//! ```text
//! if now - last_action < cooldown:
//!     None("cooldown")
//! if pending >= scale_up_threshold and workers < max_workers:
//!     ScaleUp
//! if some idle worker's heartbeat age > scale_down_threshold
//!    and workers > min_workers and pending == 0:
//!     ScaleDown
//! else:
//!     None
//! ```
//!
//! `last_action` moves only on an actual ScaleUp/ScaleDown, so repeated
//! polling cannot keep pushing the cooldown forward.

pub mod scaler;

pub use scaler::{Autoscaler, PoolSnapshot, ScaleAction, ScaleCallback, ScaleDecision, ScaleFuture};
