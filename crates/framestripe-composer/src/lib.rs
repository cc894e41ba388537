//! framestripe-composer — frame → stripe pipeline core.
//!
//! # Architecture
//!
//! ```text
//!                     PresenceGate (≥1 client?)
//!                              │
//! FrameSource ──on_next_frame──► StripeMaker ──push──► BoundedQueue<Stripe> ──► get_new_stripe()
//!   (callback, borrowed px)    (stripe-maker thread)   (evicts oldest half      (any number of
//!                                                        when full)              consumer threads)
//! ```
//!
//! [`Composer`] owns the queue and the stripe-maker thread; dropping it signals
//! close and joins the thread.

pub mod composer;
pub mod presence;
pub mod producer;
pub mod queue;

pub use composer::{Composer, ComposerState, ComposerStats};
pub use presence::{ClientTracker, PresenceGate};
pub use producer::{stripe_bands, FrameOutcome, StripeMaker};
pub use queue::{erase_oldest_half, BoundedQueue, OverflowHandler};
