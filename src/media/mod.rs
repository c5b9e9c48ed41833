//! Still image to raw video stream.
//!
//! Data flow:
//! ```text
//! source file ─► decode ─► FrameStore.loading ─► promote ─► FrameStore.ready
//!                                                                │
//!                                              delivery loop ◄───┘
//!                                                                │
//!                                              ffmpeg stdin ◄────┘ (DASH out)
//! ```
//!
//! The refresh task and the delivery loop never wait on each other; the
//! store always holds a complete frame for delivery.

pub mod encoder;
pub mod frame;
pub mod pipe;
