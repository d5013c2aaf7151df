//! Indicator building blocks shared by every strategy: bounded history
//! buffers and the pure kernel functions computed over them.

pub mod buffer;
pub mod kernels;

pub use buffer::RingBuffer;
