//! Bounded buffering and result storage.
pub mod ring_buffer;
pub mod storage;
