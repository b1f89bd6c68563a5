//! Capture, PCM codec, ring buffer, and gapless playback scheduling.

pub mod capture;
pub mod pcm;
pub mod playback;
pub mod ring_buffer;
