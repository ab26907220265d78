//! Plink Core - File playback facade
//!
//! This crate provides the playback engine behind the plink facade:
//! decoding via symphonia, device output via cpal, rate conversion via
//! rubato, all sequenced by a single-source [`Player`] handle.

pub mod decoder;
pub mod output;
pub mod player;
pub mod resample;

#[cfg( test )]
mod test_util;

pub use decoder::DecoderError;
pub use output::OutputError;
pub use player::{ PlaybackState, Player, PlayerError };
