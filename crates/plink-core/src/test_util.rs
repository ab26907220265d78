//! Shared helpers for unit tests.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;


/// Writes a 16-bit PCM WAV file holding `frames` frames of a 440 Hz tone
/// to the system temp directory, and returns its path.
pub fn write_test_wav( name: &str, sample_rate: u32, channels: u16, frames: u32 ) -> PathBuf {
    let path = std::env::temp_dir()
        .join( format!( "plink-test-{}-{}", std::process::id(), name ) );

    let data_len = frames * channels as u32 * 2;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut bytes = Vec::new();
    bytes.extend_from_slice( b"RIFF" );
    bytes.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
    bytes.extend_from_slice( b"WAVE" );
    bytes.extend_from_slice( b"fmt " );
    bytes.extend_from_slice( &16u32.to_le_bytes() );
    bytes.extend_from_slice( &1u16.to_le_bytes() ); // PCM
    bytes.extend_from_slice( &channels.to_le_bytes() );
    bytes.extend_from_slice( &sample_rate.to_le_bytes() );
    bytes.extend_from_slice( &byte_rate.to_le_bytes() );
    bytes.extend_from_slice( &block_align.to_le_bytes() );
    bytes.extend_from_slice( &16u16.to_le_bytes() ); // bits per sample
    bytes.extend_from_slice( b"data" );
    bytes.extend_from_slice( &data_len.to_le_bytes() );

    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = ( ( t * 440.0 * std::f32::consts::TAU ).sin() * 0.5 * i16::MAX as f32 ) as i16;
        for _ in 0..channels {
            bytes.extend_from_slice( &sample.to_le_bytes() );
        }
    }

    let mut file = File::create( &path ).unwrap();
    file.write_all( &bytes ).unwrap();
    path
}
