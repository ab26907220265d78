//! Audio decoding via Symphonia
//!
//! Wraps format probing and packet decoding behind a small pull interface.
//! The facade only needs three things from a source: its signal parameters,
//! a stream of interleaved f32 samples, and a clean EOF.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;


/// Errors that can occur while opening or decoding a source.
///
/// The first two variants mean the file itself is unusable; the later ones
/// mean the container was recognized but a decoder could not be built or run.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unrecognized or unsupported container format" )]
    UnsupportedFormat,

    #[error( "No decodable audio track in file" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),
}


impl DecoderError {
    /// True when the failure is attributable to the file itself rather than
    /// to decoder construction or a mid-stream fault.
    pub fn is_invalid_file( &self ) -> bool {
        matches!( self, DecoderError::FileOpen( _ ) | DecoderError::UnsupportedFormat )
    }
}


/// Pull decoder for a single file-backed audio source.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_secs: Option<f64>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl std::fmt::Debug for Decoder {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "Decoder" )
            .field( "track_id", &self.track_id )
            .field( "sample_rate", &self.sample_rate )
            .field( "channels", &self.channels )
            .field( "duration_secs", &self.duration_secs )
            .finish_non_exhaustive()
    }
}


impl Decoder {
    /// Opens the audio source at `path` and prepares a decoder for its first
    /// audio track.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new(
            Box::new( file ),
            MediaSourceStreamOptions { buffer_len: 64 * 1024 },
        );

        // The extension hint lets symphonia try the likely reader first
        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let duration_secs = codec_params
            .n_frames
            .map( |frames| frames as f64 / sample_rate as f64 );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        tracing::info!(
            "Opened source: {} Hz, {} ch, duration {:?}s",
            sample_rate,
            channels,
            duration_secs
        );

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_secs,
            sample_buf: None,
        })
    }


    /// Returns the source sample rate in Hz.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the source channel count.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the source duration in seconds, when the container reports it.
    pub fn duration_secs( &self ) -> Option<f64> {
        self.duration_secs
    }


    /// Decodes the next packet into interleaved f32 samples.
    ///
    /// Returns `Ok( None )` once the source is exhausted. Corrupt packets are
    /// skipped; only unrecoverable faults surface as errors.
    pub fn next_samples( &mut self ) -> Result<Option<&[f32]>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let frames = decoded.frames();

            let needs_alloc = self
                .sample_buf
                .as_ref()
                .map( |b| b.capacity() < frames * spec.channels.count() )
                .unwrap_or( true );
            if needs_alloc {
                self.sample_buf = Some( SampleBuffer::new( frames as u64, spec ) );
            }

            // sample_buf was just allocated above when absent
            let sample_buf = self.sample_buf.as_mut().expect( "sample buffer allocated" );
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples() ) );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::test_util::write_test_wav;


    #[test]
    fn test_open_reports_signal_parameters() {
        let path = write_test_wav( "params.wav", 22050, 2, 2205 );
        let decoder = Decoder::open( &path ).unwrap();

        assert_eq!( decoder.sample_rate(), 22050 );
        assert_eq!( decoder.channels(), 2 );
        let duration = decoder.duration_secs().unwrap();
        assert!( ( duration - 0.1 ).abs() < 0.01 );

        let _ = std::fs::remove_file( &path );
    }


    #[test]
    fn test_decode_to_eof_yields_all_frames() {
        let path = write_test_wav( "eof.wav", 8000, 1, 800 );
        let mut decoder = Decoder::open( &path ).unwrap();

        let mut total = 0usize;
        while let Some( samples ) = decoder.next_samples().unwrap() {
            total += samples.len();
        }
        assert_eq!( total, 800 );

        let _ = std::fs::remove_file( &path );
    }


    #[test]
    fn test_missing_file_is_invalid_file() {
        let err = Decoder::open( Path::new( "/nonexistent/missing.mp3" ) ).unwrap_err();
        assert!( err.is_invalid_file() );
        assert!( matches!( err, DecoderError::FileOpen( _ ) ) );
    }


    #[test]
    fn test_non_audio_file_is_invalid_file() {
        let path = std::env::temp_dir()
            .join( format!( "plink-test-{}-garbage.bin", std::process::id() ) );
        std::fs::write( &path, b"this is definitely not an audio container" ).unwrap();

        let err = Decoder::open( &path ).unwrap_err();
        assert!( err.is_invalid_file() );

        let _ = std::fs::remove_file( &path );
    }
}
