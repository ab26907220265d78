//! Audio output via cpal
//!
//! Owns the device stream and the shared ring the decode thread feeds.
//! The device callback only ever pops from the ring; all format adaptation
//! (channel layout, volume, pause) happens at pop time.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur while acquiring or controlling the output device.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to query stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to start output stream: {0}" )]
    StreamStart( String ),

    #[error( "Failed to pause output stream: {0}" )]
    StreamPause( String ),
}


// Scratch frame size in the device callback; no real layout comes close.
const MAX_CHANNELS: usize = 32;


/// Lock-guarded sample ring shared between the decode thread (producer) and
/// the device callback (consumer).
///
/// Converts between source and device channel layouts on the way out, applies
/// the current volume, and renders silence while paused.
pub struct SampleRing {
    ring: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Volume stored as f32 bits so the callback can read it without locking.
    volume: AtomicU32,
    source_channels: u16,
    output_channels: u16,
}


impl SampleRing {
    /// Creates a ring holding at most `capacity` source samples.
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        debug_assert!( ( source_channels as usize ) <= MAX_CHANNELS );
        debug_assert!( source_channels > 0 && output_channels > 0 );

        Self {
            ring: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels,
            output_channels,
        }
    }


    /// Pushes interleaved source samples. Returns how many were accepted;
    /// the rest must be retried once the consumer has drained the ring.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut ring = self.ring.lock().unwrap();
        let room = self.capacity.saturating_sub( ring.len() );
        let accepted = samples.len().min( room );
        ring.extend( samples[ ..accepted ].iter().copied() );
        accepted
    }


    /// Fills `output` (device layout) from the ring, converting channel
    /// layout and applying volume. Unfilled space is silence. Returns the
    /// number of device samples written from real source data.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        if self.paused.load( Ordering::Relaxed ) {
            output.fill( 0.0 );
            return 0;
        }

        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let src_ch = self.source_channels as usize;
        let out_ch = self.output_channels as usize;

        let mut ring = self.ring.lock().unwrap();
        let frames = ( output.len() / out_ch ).min( ring.len() / src_ch );

        let mut frame = [0.0_f32; MAX_CHANNELS];
        for f in 0..frames {
            for slot in frame.iter_mut().take( src_ch ) {
                // len() was checked above, the ring cannot run dry mid-frame
                *slot = ring.pop_front().unwrap();
            }

            for ch in 0..out_ch {
                let sample = if out_ch == 1 && src_ch > 1 {
                    // Downmix to mono: average all source channels
                    frame[ ..src_ch ].iter().sum::<f32>() / src_ch as f32
                } else {
                    // Map each device channel to its source channel,
                    // repeating the last source channel when upmixing
                    frame[ ch.min( src_ch - 1 ) ]
                };
                output[ f * out_ch + ch ] = sample * volume;
            }
        }

        output[ frames * out_ch.. ].fill( 0.0 );
        frames * out_ch
    }


    /// Returns the number of source samples currently buffered.
    pub fn len( &self ) -> usize {
        self.ring.lock().unwrap().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.ring.lock().unwrap().is_empty()
    }


    /// Sets the paused flag; while set, `pop` renders silence and leaves the
    /// buffered samples in place.
    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the volume (0.0 = mute, 1.0 = unity).
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.max( 0.0 ).to_bits(), Ordering::Relaxed );
    }


    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// Output device stream bound to one source format.
///
/// Not Send/Sync: cpal streams must stay on the thread that built them.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}


impl AudioOutput {
    /// Acquires the default output device and builds a stream suited to the
    /// given source format.
    ///
    /// Config preference order: exact channel count at the source rate, any
    /// channel count at the source rate (the ring converts layouts), then the
    /// device default (the caller must resample to close the rate gap).
    pub fn open(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleRing> ), OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or( OutputError::NoDevice )?;

        tracing::info!( "Output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let rate_matches = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate
                && c.max_sample_rate().0 >= source_sample_rate
        };

        let config = if let Some( exact ) = supported
            .iter()
            .find( |c| c.channels() == source_channels && rate_matches( c ) )
        {
            exact
                .clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else if let Some( rate_only ) = supported.iter().find( |c| rate_matches( c ) ) {
            tracing::info!(
                "Channel conversion: source {} ch, device {} ch",
                source_channels,
                rate_only.channels()
            );
            rate_only
                .clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else {
            let default = device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::warn!(
                "Device cannot run at {} Hz, falling back to {} Hz",
                source_sample_rate,
                default.sample_rate().0
            );
            default.config()
        };

        tracing::info!(
            "Output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // ~500ms of source audio
        let capacity = ( source_sample_rate as usize ) * ( source_channels as usize ) / 2;
        let ring = Arc::new( SampleRing::new( capacity, source_channels, config.channels ) );
        let ring_for_callback = Arc::clone( &ring );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    ring_for_callback.pop( data );
                },
                |err| {
                    tracing::error!( "Output stream error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
            ring,
        ))
    }


    /// Starts the device stream.
    pub fn start( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::StreamStart( e.to_string() ) )
    }


    /// Pauses the device stream. Buffered samples stay in the ring.
    pub fn pause( &self ) -> Result<(), OutputError> {
        self.stream
            .pause()
            .map_err( |e| OutputError::StreamPause( e.to_string() ) )
    }


    /// The sample rate the device is actually running at.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// The channel count the device is actually running with.
    pub fn channels( &self ) -> u16 {
        self.channels
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let ring = SampleRing::new( 4, 1, 1 );
        assert_eq!( ring.push( &[1.0, 2.0, 3.0] ), 3 );
        assert_eq!( ring.push( &[4.0, 5.0, 6.0] ), 1 );
        assert_eq!( ring.len(), 4 );
    }


    #[test]
    fn test_pop_passthrough_same_layout() {
        let ring = SampleRing::new( 16, 2, 2 );
        ring.push( &[0.1, 0.2, 0.3, 0.4] );

        let mut out = [9.0_f32; 6];
        let written = ring.pop( &mut out );

        assert_eq!( written, 4 );
        assert_eq!( &out[ ..4 ], &[0.1, 0.2, 0.3, 0.4] );
        assert_eq!( &out[ 4.. ], &[0.0, 0.0] );
    }


    #[test]
    fn test_pop_while_paused_renders_silence() {
        let ring = SampleRing::new( 16, 1, 1 );
        ring.push( &[0.5, 0.5] );
        ring.set_paused( true );

        let mut out = [9.0_f32; 4];
        assert_eq!( ring.pop( &mut out ), 0 );
        assert_eq!( out, [0.0; 4] );
        // Samples are retained for resume
        assert_eq!( ring.len(), 2 );
    }


    #[test]
    fn test_pop_applies_volume() {
        let ring = SampleRing::new( 16, 1, 1 );
        ring.set_volume( 0.5 );
        ring.push( &[1.0, -1.0] );

        let mut out = [0.0_f32; 2];
        ring.pop( &mut out );
        assert_eq!( out, [0.5, -0.5] );
    }


    #[test]
    fn test_pop_upmixes_mono_to_stereo() {
        let ring = SampleRing::new( 16, 1, 2 );
        ring.push( &[0.25, 0.75] );

        let mut out = [0.0_f32; 4];
        let written = ring.pop( &mut out );

        assert_eq!( written, 4 );
        assert_eq!( out, [0.25, 0.25, 0.75, 0.75] );
    }


    #[test]
    fn test_pop_downmixes_stereo_to_mono() {
        let ring = SampleRing::new( 16, 2, 1 );
        ring.push( &[0.2, 0.4, 1.0, 0.0] );

        let mut out = [0.0_f32; 2];
        let written = ring.pop( &mut out );

        assert_eq!( written, 2 );
        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert!( ( out[ 1 ] - 0.5 ).abs() < 1e-6 );
    }


    #[test]
    fn test_pop_does_not_split_frames() {
        // 3 samples buffered but stereo sources move in whole frames
        let ring = SampleRing::new( 16, 2, 2 );
        ring.push( &[0.1, 0.2, 0.3] );

        let mut out = [9.0_f32; 4];
        let written = ring.pop( &mut out );

        assert_eq!( written, 2 );
        assert_eq!( ring.len(), 1 );
    }
}
