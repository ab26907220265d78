//! Playback facade
//!
//! One `Player` per opened source. Owns the decoder thread, the shared
//! sample ring, and the device stream, and sequences them through the
//! `open -> Stopped <-> Playing -> released` lifecycle. All setup failures
//! surface from `open`; nothing escapes a failed open.

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::decoder::{ Decoder, DecoderError };
use crate::output::{ AudioOutput, SampleRing };
use crate::resample::Resampler;


/// Errors surfaced by the facade.
///
/// The first four variants mirror the stable failure taxonomy of the C ABI;
/// `DeviceControl` covers post-open control faults that the C surface
/// deliberately does not report.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "Invalid or unreadable audio file: {0}" )]
    InvalidFile( String ),

    #[error( "Failed to initialize decoder: {0}" )]
    DecoderInit( String ),

    #[error( "Failed to initialize output device: {0}" )]
    DeviceInit( String ),

    #[error( "Failed to start output device: {0}" )]
    DeviceStart( String ),

    #[error( "Device control failed: {0}" )]
    DeviceControl( String ),
}


impl From<DecoderError> for PlayerError {
    fn from( err: DecoderError ) -> Self {
        if err.is_invalid_file() {
            PlayerError::InvalidFile( err.to_string() )
        } else {
            PlayerError::DecoderInit( err.to_string() )
        }
    }
}


/// Control state of a live player. Release is not a state: a released
/// player no longer exists.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlaybackState {
    Stopped,
    Playing,
}


/// Wrapper that lets the facade hold the cpal stream in a Send struct.
///
/// SAFETY: control calls (start/pause) only happen through `&mut Player`,
/// so they are serialized on one thread at a time; the audio callback runs
/// on cpal's own thread regardless of where the stream object lives.
struct OutputHandle( AudioOutput );

unsafe impl Send for OutputHandle {}
unsafe impl Sync for OutputHandle {}


/// Playback handle for one audio source.
///
/// Dropping a `Player` (or calling [`Player::close`]) releases the decode
/// thread, the ring, and the device stream. Use-after-release is
/// unrepresentable: `close` consumes the value.
pub struct Player {
    ring: Arc<SampleRing>,
    output: OutputHandle,
    stop_flag: Arc<AtomicBool>,
    decode_thread: Option<thread::JoinHandle<()>>,
    state: PlaybackState,
    /// Source frames handed to the ring so far.
    frames_decoded: Arc<AtomicU64>,
    /// Set by the decode thread when the source drained naturally.
    finished: Arc<AtomicBool>,
    sample_rate: u32,
    duration: Option<Duration>,
    path: PathBuf,
}

impl std::fmt::Debug for Player {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "Player" )
            .field( "state", &self.state )
            .field( "sample_rate", &self.sample_rate )
            .field( "duration", &self.duration )
            .field( "path", &self.path )
            .finish_non_exhaustive()
    }
}


impl Player {
    /// Opens `path`, binds an output stream to the decoded format, verifies
    /// the device starts, and parks everything in the Stopped state.
    ///
    /// Failure mapping: unreadable/unrecognized file -> `InvalidFile`; no
    /// track or codec failure -> `DecoderInit`; device acquisition/config ->
    /// `DeviceInit`; start verification -> `DeviceStart`. On any failure all
    /// partially acquired resources are released before returning.
    pub fn open( path: &Path ) -> Result<Self, PlayerError> {
        tracing::info!( "Opening {:?}", path );

        let mut decoder = Decoder::open( path )?;

        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let duration = decoder.duration_secs().map( Duration::from_secs_f64 );

        let ( output, ring ) = AudioOutput::open( source_rate, channels as u16 )
            .map_err( |e| PlayerError::DeviceInit( e.to_string() ) )?;

        // Park the ring before the start probe so nothing becomes audible
        ring.set_paused( true );

        // Prove the device can run, then hold it stopped until play()
        output
            .start()
            .map_err( |e| PlayerError::DeviceStart( e.to_string() ) )?;
        output
            .pause()
            .map_err( |e| PlayerError::DeviceInit( e.to_string() ) )?;

        let resampler = if source_rate != output.sample_rate() {
            Some(
                Resampler::new( source_rate, output.sample_rate(), channels )
                    .map_err( |e| PlayerError::DeviceInit( e.to_string() ) )?,
            )
        } else {
            None
        };

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let frames_decoded = Arc::new( AtomicU64::new( 0 ) );
        let finished = Arc::new( AtomicBool::new( false ) );

        let thread_ring = Arc::clone( &ring );
        let thread_stop = Arc::clone( &stop_flag );
        let thread_frames = Arc::clone( &frames_decoded );
        let thread_finished = Arc::clone( &finished );

        let decode_thread = thread::spawn( move || {
            Self::decode_loop(
                &mut decoder,
                resampler,
                &thread_ring,
                &thread_stop,
                &thread_frames,
                &thread_finished,
            );
        });

        Ok( Self {
            ring,
            output: OutputHandle( output ),
            stop_flag,
            decode_thread: Some( decode_thread ),
            state: PlaybackState::Stopped,
            frames_decoded,
            finished,
            sample_rate: source_rate,
            duration,
            path: path.to_path_buf(),
        })
    }


    /// Feeds the ring from the decoder until EOF or shutdown.
    fn decode_loop(
        decoder: &mut Decoder,
        mut resampler: Option<Resampler>,
        ring: &SampleRing,
        stop_flag: &AtomicBool,
        frames_decoded: &AtomicU64,
        finished: &AtomicBool,
    ) {
        let channels = decoder.channels();
        // Keep roughly 50ms decoded ahead of the callback
        let watermark = ( decoder.sample_rate() as usize * channels ) / 20;

        loop {
            if stop_flag.load( Ordering::Relaxed ) {
                tracing::debug!( "Decode loop: shutdown signal" );
                return;
            }

            if ring.is_paused() {
                thread::sleep( Duration::from_millis( 10 ) );
                continue;
            }

            if ring.len() > watermark {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match decoder.next_samples() {
                Ok( Some( samples ) ) => {
                    frames_decoded
                        .fetch_add( ( samples.len() / channels ) as u64, Ordering::Relaxed );

                    let converted = match resampler.as_mut() {
                        Some( resampler ) => match resampler.process( samples ) {
                            Ok( converted ) => converted,
                            Err( e ) => {
                                tracing::error!( "{}", e );
                                return;
                            }
                        },
                        None => samples.to_vec(),
                    };

                    Self::push_all( ring, &converted, stop_flag );
                }
                Ok( None ) => {
                    if let Some( resampler ) = resampler.as_mut() {
                        match resampler.flush() {
                            Ok( tail ) => Self::push_all( ring, &tail, stop_flag ),
                            Err( e ) => tracing::error!( "{}", e ),
                        }
                    }

                    tracing::info!( "Decode loop: end of source" );
                    while !ring.is_empty() && !stop_flag.load( Ordering::Relaxed ) {
                        thread::sleep( Duration::from_millis( 10 ) );
                    }
                    finished.store( true, Ordering::Relaxed );
                    return;
                }
                Err( e ) => {
                    tracing::error!( "{}", e );
                    return;
                }
            }
        }
    }


    /// Pushes a full chunk into the ring, yielding while it is saturated.
    fn push_all( ring: &SampleRing, samples: &[f32], stop_flag: &AtomicBool ) {
        let mut offset = 0;
        while offset < samples.len() && !stop_flag.load( Ordering::Relaxed ) {
            let accepted = ring.push( &samples[ offset.. ] );
            offset += accepted;
            if accepted == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }


    /// Starts (or resumes) audible output. No-op when already playing.
    pub fn play( &mut self ) -> Result<(), PlayerError> {
        if self.state == PlaybackState::Playing {
            return Ok(());
        }

        self.output
            .0
            .start()
            .map_err( |e| PlayerError::DeviceStart( e.to_string() ) )?;
        self.ring.set_paused( false );
        self.state = PlaybackState::Playing;

        tracing::info!( "Playing {:?}", self.path );
        Ok(())
    }


    /// Stops audible output, retaining position. No-op when already stopped.
    pub fn stop( &mut self ) -> Result<(), PlayerError> {
        if self.state == PlaybackState::Stopped {
            return Ok(());
        }

        self.ring.set_paused( true );
        self.output
            .0
            .pause()
            .map_err( |e| PlayerError::DeviceControl( e.to_string() ) )?;
        self.state = PlaybackState::Stopped;

        tracing::info!( "Stopped {:?}", self.path );
        Ok(())
    }


    /// Releases the player: stops the decode thread and drops the stream.
    /// Equivalent to dropping, spelled out for callers porting from the C
    /// surface's `audio_cleanup`.
    pub fn close( self ) {
        // Drop impl does the teardown
    }


    /// Current control state.
    pub fn state( &self ) -> PlaybackState {
        self.state
    }


    /// Source position decoded so far. Runs slightly ahead of what is
    /// audible by the depth of the ring.
    pub fn position( &self ) -> Duration {
        let frames = self.frames_decoded.load( Ordering::Relaxed );
        Duration::from_secs_f64( frames as f64 / self.sample_rate as f64 )
    }


    /// Total source duration, when the container reports one.
    pub fn duration( &self ) -> Option<Duration> {
        self.duration
    }


    /// True once the source has drained completely.
    pub fn finished( &self ) -> bool {
        self.finished.load( Ordering::Relaxed )
    }


    /// Sets playback volume (0.0 = mute, 1.0 = unity).
    pub fn set_volume( &mut self, volume: f32 ) {
        self.ring.set_volume( volume );
    }


    pub fn volume( &self ) -> f32 {
        self.ring.volume()
    }


    /// The path this player was opened from.
    pub fn path( &self ) -> &Path {
        &self.path
    }
}


impl Drop for Player {
    fn drop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        if let Some( thread ) = self.decode_thread.take() {
            let _ = thread.join();
        }
        // The cpal stream stops when OutputHandle drops
        tracing::debug!( "Released {:?}", self.path );
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::test_util::write_test_wav;


    #[test]
    fn test_open_missing_file_is_invalid_file() {
        let err = Player::open( Path::new( "/nonexistent/missing.mp3" ) ).unwrap_err();
        assert!( matches!( err, PlayerError::InvalidFile( _ ) ) );
    }


    #[test]
    fn test_open_non_audio_file_is_invalid_file() {
        let path = std::env::temp_dir()
            .join( format!( "plink-test-{}-not-audio.txt", std::process::id() ) );
        std::fs::write( &path, "just text" ).unwrap();

        let err = Player::open( &path ).unwrap_err();
        assert!( matches!( err, PlayerError::InvalidFile( _ ) ) );

        let _ = std::fs::remove_file( &path );
    }


    #[test]
    fn test_decoder_error_mapping() {
        let file_err: PlayerError = DecoderError::UnsupportedFormat.into();
        assert!( matches!( file_err, PlayerError::InvalidFile( _ ) ) );

        let codec_err: PlayerError = DecoderError::NoAudioTrack.into();
        assert!( matches!( codec_err, PlayerError::DecoderInit( _ ) ) );
    }


    #[test]
    #[ignore = "requires an audio output device"]
    fn test_round_trip_lifecycle() {
        let path = write_test_wav( "lifecycle.wav", 44100, 2, 44100 );

        for _ in 0..3 {
            let mut player = Player::open( &path ).unwrap();
            assert_eq!( player.state(), PlaybackState::Stopped );

            player.play().unwrap();
            assert_eq!( player.state(), PlaybackState::Playing );

            std::thread::sleep( Duration::from_millis( 100 ) );

            player.stop().unwrap();
            assert_eq!( player.state(), PlaybackState::Stopped );

            // Stop from Stopped is a no-op
            player.stop().unwrap();

            player.close();
        }

        let _ = std::fs::remove_file( &path );
    }


    #[test]
    #[ignore = "requires an audio output device"]
    fn test_short_file_reports_finished() {
        let path = write_test_wav( "finish.wav", 8000, 1, 800 );

        let mut player = Player::open( &path ).unwrap();
        player.play().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs( 5 );
        while !player.finished() && std::time::Instant::now() < deadline {
            std::thread::sleep( Duration::from_millis( 20 ) );
        }
        assert!( player.finished() );

        let _ = std::fs::remove_file( &path );
    }
}
