//! C ABI for the plink playback facade
//!
//! Exposes the four-function lifecycle (`audio_init`, `audio_play`,
//! `audio_stop`, `audio_cleanup`) over [`plink_core::Player`] with a stable
//! integer error encoding.
//!
//! Handles are pointer-sized ids into a process-wide registry rather than
//! raw heap pointers, so a stale or doubly-released handle is a defined,
//! logged no-op instead of undefined behavior. `audio_play`, `audio_stop`
//! and `audio_cleanup` keep the original silent-failure contract: they
//! return nothing, and faults are only logged. Panics never unwind across
//! the ABI.

use std::collections::HashMap;
use std::ffi::{ c_char, c_void, CStr };
use std::panic::{ self, AssertUnwindSafe };
use std::path::Path;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Mutex, OnceLock };

use plink_core::{ Player, PlayerError };


/// Opaque playback handle as seen by C callers.
pub type AudioHandle = *mut c_void;


/// Stable error encoding of the C surface. Values are part of the ABI.
#[repr( i32 )]
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum AudioErrorCode {
    Success = 0,
    DecoderInit = -1,
    DeviceInit = -2,
    InvalidFile = -3,
    DeviceStart = -4,
}


impl From<&PlayerError> for AudioErrorCode {
    fn from( err: &PlayerError ) -> Self {
        match err {
            PlayerError::InvalidFile( _ ) => AudioErrorCode::InvalidFile,
            PlayerError::DecoderInit( _ ) => AudioErrorCode::DecoderInit,
            PlayerError::DeviceInit( _ ) => AudioErrorCode::DeviceInit,
            // DeviceControl cannot occur during init; fold it with the
            // other start-path fault for totality
            PlayerError::DeviceStart( _ ) | PlayerError::DeviceControl( _ ) => {
                AudioErrorCode::DeviceStart
            }
        }
    }
}


/// Live players, keyed by the id handed out as the opaque handle.
fn registry() -> &'static Mutex<HashMap<usize, Player>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Player>>> = OnceLock::new();
    REGISTRY.get_or_init( || Mutex::new( HashMap::new() ) )
}


// Id 0 is never issued; a null handle can never alias a live player.
static NEXT_ID: AtomicUsize = AtomicUsize::new( 1 );


/// Runs `f`, converting any panic into `fallback` instead of unwinding
/// into the C caller.
fn guarded<T>( fallback: T, f: impl FnOnce() -> T ) -> T {
    panic::catch_unwind( AssertUnwindSafe( f ) ).unwrap_or_else( |_| {
        tracing::error!( "Panic caught at C ABI boundary" );
        fallback
    })
}


/// Opens the audio file at `file_path` and, on success, writes a live
/// handle through `handle` and returns `Success`.
///
/// On failure `*handle` is left untouched and no resources remain
/// allocated. Contract violations (null or non-UTF-8 `file_path`, null
/// `handle`) report `InvalidFile`.
///
/// # Safety
///
/// `file_path` must be a valid NUL-terminated string and `handle` must
/// point to writable memory, or both must be null-checked by this call
/// (null is tolerated and reported).
#[no_mangle]
pub unsafe extern "C" fn audio_init(
    file_path: *const c_char,
    handle: *mut AudioHandle,
) -> AudioErrorCode {
    guarded( AudioErrorCode::DeviceInit, || {
        if file_path.is_null() || handle.is_null() {
            tracing::warn!( "audio_init called with null argument" );
            return AudioErrorCode::InvalidFile;
        }

        let path = match unsafe { CStr::from_ptr( file_path ) }.to_str() {
            Ok( path ) => path,
            Err( _ ) => {
                tracing::warn!( "audio_init called with non-UTF-8 path" );
                return AudioErrorCode::InvalidFile;
            }
        };

        match Player::open( Path::new( path ) ) {
            Ok( player ) => {
                let id = NEXT_ID.fetch_add( 1, Ordering::Relaxed );
                registry().lock().unwrap().insert( id, player );
                unsafe { *handle = id as AudioHandle };
                AudioErrorCode::Success
            }
            Err( e ) => {
                tracing::warn!( "audio_init failed: {}", e );
                AudioErrorCode::from( &e )
            }
        }
    })
}


/// Starts (or resumes) playback on a live handle.
///
/// Invalid handles and device faults are logged no-ops, matching the
/// original void-returning contract.
#[no_mangle]
pub extern "C" fn audio_play( handle: AudioHandle ) {
    guarded( (), || {
        let id = handle as usize;
        match registry().lock().unwrap().get_mut( &id ) {
            Some( player ) => {
                if let Err( e ) = player.play() {
                    tracing::warn!( "audio_play failed: {}", e );
                }
            }
            None => tracing::warn!( "audio_play on invalid handle {:?}", handle ),
        }
    })
}


/// Stops playback on a live handle. Position is retained; a later
/// `audio_play` resumes. Invalid handles are logged no-ops.
#[no_mangle]
pub extern "C" fn audio_stop( handle: AudioHandle ) {
    guarded( (), || {
        let id = handle as usize;
        match registry().lock().unwrap().get_mut( &id ) {
            Some( player ) => {
                if let Err( e ) = player.stop() {
                    tracing::warn!( "audio_stop failed: {}", e );
                }
            }
            None => tracing::warn!( "audio_stop on invalid handle {:?}", handle ),
        }
    })
}


/// Releases the handle and every resource behind it. The handle is dead
/// afterwards; releasing it again (or any unknown handle) is a logged
/// no-op.
#[no_mangle]
pub extern "C" fn audio_cleanup( handle: AudioHandle ) {
    guarded( (), || {
        let id = handle as usize;
        match registry().lock().unwrap().remove( &id ) {
            Some( player ) => player.close(),
            None => tracing::warn!( "audio_cleanup on invalid handle {:?}", handle ),
        }
    })
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;


    fn live_count() -> usize {
        registry().lock().unwrap().len()
    }


    /// Minimal 16-bit PCM WAV fixture.
    fn write_test_wav( name: &str, sample_rate: u32, frames: u32 ) -> PathBuf {
        let path = std::env::temp_dir()
            .join( format!( "plink-capi-{}-{}", std::process::id(), name ) );

        let data_len = frames * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice( b"RIFF" );
        bytes.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
        bytes.extend_from_slice( b"WAVEfmt " );
        bytes.extend_from_slice( &16u32.to_le_bytes() );
        bytes.extend_from_slice( &1u16.to_le_bytes() );
        bytes.extend_from_slice( &1u16.to_le_bytes() ); // mono
        bytes.extend_from_slice( &sample_rate.to_le_bytes() );
        bytes.extend_from_slice( &( sample_rate * 2 ).to_le_bytes() );
        bytes.extend_from_slice( &2u16.to_le_bytes() );
        bytes.extend_from_slice( &16u16.to_le_bytes() );
        bytes.extend_from_slice( b"data" );
        bytes.extend_from_slice( &data_len.to_le_bytes() );
        for i in 0..frames {
            let sample = ( ( i as f32 * 0.05 ).sin() * 16000.0 ) as i16;
            bytes.extend_from_slice( &sample.to_le_bytes() );
        }

        File::create( &path ).unwrap().write_all( &bytes ).unwrap();
        path
    }


    #[test]
    fn test_error_codes_are_abi_stable() {
        assert_eq!( AudioErrorCode::Success as i32, 0 );
        assert_eq!( AudioErrorCode::DecoderInit as i32, -1 );
        assert_eq!( AudioErrorCode::DeviceInit as i32, -2 );
        assert_eq!( AudioErrorCode::InvalidFile as i32, -3 );
        assert_eq!( AudioErrorCode::DeviceStart as i32, -4 );
    }


    #[test]
    fn test_init_missing_file_leaves_handle_untouched() {
        let sentinel = 0xDEAD_usize as AudioHandle;
        let mut handle = sentinel;
        let path = CString::new( "/nonexistent/missing.mp3" ).unwrap();

        let code = unsafe { audio_init( path.as_ptr(), &mut handle ) };

        assert_eq!( code, AudioErrorCode::InvalidFile );
        assert_eq!( handle, sentinel );
    }


    #[test]
    fn test_init_null_arguments_are_rejected() {
        let mut handle: AudioHandle = std::ptr::null_mut();
        let path = CString::new( "whatever.wav" ).unwrap();

        let null_path = unsafe { audio_init( std::ptr::null(), &mut handle ) };
        assert_eq!( null_path, AudioErrorCode::InvalidFile );
        assert!( handle.is_null() );

        let null_out = unsafe { audio_init( path.as_ptr(), std::ptr::null_mut() ) };
        assert_eq!( null_out, AudioErrorCode::InvalidFile );
    }


    #[test]
    fn test_control_calls_on_invalid_handle_are_noops() {
        let bogus = 0x7777_usize as AudioHandle;
        audio_play( bogus );
        audio_stop( bogus );
        audio_cleanup( bogus );
        audio_cleanup( bogus ); // double release, still a no-op
        audio_play( std::ptr::null_mut() );
    }


    #[test]
    #[ignore = "requires an audio output device"]
    fn test_round_trip_releases_everything() {
        let wav = write_test_wav( "roundtrip.wav", 44100, 44100 );
        let c_path = CString::new( wav.to_str().unwrap() ).unwrap();
        let baseline = live_count();

        for _ in 0..3 {
            let mut handle: AudioHandle = std::ptr::null_mut();
            let code = unsafe { audio_init( c_path.as_ptr(), &mut handle ) };
            assert_eq!( code, AudioErrorCode::Success );
            assert!( !handle.is_null() );
            assert_eq!( live_count(), baseline + 1 );

            audio_play( handle );
            audio_stop( handle );
            audio_play( handle );
            audio_stop( handle );
            audio_cleanup( handle );
            assert_eq!( live_count(), baseline );

            // The handle is dead now; further use is a defined no-op
            audio_play( handle );
            audio_cleanup( handle );
            assert_eq!( live_count(), baseline );
        }

        let _ = std::fs::remove_file( &wav );
    }
}
