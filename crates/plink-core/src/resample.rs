//! Sample rate conversion via rubato
//!
//! Used only when the output device cannot run at the source rate. Presents
//! an interleaved-in, interleaved-out interface; the planar buffering rubato
//! wants is handled internally.

use rubato::{ FastFixedOut, PolynomialDegree, Resampler as RubatoResampler };
use thiserror::Error;


/// Output chunk size in frames for each resampler pass.
const CHUNK_FRAMES: usize = 1024;


/// Errors from resampler construction or processing.
#[derive( Debug, Error )]
pub enum ResampleError {
    #[error( "Failed to create resampler: {0}" )]
    Construction( String ),

    #[error( "Resample error: {0}" )]
    Process( String ),
}


/// Streaming rate converter for one source.
pub struct Resampler {
    inner: FastFixedOut<f32>,
    channels: usize,
    /// Planar backlog of frames not yet consumed by the inner resampler.
    pending: Vec<Vec<f32>>,
}


impl Resampler {
    /// Creates a converter from `source_rate` to `target_rate` Hz.
    pub fn new( source_rate: u32, target_rate: u32, channels: usize ) -> Result<Self, ResampleError> {
        let inner = FastFixedOut::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0,
            PolynomialDegree::Cubic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err( |e| ResampleError::Construction( e.to_string() ) )?;

        tracing::info!( "Resampling: {} Hz -> {} Hz", source_rate, target_rate );

        Ok( Self {
            inner,
            channels,
            pending: ( 0..channels ).map( |_| Vec::new() ).collect(),
        })
    }


    /// Feeds interleaved samples and returns whatever full output chunks the
    /// backlog allows. May return an empty vec while input accumulates.
    pub fn process( &mut self, interleaved: &[f32] ) -> Result<Vec<f32>, ResampleError> {
        for frame in interleaved.chunks_exact( self.channels ) {
            for ( ch, sample ) in frame.iter().enumerate() {
                self.pending[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= self.inner.input_frames_next() {
            let needed = self.inner.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            let planar = self
                .inner
                .process( &chunk, None )
                .map_err( |e| ResampleError::Process( e.to_string() ) )?;
            append_interleaved( &mut out, &planar );
        }

        Ok( out )
    }


    /// Drains any frames still held in the backlog. Call once at EOF.
    pub fn flush( &mut self ) -> Result<Vec<f32>, ResampleError> {
        if self.pending[ 0 ].is_empty() {
            return Ok( Vec::new() );
        }

        let planar = self
            .inner
            .process_partial( Some( &self.pending ), None )
            .map_err( |e| ResampleError::Process( e.to_string() ) )?;

        for ch in self.pending.iter_mut() {
            ch.clear();
        }

        let mut out = Vec::new();
        append_interleaved( &mut out, &planar );
        Ok( out )
    }
}


/// Appends planar channel data to `out` in interleaved order.
fn append_interleaved( out: &mut Vec<f32>, planar: &[Vec<f32>] ) {
    if planar.is_empty() || planar[ 0 ].is_empty() {
        return;
    }
    let frames = planar[ 0 ].len();
    out.reserve( frames * planar.len() );
    for f in 0..frames {
        for ch in planar {
            out.push( ch[ f ] );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn sine( rate: u32, frames: usize ) -> Vec<f32> {
        ( 0..frames )
            .map( |i| ( i as f32 / rate as f32 * 440.0 * std::f32::consts::TAU ).sin() )
            .collect()
    }


    #[test]
    fn test_upsample_doubles_output_length() {
        let mut resampler = Resampler::new( 8000, 16000, 1 ).unwrap();

        let input = sine( 8000, 8000 );
        let mut total = 0usize;
        for chunk in input.chunks( 512 ) {
            total += resampler.process( chunk ).unwrap().len();
        }
        total += resampler.flush().unwrap().len();

        // 2x the input, within a couple of chunks of internal latency
        assert!( total > 14000 && total < 18500, "got {} samples", total );
    }


    #[test]
    fn test_stereo_output_stays_frame_aligned() {
        let mut resampler = Resampler::new( 44100, 48000, 2 ).unwrap();

        let mono = sine( 44100, 4410 );
        let interleaved: Vec<f32> = mono.iter().flat_map( |s| [*s, -*s] ).collect();

        let mut out = resampler.process( &interleaved ).unwrap();
        out.extend( resampler.flush().unwrap() );

        assert_eq!( out.len() % 2, 0 );
        assert!( !out.is_empty() );
    }


    #[test]
    fn test_flush_on_empty_backlog_is_empty() {
        let mut resampler = Resampler::new( 44100, 48000, 2 ).unwrap();
        assert!( resampler.flush().unwrap().is_empty() );
    }
}
