//! plink CLI - minimal single-file player
//!
//! Opens one file through the playback facade and drives it from a raw-mode
//! key loop: space toggles play/stop, +/- adjusts volume, q quits.

mod cli;
mod settings;

use std::io::{ self, Write };
use std::time::Duration;

use anyhow::{ Context, Result };
use clap::Parser;
use crossterm::event::{ self, Event, KeyCode, KeyEventKind };
use crossterm::terminal::{ disable_raw_mode, enable_raw_mode };

use cli::Args;
use plink_core::{ PlaybackState, Player };
use settings::Settings;


fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else( |_| tracing_subscriber::EnvFilter::new( "warn" ) ),
        )
        .with_writer( io::stderr )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load();

    let mut player = Player::open( &args.file )
        .with_context( || format!( "Cannot open {}", args.file.display() ) )?;

    let volume = args
        .volume
        .map( |v| v.min( 100 ) as f32 / 100.0 )
        .unwrap_or( settings.volume );
    player.set_volume( volume );

    if !args.paused {
        player.play()?;
    }

    enable_raw_mode()?;
    let result = run( &mut player );
    disable_raw_mode()?;
    println!();

    // Persist the volume the user ended up with
    settings.volume = player.volume();
    settings.save();

    player.close();
    result
}


/// Key loop; returns when the track finishes or the user quits.
fn run( player: &mut Player ) -> Result<()> {
    loop {
        draw_status( player )?;

        if player.finished() {
            break;
        }

        if !event::poll( Duration::from_millis( 200 ) )? {
            continue;
        }

        if let Event::Key( key ) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char( ' ' ) => {
                    match player.state() {
                        PlaybackState::Playing => player.stop()?,
                        PlaybackState::Stopped => player.play()?,
                    }
                }
                KeyCode::Char( 'p' ) => player.play()?,
                KeyCode::Char( 's' ) => player.stop()?,
                KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => {
                    player.set_volume( ( player.volume() + 0.05 ).min( 1.5 ) );
                }
                KeyCode::Char( '-' ) => {
                    player.set_volume( ( player.volume() - 0.05 ).max( 0.0 ) );
                }
                KeyCode::Char( 'q' ) | KeyCode::Esc => break,
                _ => {}
            }
        }
    }

    Ok(())
}


/// Redraws the single status line in place.
fn draw_status( player: &Player ) -> Result<()> {
    let state = match player.state() {
        PlaybackState::Playing => "playing",
        PlaybackState::Stopped => "stopped",
    };

    let position = format_time( player.position() );
    let duration = player
        .duration()
        .map( format_time )
        .unwrap_or_else( || "--:--".to_string() );

    let mut stdout = io::stdout();
    write!(
        stdout,
        "\r[{}] {} / {}  vol {:3.0}%  (space: play/stop, +/-: volume, q: quit) ",
        state,
        position,
        duration,
        player.volume() * 100.0
    )?;
    stdout.flush()?;

    Ok(())
}


/// Formats a duration as m:ss.
fn format_time( d: Duration ) -> String {
    let total = d.as_secs();
    format!( "{}:{:02}", total / 60, total % 60 )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( Duration::from_secs( 0 ) ), "0:00" );
        assert_eq!( format_time( Duration::from_secs( 59 ) ), "0:59" );
        assert_eq!( format_time( Duration::from_secs( 90 ) ), "1:30" );
        assert_eq!( format_time( Duration::from_secs( 3600 ) ), "60:00" );
    }
}
