//! Command-line argument parsing for plink.

use std::path::PathBuf;

use clap::Parser;


/// plink - play one audio file from the terminal.
#[derive( Parser, Debug )]
#[command( name = "plink" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Audio file to open.
    pub file: PathBuf,

    /// Playback volume in percent (0-100). Overrides the saved setting.
    #[arg( short, long )]
    pub volume: Option<u8>,

    /// Open the file stopped instead of playing immediately.
    #[arg( long )]
    pub paused: bool,
}
