//! Persistent CLI settings
//!
//! Currently just the last-used volume, stored as JSON in the user config
//! directory. Load never fails: missing or corrupt files fall back to
//! defaults.

use std::fs;
use std::path::PathBuf;

use serde::{ Deserialize, Serialize };


/// Saved settings.
#[derive( Debug, Clone, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Playback volume (0.0 = mute, 1.0 = unity).
    pub volume: f32,
}


impl Default for Settings {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "plink" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => serde_json::from_str( &contents ).unwrap_or_default(),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return,
        };

        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( &path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str( "{}" ).unwrap();
        assert_eq!( settings.volume, 1.0 );
    }


    #[test]
    fn test_round_trip() {
        let settings = Settings { volume: 0.4 };
        let json = serde_json::to_string( &settings ).unwrap();
        let back: Settings = serde_json::from_str( &json ).unwrap();
        assert_eq!( back.volume, 0.4 );
    }
}
