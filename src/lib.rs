//! Master volume and MPRIS media transport control for host applications.
//!
//! ```no_run
//! use audioctl::{AudioServices, Config};
//!
//! let services = Config::with(AudioServices::from_config);
//! services.volume.set_volume(40)?;
//! services.media.play()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;

pub use audio::{AudioServices, MediaController, MediaError, VolumeController, VolumeError};
pub use config::Config;
