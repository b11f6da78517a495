//! Audio volume and media transport control
//!
//! Volume goes through an ALSA simple-mixer element; transport commands go to
//! the first MPRIS player found on the session bus. Both controllers keep a
//! lazily opened connection behind a lock and block on every call.

pub mod alsa_mixer;
pub mod media_control;
pub mod mpris_bus;
pub mod volume;

pub use alsa_mixer::AlsaBackend;
pub use media_control::{
    BusConnector, MediaController, MediaError, MediaState, MprisBus, PlayerCommand, TrackMetadata,
};
pub use mpris_bus::{SessionBus, SessionBusConnector};
pub use volume::{
    ElementSelector, MixerSession, VolumeBackend, VolumeController, VolumeError, VolumeRange,
};

use crate::config::Config;

/// Both controllers, owned by the host and passed wherever calls are made.
pub struct AudioServices<B: VolumeBackend = AlsaBackend, C: BusConnector = SessionBusConnector> {
    pub volume: VolumeController<B>,
    pub media: MediaController<C>,
}

impl AudioServices {
    /// System backends configured from `config`. Nothing is opened until the
    /// first call.
    pub fn from_config(config: &Config) -> Self {
        Self {
            volume: VolumeController::from_config(
                AlsaBackend::new(config.volume.device.clone()),
                &config.volume,
            ),
            media: MediaController::from_config(
                SessionBusConnector::from_config(&config.media),
                &config.media,
            ),
        }
    }
}

impl<B: VolumeBackend, C: BusConnector> AudioServices<B, C> {
    /// Release both connections.
    pub fn cleanup(&self) {
        self.volume.cleanup();
        self.media.cleanup();
    }
}

impl<B: VolumeBackend, C: BusConnector> Drop for AudioServices<B, C> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
