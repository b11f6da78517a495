//! ALSA simple-mixer backend
//!
//! `alsa::Mixer::new` opens, attaches, registers and loads the mixer in one
//! step, so a session is a single handle kept for the controller's lifetime.

use alsa::mixer::{Mixer, Selem, SelemChannelId, SelemId};
use tracing::trace;

use super::volume::{ElementSelector, MixerSession, VolumeBackend, VolumeError};

/// Channels tried, in order, when reading a single level. ALSA's mono
/// channel is the front-left one.
const READ_CHANNELS: [SelemChannelId; 2] = [SelemChannelId::FrontLeft, SelemChannelId::FrontRight];

/// Opens sessions on an ALSA mixer device such as `default` or `hw:0`.
#[derive(Debug, Clone)]
pub struct AlsaBackend {
    device: String,
}

impl AlsaBackend {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Default for AlsaBackend {
    fn default() -> Self {
        Self::new("default")
    }
}

impl VolumeBackend for AlsaBackend {
    type Session = AlsaSession;

    fn name(&self) -> &str {
        "alsa"
    }

    fn open(&self) -> Result<AlsaSession, VolumeError> {
        let mixer = Mixer::new(&self.device, false).map_err(|e| {
            VolumeError::Connection(format!("failed to open mixer '{}': {}", self.device, e))
        })?;
        Ok(AlsaSession { mixer })
    }
}

pub struct AlsaSession {
    mixer: Mixer,
}

impl AlsaSession {
    fn selem(&self, selector: &ElementSelector) -> Result<Selem<'_>, VolumeError> {
        let id = SelemId::new(&selector.name, selector.index);
        self.mixer
            .find_selem(&id)
            .ok_or_else(|| VolumeError::ElementNotFound(selector.to_string()))
    }
}

fn device_error(what: &str, selector: &ElementSelector, err: alsa::Error) -> VolumeError {
    VolumeError::Device(format!("{what} on {selector} failed: {err}"))
}

impl MixerSession for AlsaSession {
    fn refresh(&mut self) -> Result<(), VolumeError> {
        let handled = self
            .mixer
            .handle_events()
            .map_err(|e| VolumeError::Device(format!("failed to handle mixer events: {e}")))?;
        if handled > 0 {
            trace!(handled, "Processed pending mixer events");
        }
        Ok(())
    }

    fn playback_volume_range(&self, selector: &ElementSelector) -> Result<(i64, i64), VolumeError> {
        let selem = self.selem(selector)?;
        if !selem.has_playback_volume() {
            return Err(VolumeError::Device(format!(
                "element {selector} has no playback volume"
            )));
        }
        Ok(selem.get_playback_volume_range())
    }

    fn playback_volume(&self, selector: &ElementSelector) -> Result<i64, VolumeError> {
        let selem = self.selem(selector)?;
        let channel = READ_CHANNELS
            .into_iter()
            .find(|channel| selem.has_playback_channel(*channel))
            .ok_or_else(|| VolumeError::Device(format!("element {selector} has no playback channel")))?;
        selem
            .get_playback_volume(channel)
            .map_err(|e| device_error("reading playback volume", selector, e))
    }

    fn set_playback_volume_all(
        &mut self,
        selector: &ElementSelector,
        raw: i64,
    ) -> Result<(), VolumeError> {
        self.selem(selector)?
            .set_playback_volume_all(raw)
            .map_err(|e| device_error("writing playback volume", selector, e))
    }

    fn playback_switch(&self, selector: &ElementSelector) -> Result<bool, VolumeError> {
        let selem = self.selem(selector)?;
        if !selem.has_playback_switch() {
            return Err(VolumeError::Device(format!(
                "element {selector} has no playback switch"
            )));
        }
        selem
            .get_playback_switch(SelemChannelId::FrontLeft)
            .map(|value| value != 0)
            .map_err(|e| device_error("reading playback switch", selector, e))
    }

    fn set_playback_switch_all(
        &mut self,
        selector: &ElementSelector,
        on: bool,
    ) -> Result<(), VolumeError> {
        let selem = self.selem(selector)?;
        if !selem.has_playback_switch() {
            return Err(VolumeError::Device(format!(
                "element {selector} has no playback switch"
            )));
        }
        selem
            .set_playback_switch_all(i32::from(on))
            .map_err(|e| device_error("writing playback switch", selector, e))
    }
}
