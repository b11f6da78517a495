//! Media player control via MPRIS D-Bus interface
//!
//! Discovers the first session-bus name carrying the MPRIS prefix and sends
//! transport commands (play, pause, next, previous, seek, set position) and
//! position/length queries to it. The discovered player is cached until `cleanup`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::config::MediaConfig;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Command failed: {0}")]
    Command(String),
}

/// Method calls on `org.mpris.MediaPlayer2.Player`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Next,
    Previous,
    /// Relative seek in microseconds
    Seek(i64),
    /// Absolute position in microseconds within `track_id`
    SetPosition { track_id: String, position: i64 },
}

impl PlayerCommand {
    pub fn method_name(&self) -> &'static str {
        match self {
            PlayerCommand::Play => "Play",
            PlayerCommand::Pause => "Pause",
            PlayerCommand::Next => "Next",
            PlayerCommand::Previous => "Previous",
            PlayerCommand::Seek(_) => "Seek",
            PlayerCommand::SetPosition { .. } => "SetPosition",
        }
    }
}

/// The parts of a player's `Metadata` the controller uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// `mpris:trackid`, absent for the `NoTrack` sentinel
    pub track_id: Option<String>,
    /// `mpris:length` in microseconds
    pub length: Option<i64>,
}

/// Position and length of the current track, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaState {
    pub position: i64,
    pub duration: i64,
}

/// A live bus connection.
///
/// Implementations bound each call by their own timeout and report a timeout
/// or an error reply as [`MediaError::Command`].
pub trait MprisBus: Send {
    /// Names currently owned on the bus.
    fn list_names(&self) -> Result<Vec<String>, MediaError>;

    fn call(&self, service: &str, command: &PlayerCommand) -> Result<(), MediaError>;

    /// `Position` property, in microseconds.
    fn position(&self, service: &str) -> Result<i64, MediaError>;

    /// Track id and length from the `Metadata` property.
    fn current_track(&self, service: &str) -> Result<TrackMetadata, MediaError>;
}

pub trait BusConnector: Send + Sync {
    type Bus: MprisBus;

    fn connect(&self) -> Result<Self::Bus, MediaError>;
}

struct PlayerSession<B> {
    bus: B,
    service: String,
}

/// Media controller over a single cached bus connection and player name
pub struct MediaController<C: BusConnector> {
    connector: C,
    service_prefix: String,
    session: Mutex<Option<PlayerSession<C::Bus>>>,
}

impl<C: BusConnector> MediaController<C> {
    pub fn new(connector: C, service_prefix: impl Into<String>) -> Self {
        Self {
            connector,
            service_prefix: service_prefix.into(),
            session: Mutex::new(None),
        }
    }

    pub fn from_config(connector: C, config: &MediaConfig) -> Self {
        Self::new(connector, config.service_prefix.clone())
    }

    pub fn service_prefix(&self) -> &str {
        &self.service_prefix
    }

    /// Bus name of the cached player, if connected.
    pub fn service_name(&self) -> Option<String> {
        self.lock().as_ref().map(|session| session.service.clone())
    }

    /// Connect and discover a player. Returns immediately while connected.
    pub fn init(&self) -> Result<(), MediaError> {
        let mut session = self.lock();
        if session.is_none() {
            *session = Some(self.discover()?);
        }
        Ok(())
    }

    /// Drop the cached player and bus connection. Safe when not connected.
    pub fn cleanup(&self) {
        if let Some(session) = self.lock().take() {
            debug!(player = %session.service, "Released media player connection");
        }
    }

    pub fn play(&self) -> Result<(), MediaError> {
        self.send(PlayerCommand::Play)
    }

    pub fn pause(&self) -> Result<(), MediaError> {
        self.send(PlayerCommand::Pause)
    }

    pub fn next(&self) -> Result<(), MediaError> {
        self.send(PlayerCommand::Next)
    }

    pub fn previous(&self) -> Result<(), MediaError> {
        self.send(PlayerCommand::Previous)
    }

    /// Seek relative to the current position; negative offsets seek back.
    pub fn seek(&self, offset_us: i64) -> Result<(), MediaError> {
        self.send(PlayerCommand::Seek(offset_us))
    }

    pub fn get_position(&self) -> Result<i64, MediaError> {
        self.with_session(|session| session.bus.position(&session.service))
    }

    /// Jump to an absolute position within the current track.
    pub fn set_position(&self, position_us: i64) -> Result<(), MediaError> {
        self.with_session(|session| {
            let track_id = session
                .bus
                .current_track(&session.service)?
                .track_id
                .ok_or_else(|| {
                    MediaError::NotFound(format!("{} reports no current track", session.service))
                })?;
            let command = PlayerCommand::SetPosition {
                track_id,
                position: position_us,
            };
            trace!(player = %session.service, ?command, "Sending media command");
            session.bus.call(&session.service, &command)
        })
    }

    /// Length of the current track.
    pub fn get_duration(&self) -> Result<i64, MediaError> {
        self.with_session(Self::duration)
    }

    /// Position and length of the current track, read in one locked call.
    pub fn get_media_state(&self) -> Result<MediaState, MediaError> {
        self.with_session(|session| {
            let position = session.bus.position(&session.service)?;
            let duration = Self::duration(session)?;
            Ok(MediaState { position, duration })
        })
    }

    fn duration(session: &PlayerSession<C::Bus>) -> Result<i64, MediaError> {
        session
            .bus
            .current_track(&session.service)?
            .length
            .ok_or_else(|| {
                MediaError::NotFound(format!("{} reports no track length", session.service))
            })
    }

    fn send(&self, command: PlayerCommand) -> Result<(), MediaError> {
        self.with_session(|session| {
            trace!(player = %session.service, ?command, "Sending media command");
            session.bus.call(&session.service, &command)
        })
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&PlayerSession<C::Bus>) -> Result<R, MediaError>,
    ) -> Result<R, MediaError> {
        let mut guard = self.lock();
        let session = match guard.take() {
            Some(session) => session,
            None => self.discover()?,
        };
        f(guard.insert(session))
    }

    fn discover(&self) -> Result<PlayerSession<C::Bus>, MediaError> {
        let bus = self.connector.connect()?;
        let service = bus
            .list_names()?
            .into_iter()
            .find(|name| name.starts_with(&self.service_prefix))
            .ok_or_else(|| {
                MediaError::NotFound(format!(
                    "no running player matching '{}'",
                    self.service_prefix
                ))
            })?;
        debug!(player = %service, "Found media player");
        Ok(PlayerSession { bus, service })
    }

    fn lock(&self) -> MutexGuard<'_, Option<PlayerSession<C::Bus>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
