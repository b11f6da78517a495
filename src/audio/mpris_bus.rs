//! zbus-backed session bus for the media controller

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::Runtime;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};
use zbus::{proxy, Connection};

use super::media_control::{BusConnector, MediaError, MprisBus, PlayerCommand, TrackMetadata};
use crate::config::MediaConfig;

pub const MPRIS_OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
/// Track id players report when nothing is loaded.
pub const NO_TRACK: &str = "/org/mpris/MediaPlayer2/TrackList/NoTrack";

#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait Player {
    fn play(&self) -> zbus::Result<()>;
    fn pause(&self) -> zbus::Result<()>;
    fn next(&self) -> zbus::Result<()>;
    fn previous(&self) -> zbus::Result<()>;
    fn seek(&self, offset: i64) -> zbus::Result<()>;
    fn set_position(&self, track_id: &ObjectPath<'_>, position: i64) -> zbus::Result<()>;

    #[zbus(property)]
    fn position(&self) -> zbus::Result<i64>;

    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

/// Connects to the user's session bus.
#[derive(Debug, Clone)]
pub struct SessionBusConnector {
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl SessionBusConnector {
    pub fn new(connect_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            call_timeout,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.call_timeout_ms),
        )
    }
}

impl Default for SessionBusConnector {
    fn default() -> Self {
        Self::from_config(&MediaConfig::default())
    }
}

impl BusConnector for SessionBusConnector {
    type Bus = SessionBus;

    fn connect(&self) -> Result<SessionBus, MediaError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MediaError::Connection(format!("Failed to create runtime: {}", e)))?;

        let connection = runtime
            .block_on(async {
                tokio::time::timeout(self.connect_timeout, Connection::session()).await
            })
            .map_err(|_| MediaError::Connection("timed out connecting to session bus".into()))?
            .map_err(|e| MediaError::Connection(format!("Failed to connect to session bus: {}", e)))?;

        Ok(SessionBus {
            runtime,
            connection,
            connect_timeout: self.connect_timeout,
            call_timeout: self.call_timeout,
        })
    }
}

/// A session bus connection driven by a private current-thread runtime.
///
/// Calls block the caller; they must not be made from inside another tokio
/// runtime.
pub struct SessionBus {
    runtime: Runtime,
    connection: Connection,
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl SessionBus {
    fn block_on<T>(
        &self,
        what: &str,
        fut: impl Future<Output = zbus::Result<T>>,
    ) -> Result<T, MediaError> {
        let timeout = self.call_timeout;
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, fut).await })
            .map_err(|_| MediaError::Command(format!("{what} timed out after {timeout:?}")))?
            .map_err(|e| MediaError::Command(format!("{what} failed: {e}")))
    }

    async fn player(&self, service: &str) -> zbus::Result<PlayerProxy<'_>> {
        PlayerProxy::builder(&self.connection)
            .destination(service.to_owned())?
            .path(MPRIS_OBJECT_PATH)?
            .cache_properties(CacheProperties::No)
            .build()
            .await
    }
}

impl MprisBus for SessionBus {
    fn list_names(&self) -> Result<Vec<String>, MediaError> {
        let timeout = self.connect_timeout;
        let names = self
            .runtime
            .block_on(async {
                tokio::time::timeout(timeout, async {
                    zbus::fdo::DBusProxy::new(&self.connection)
                        .await?
                        .list_names()
                        .await
                })
                .await
            })
            .map_err(|_| MediaError::Connection("ListNames timed out".into()))?
            .map_err(|e| MediaError::Connection(format!("ListNames failed: {}", e)))?;

        Ok(names.into_iter().map(|name| name.as_str().to_owned()).collect())
    }

    fn call(&self, service: &str, command: &PlayerCommand) -> Result<(), MediaError> {
        self.block_on(command.method_name(), async {
            let player = self.player(service).await?;
            match command {
                PlayerCommand::Play => player.play().await,
                PlayerCommand::Pause => player.pause().await,
                PlayerCommand::Next => player.next().await,
                PlayerCommand::Previous => player.previous().await,
                PlayerCommand::Seek(offset) => player.seek(*offset).await,
                PlayerCommand::SetPosition { track_id, position } => {
                    let track_id = ObjectPath::try_from(track_id.as_str())?;
                    player.set_position(&track_id, *position).await
                }
            }
        })
    }

    fn position(&self, service: &str) -> Result<i64, MediaError> {
        self.block_on("Position", async { self.player(service).await?.position().await })
    }

    fn current_track(&self, service: &str) -> Result<TrackMetadata, MediaError> {
        let metadata =
            self.block_on("Metadata", async { self.player(service).await?.metadata().await })?;
        Ok(TrackMetadata {
            track_id: track_id_from_metadata(&metadata),
            length: track_length_from_metadata(&metadata),
        })
    }
}

/// Extract `mpris:trackid`.
///
/// The MPRIS type is an object path, but some players send a plain string;
/// strings are accepted when they are valid object paths. The `NoTrack`
/// sentinel counts as no track.
pub fn track_id_from_metadata(metadata: &HashMap<String, OwnedValue>) -> Option<String> {
    let track_id = match &**metadata.get("mpris:trackid")? {
        Value::ObjectPath(path) => path.to_string(),
        Value::Str(s) => ObjectPath::try_from(s.as_str()).ok()?.to_string(),
        _ => return None,
    };
    (track_id != NO_TRACK).then_some(track_id)
}

/// Extract `mpris:length` in microseconds.
///
/// The MPRIS type is int64; unsigned and 32-bit integers are accepted too.
/// Negative lengths count as unknown.
pub fn track_length_from_metadata(metadata: &HashMap<String, OwnedValue>) -> Option<i64> {
    let length = match &**metadata.get("mpris:length")? {
        Value::I64(length) => *length,
        Value::U64(length) => i64::try_from(*length).ok()?,
        Value::I32(length) => i64::from(*length),
        Value::U32(length) => i64::from(*length),
        _ => return None,
    };
    (length >= 0).then_some(length)
}
