//! Master volume and mute control
//!
//! The controller keeps one mixer session open for its lifetime and resolves
//! the configured simple element (usually `Master`) on every call:
//! - Scale the element's raw playback volume to a 0-100 percentage
//! - Apply a percentage uniformly to all channels
//! - Read/write the playback switch as an inverted mute flag

use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

use crate::config::VolumeConfig;

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("Mixer connection failed: {0}")]
    Connection(String),
    #[error("Mixer element not found: {0}")]
    ElementNotFound(String),
    #[error("Mixer device error: {0}")]
    Device(String),
}

/// A simple mixer element, addressed by name and index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSelector {
    pub name: String,
    pub index: u32,
}

impl ElementSelector {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl Default for ElementSelector {
    fn default() -> Self {
        Self::new("Master", 0)
    }
}

impl std::fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}',{}", self.name, self.index)
    }
}

/// Raw playback volume range advertised by an element.
///
/// Only non-degenerate ranges (`max > min`) can be built, so scaling never
/// divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeRange {
    min: i64,
    max: i64,
}

impl VolumeRange {
    pub fn new(min: i64, max: i64) -> Option<Self> {
        (max > min).then_some(Self { min, max })
    }

    /// Raw level to percentage, truncating. Levels outside the range are
    /// clamped first.
    pub fn to_percent(&self, raw: i64) -> u8 {
        let raw = raw.clamp(self.min, self.max);
        (100 * (raw - self.min) / (self.max - self.min)) as u8
    }

    /// Percentage to raw level, truncating. The percentage is clamped to 0-100.
    pub fn to_raw(&self, percent: i64) -> i64 {
        let percent = percent.clamp(0, 100);
        self.min + percent * (self.max - self.min) / 100
    }
}

/// An open mixer session.
///
/// Every method addresses the element through `selector` and returns
/// [`VolumeError::ElementNotFound`] when the mixer has no such element.
pub trait MixerSession: Send {
    /// Pull pending change events so cached values are current.
    fn refresh(&mut self) -> Result<(), VolumeError> {
        Ok(())
    }

    /// Raw `(min, max)` as advertised, possibly degenerate.
    fn playback_volume_range(&self, selector: &ElementSelector) -> Result<(i64, i64), VolumeError>;

    fn playback_volume(&self, selector: &ElementSelector) -> Result<i64, VolumeError>;

    fn set_playback_volume_all(
        &mut self,
        selector: &ElementSelector,
        raw: i64,
    ) -> Result<(), VolumeError>;

    /// `true` when the playback switch is on, i.e. the element is audible.
    fn playback_switch(&self, selector: &ElementSelector) -> Result<bool, VolumeError>;

    fn set_playback_switch_all(
        &mut self,
        selector: &ElementSelector,
        on: bool,
    ) -> Result<(), VolumeError>;
}

/// A sound system able to open mixer sessions.
pub trait VolumeBackend: Send + Sync {
    type Session: MixerSession;

    fn name(&self) -> &str;

    fn open(&self) -> Result<Self::Session, VolumeError>;
}

/// Volume controller over a single cached mixer session
pub struct VolumeController<B: VolumeBackend> {
    backend: B,
    selector: ElementSelector,
    session: Mutex<Option<B::Session>>,
}

impl<B: VolumeBackend> VolumeController<B> {
    pub fn new(backend: B, selector: ElementSelector) -> Self {
        Self {
            backend,
            selector,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(backend: B, config: &VolumeConfig) -> Self {
        Self::new(
            backend,
            ElementSelector::new(config.element.clone(), config.element_index),
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn selector(&self) -> &ElementSelector {
        &self.selector
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Open the mixer session. Returns immediately if one is already open.
    pub fn init(&self) -> Result<(), VolumeError> {
        let mut session = self.lock();
        if session.is_none() {
            *session = Some(self.open_session()?);
        }
        Ok(())
    }

    /// Release the mixer session. Safe to call when nothing is open.
    pub fn cleanup(&self) {
        if self.lock().take().is_some() {
            debug!(backend = self.backend.name(), "Closed mixer session");
        }
    }

    /// Current volume (0-100). A missing element reads as 0.
    pub fn get_volume(&self) -> Result<u8, VolumeError> {
        let selector = &self.selector;
        self.with_session(|session| {
            session.refresh()?;
            let range = match session.playback_volume_range(selector) {
                Ok(range) => range,
                Err(VolumeError::ElementNotFound(_)) => {
                    trace!(element = %selector, "No volume element, reporting 0");
                    return Ok(0);
                }
                Err(e) => return Err(e),
            };
            let range = Self::checked_range(selector, range)?;
            let raw = session.playback_volume(selector)?;
            Ok(range.to_percent(raw))
        })
    }

    /// Set volume on all channels. `percent` is clamped to 0-100.
    pub fn set_volume(&self, percent: i64) -> Result<(), VolumeError> {
        let percent = percent.clamp(0, 100);
        let selector = &self.selector;
        self.with_session(|session| {
            session.refresh()?;
            let range = session
                .playback_volume_range(selector)
                .map_err(Self::element_required)?;
            let range = Self::checked_range(selector, range)?;
            let raw = range.to_raw(percent);
            trace!(element = %selector, percent, raw, "Setting volume");
            session
                .set_playback_volume_all(selector, raw)
                .map_err(Self::element_required)
        })
    }

    /// `true` when muted. The playback switch is on for unmuted elements.
    pub fn get_mute(&self) -> Result<bool, VolumeError> {
        let selector = &self.selector;
        self.with_session(|session| {
            session.refresh()?;
            session
                .playback_switch(selector)
                .map(|on| !on)
                .map_err(Self::element_required)
        })
    }

    pub fn set_mute(&self, muted: bool) -> Result<(), VolumeError> {
        let selector = &self.selector;
        self.with_session(|session| {
            trace!(element = %selector, muted, "Setting mute");
            session
                .set_playback_switch_all(selector, !muted)
                .map_err(Self::element_required)
        })
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&mut B::Session) -> Result<R, VolumeError>,
    ) -> Result<R, VolumeError> {
        let mut guard = self.lock();
        let session = match guard.take() {
            Some(session) => session,
            None => self.open_session()?,
        };
        f(guard.insert(session))
    }

    fn open_session(&self) -> Result<B::Session, VolumeError> {
        let session = self.backend.open()?;
        debug!(backend = self.backend.name(), element = %self.selector, "Opened mixer session");
        Ok(session)
    }

    fn checked_range(
        selector: &ElementSelector,
        (min, max): (i64, i64),
    ) -> Result<VolumeRange, VolumeError> {
        VolumeRange::new(min, max).ok_or_else(|| {
            VolumeError::Device(format!(
                "element {selector} has a degenerate volume range [{min}, {max}]"
            ))
        })
    }

    /// Setters and mute need the element; its absence is a device failure.
    fn element_required(err: VolumeError) -> VolumeError {
        match err {
            VolumeError::ElementNotFound(name) => {
                VolumeError::Device(format!("no mixer element {name}"))
            }
            other => other,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<B::Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct FakeElement {
        pub min: i64,
        pub max: i64,
        pub raw: i64,
        pub switch: Option<bool>,
        pub fail_writes: bool,
    }

    impl FakeElement {
        pub fn new(min: i64, max: i64, raw: i64) -> Self {
            Self {
                min,
                max,
                raw,
                switch: Some(true),
                fail_writes: false,
            }
        }
    }

    /// Shared in-memory mixer state; `None` models a missing element.
    #[derive(Clone, Default)]
    struct FakeMixer {
        pub element: Arc<Mutex<Option<FakeElement>>>,
        pub opens: Arc<AtomicUsize>,
        pub unreachable: bool,
    }

    impl FakeMixer {
        pub fn with_element(element: FakeElement) -> Self {
            Self {
                element: Arc::new(Mutex::new(Some(element))),
                ..Default::default()
            }
        }

        pub fn raw(&self) -> i64 {
            self.element.lock().unwrap().as_ref().unwrap().raw
        }
    }

    struct FakeSession(FakeMixer);

    impl FakeSession {
        fn element<R>(
            &self,
            selector: &ElementSelector,
            f: impl FnOnce(&mut FakeElement) -> Result<R, VolumeError>,
        ) -> Result<R, VolumeError> {
            let mut element = self.0.element.lock().unwrap();
            match element.as_mut() {
                Some(element) => f(element),
                None => Err(VolumeError::ElementNotFound(selector.to_string())),
            }
        }
    }

    impl MixerSession for FakeSession {
        fn playback_volume_range(
            &self,
            selector: &ElementSelector,
        ) -> Result<(i64, i64), VolumeError> {
            self.element(selector, |e| Ok((e.min, e.max)))
        }

        fn playback_volume(&self, selector: &ElementSelector) -> Result<i64, VolumeError> {
            self.element(selector, |e| Ok(e.raw))
        }

        fn set_playback_volume_all(
            &mut self,
            selector: &ElementSelector,
            raw: i64,
        ) -> Result<(), VolumeError> {
            self.element(selector, |e| {
                if e.fail_writes {
                    return Err(VolumeError::Device("write rejected".into()));
                }
                e.raw = raw;
                Ok(())
            })
        }

        fn playback_switch(&self, selector: &ElementSelector) -> Result<bool, VolumeError> {
            self.element(selector, |e| {
                e.switch
                    .ok_or_else(|| VolumeError::Device("no playback switch".into()))
            })
        }

        fn set_playback_switch_all(
            &mut self,
            selector: &ElementSelector,
            on: bool,
        ) -> Result<(), VolumeError> {
            self.element(selector, |e| match e.switch {
                Some(_) => {
                    e.switch = Some(on);
                    Ok(())
                }
                None => Err(VolumeError::Device("no playback switch".into())),
            })
        }
    }

    impl VolumeBackend for FakeMixer {
        type Session = FakeSession;

        fn name(&self) -> &str {
            "fake"
        }

        fn open(&self) -> Result<FakeSession, VolumeError> {
            if self.unreachable {
                return Err(VolumeError::Connection("cannot open device".into()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession(self.clone()))
        }
    }

    fn controller(mixer: &FakeMixer) -> VolumeController<FakeMixer> {
        VolumeController::new(mixer.clone(), ElementSelector::default())
    }

    #[test]
    fn test_scaling_round_trip_within_one() {
        for (min, max) in [(0, 100), (0, 65536), (-10239, 400), (3, 87), (-6000, -5800)] {
            let range = VolumeRange::new(min, max).unwrap();
            let mut previous = 0;
            for percent in 0..=100 {
                let raw = range.to_raw(percent);
                let back = range.to_percent(raw) as i64;
                if max - min >= 100 {
                    assert!((back - percent).abs() <= 1, "{min}..{max}: {percent} -> {back}");
                }
                assert!(back >= previous, "scaling must be monotonic");
                previous = back;
            }
        }
    }

    #[test]
    fn test_degenerate_range_rejected() {
        assert!(VolumeRange::new(5, 5).is_none());
        assert!(VolumeRange::new(10, 0).is_none());
        let range = VolumeRange::new(0, 200).unwrap();
        assert_eq!(range.to_percent(-50), 0);
        assert_eq!(range.to_percent(500), 100);
    }

    #[test]
    fn test_get_volume_scales_raw_level() {
        let mixer = FakeMixer::with_element(FakeElement::new(0, 200, 100));
        assert_eq!(controller(&mixer).get_volume().unwrap(), 50);
    }

    #[test]
    fn test_set_volume_clamps() {
        let mixer = FakeMixer::with_element(FakeElement::new(-1000, 1000, 0));
        let volume = controller(&mixer);

        volume.set_volume(-5).unwrap();
        let low = mixer.raw();
        volume.set_volume(0).unwrap();
        assert_eq!(mixer.raw(), low);
        assert_eq!(low, -1000);

        volume.set_volume(150).unwrap();
        let high = mixer.raw();
        volume.set_volume(100).unwrap();
        assert_eq!(mixer.raw(), high);
        assert_eq!(high, 1000);
    }

    #[test]
    fn test_mute_round_trip() {
        let mixer = FakeMixer::with_element(FakeElement::new(0, 100, 40));
        let volume = controller(&mixer);

        volume.set_mute(true).unwrap();
        assert!(volume.get_mute().unwrap());
        assert_eq!(mixer.element.lock().unwrap().as_ref().unwrap().switch, Some(false));

        volume.set_mute(false).unwrap();
        assert!(!volume.get_mute().unwrap());
    }

    #[test]
    fn test_degenerate_range_is_device_error() {
        let mixer = FakeMixer::with_element(FakeElement::new(7, 7, 7));
        let volume = controller(&mixer);
        assert!(matches!(volume.get_volume(), Err(VolumeError::Device(_))));
        assert!(matches!(volume.set_volume(30), Err(VolumeError::Device(_))));
    }

    #[test]
    fn test_missing_element() {
        let mixer = FakeMixer::default();
        let volume = controller(&mixer);
        assert_eq!(volume.get_volume().unwrap(), 0);
        assert!(matches!(volume.set_volume(30), Err(VolumeError::Device(_))));
        assert!(matches!(volume.get_mute(), Err(VolumeError::Device(_))));
        assert!(matches!(volume.set_mute(true), Err(VolumeError::Device(_))));
    }

    #[test]
    fn test_missing_switch_is_device_error() {
        let mut element = FakeElement::new(0, 100, 10);
        element.switch = None;
        let volume = controller(&FakeMixer::with_element(element));
        assert!(matches!(volume.get_mute(), Err(VolumeError::Device(_))));
        assert!(matches!(volume.set_mute(false), Err(VolumeError::Device(_))));
    }

    #[test]
    fn test_write_failure_is_device_error() {
        let mut element = FakeElement::new(0, 100, 10);
        element.fail_writes = true;
        let volume = controller(&FakeMixer::with_element(element));
        assert!(matches!(volume.set_volume(30), Err(VolumeError::Device(_))));
    }

    #[test]
    fn test_init_is_idempotent_and_lazy() {
        let mixer = FakeMixer::with_element(FakeElement::new(0, 100, 10));
        let volume = controller(&mixer);
        assert!(!volume.is_initialized());

        volume.get_volume().unwrap();
        volume.init().unwrap();
        volume.init().unwrap();
        assert!(volume.is_initialized());
        assert_eq!(mixer.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreachable_device_is_connection_error() {
        let mixer = FakeMixer {
            unreachable: true,
            ..Default::default()
        };
        let volume = controller(&mixer);
        assert!(matches!(volume.init(), Err(VolumeError::Connection(_))));
        assert!(matches!(volume.get_volume(), Err(VolumeError::Connection(_))));
        assert!(!volume.is_initialized());
    }

    #[test]
    fn test_cleanup_is_safe_twice_and_before_init() {
        let mixer = FakeMixer::with_element(FakeElement::new(0, 100, 10));
        let volume = controller(&mixer);
        volume.cleanup();
        volume.cleanup();

        volume.init().unwrap();
        volume.cleanup();
        volume.cleanup();
        assert!(!volume.is_initialized());

        volume.init().unwrap();
        assert_eq!(mixer.opens.load(Ordering::SeqCst), 2);
    }
}
