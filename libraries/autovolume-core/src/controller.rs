//! Session table and control surface
//!
//! The controller keeps every attached stream in a generational arena keyed by
//! the host's [`SourceId`]. The host owns the mapping from its own media
//! objects to handles and calls [`StreamController::tick`] from whatever
//! scheduling primitive it has (render loop, timer, audio callback).

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::calibration::BaselineCalibrator;
use crate::error::{EngineError, Result};
use crate::session::{SessionHandle, SourceId, StreamSession, TickReport};
use crate::settings::{sanitize_sensitivity, EngineSettings, SettingsStore};
use crate::sink::GainSink;

/// Which sessions a command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A single session
    Session(SessionHandle),
    /// Every attached session
    All,
}

impl From<SessionHandle> for Target {
    fn from(handle: SessionHandle) -> Self {
        Self::Session(handle)
    }
}

/// One stream's input for [`StreamController::tick_all`]
#[derive(Debug, Clone, Copy)]
pub struct StreamInput<'a> {
    /// Analysis block (mono or channel mix)
    pub samples: &'a [f32],
    /// Whether the source is currently playing
    pub is_playing: bool,
}

struct Slot<S> {
    generation: u32,
    session: Option<StreamSession<S>>,
}

/// Adaptive gain controller for any number of concurrent streams
///
/// # Example
///
/// ```
/// use autovolume_core::{RampedGain, StreamController, Target};
/// use std::time::{Duration, Instant};
///
/// let mut controller = StreamController::new();
/// let handle = controller.attach("video-1", RampedGain::new(48000, 2));
///
/// let start = Instant::now();
/// let block = vec![0.1_f32; 2048];
/// for n in 0..120 {
///     let now = start + Duration::from_millis(16 * n);
///     controller.tick(handle, &block, now, true).unwrap();
/// }
/// assert!(controller.session(handle).unwrap().is_calibrated());
///
/// controller.set_sensitivity(1.5);
/// controller.reset(Target::All).unwrap();
/// ```
pub struct StreamController<S: GainSink = Box<dyn GainSink>> {
    slots: Vec<Slot<S>>,
    free: Vec<u32>,
    by_source: HashMap<SourceId, SessionHandle>,
    settings: EngineSettings,
    store: Option<Box<dyn SettingsStore>>,
    /// Template cloned into every new session
    calibrator: BaselineCalibrator,
}

impl<S: GainSink> StreamController<S> {
    /// Controller with default settings and no persistence
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    /// Controller with explicit settings and no persistence
    pub fn with_settings(settings: EngineSettings) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_source: HashMap::new(),
            settings: EngineSettings::new(settings.enabled, settings.sensitivity),
            store: None,
            calibrator: BaselineCalibrator::new(),
        }
    }

    /// Controller whose settings are loaded from, and saved to, `store`
    ///
    /// A store that fails to load yields the defaults.
    pub fn with_store(store: impl SettingsStore + 'static) -> Self {
        let settings = store.load().unwrap_or_else(|e| {
            warn!("Failed to load settings, using defaults: {}", e);
            EngineSettings::default()
        });
        let mut controller = Self::with_settings(settings);
        controller.store = Some(Box::new(store));
        controller
    }

    /// Size calibration for a host that does not tick at 60 Hz
    ///
    /// Applies to sessions attached afterwards. `warmup_ticks` playing ticks
    /// must pass before the warm-up baseline is taken; an explicit run
    /// averages `calibration_ticks` blocks.
    pub fn with_calibration_windows(
        mut self,
        warmup_ticks: u32,
        calibration_ticks: usize,
    ) -> Self {
        self.calibrator = BaselineCalibrator::with_windows(warmup_ticks, calibration_ticks);
        self
    }

    /// Current settings
    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Number of attached sessions
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Whether no session is attached
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Handles of all attached sessions
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.session.is_some())
            .map(|(index, slot)| SessionHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Handle of the session attached for `source`
    pub fn handle_for(&self, source: &SourceId) -> Option<SessionHandle> {
        self.by_source.get(source).copied()
    }

    /// Session behind a handle
    pub fn session(&self, handle: SessionHandle) -> Option<&StreamSession<S>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    /// Mutable session behind a handle
    pub fn session_mut(&mut self, handle: SessionHandle) -> Option<&mut StreamSession<S>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_mut())
    }

    /// Sink of a session (e.g. to render audio through it)
    pub fn sink_mut(&mut self, handle: SessionHandle) -> Option<&mut S> {
        self.session_mut(handle).map(StreamSession::sink_mut)
    }

    /// Start levelling a source
    ///
    /// Attaching a source twice returns the existing handle; the extra sink is
    /// dropped.
    pub fn attach(&mut self, source: impl Into<SourceId>, sink: S) -> SessionHandle {
        let source = source.into();
        if let Some(handle) = self.by_source.get(&source) {
            debug!(source = %source, "Source already attached");
            return *handle;
        }

        let session =
            StreamSession::new(source.clone(), sink).with_calibrator(self.calibrator.clone());
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.session = Some(session);
                SessionHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    session: Some(session),
                });
                SessionHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        info!(source = %source, handle = %handle, "Attached stream");
        self.by_source.insert(source, handle);
        handle
    }

    /// Stop levelling a source and hand back its session
    ///
    /// The sink is not driven back to unity; the host is expected to be
    /// tearing that audio path down.
    pub fn detach(&mut self, handle: SessionHandle) -> Result<StreamSession<S>> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(EngineError::UnknownSession(handle))?;
        let session = slot
            .session
            .take()
            .ok_or(EngineError::UnknownSession(handle))?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.by_source.remove(session.source());

        info!(source = %session.source(), handle = %handle, "Detached stream");
        Ok(session)
    }

    /// Restore unity gain on a session and stop ticking it
    pub fn deactivate(&mut self, handle: SessionHandle) -> Result<()> {
        let session = self
            .session_mut(handle)
            .ok_or(EngineError::UnknownSession(handle))?;
        session.deactivate();
        Ok(())
    }

    /// Run one update for a session
    ///
    /// `Ok(None)` when the session has been deactivated.
    pub fn tick(
        &mut self,
        handle: SessionHandle,
        samples: &[f32],
        now: Instant,
        is_playing: bool,
    ) -> Result<Option<TickReport>> {
        let settings = self.settings;
        let session = self
            .session_mut(handle)
            .ok_or(EngineError::UnknownSession(handle))?;
        Ok(session.tick(samples, now, is_playing, settings))
    }

    /// Tick every active session, pulling its input from `feed`
    ///
    /// Sessions for which `feed` returns `None` are skipped this round.
    pub fn tick_all<'a, F>(&mut self, now: Instant, mut feed: F) -> Vec<(SessionHandle, TickReport)>
    where
        F: FnMut(SessionHandle, &SourceId) -> Option<StreamInput<'a>>,
    {
        let settings = self.settings;
        let mut reports = Vec::with_capacity(self.by_source.len());

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let handle = SessionHandle {
                index: index as u32,
                generation: slot.generation,
            };
            let Some(session) = slot.session.as_mut() else {
                continue;
            };
            let Some(input) = feed(handle, session.source()) else {
                continue;
            };
            if let Some(report) = session.tick(input.samples, now, input.is_playing, settings) {
                reports.push((handle, report));
            }
        }

        reports
    }

    /// Turn levelling on or off for every session
    ///
    /// While off, every session's gain glides back to unity on its next ticks.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.settings.enabled != enabled {
            info!(enabled, "Levelling toggled");
        }
        self.settings.enabled = enabled;
        self.persist();
    }

    /// Set the attenuation threshold multiplier
    ///
    /// Non-finite or non-positive values fall back to 1.0.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        let sanitized = sanitize_sensitivity(sensitivity);
        if sanitized != sensitivity {
            debug!(requested = sensitivity, "Invalid sensitivity, using {}", sanitized);
        }
        self.settings.sensitivity = sanitized;
        info!(sensitivity = sanitized, "Sensitivity changed");
        self.persist();
    }

    /// Start explicit calibration; returns how many runs were started
    ///
    /// Sessions with a run already in flight are left alone.
    pub fn calibrate(&mut self, target: impl Into<Target>) -> Result<usize> {
        match target.into() {
            Target::Session(handle) => {
                let session = self
                    .session_mut(handle)
                    .ok_or(EngineError::UnknownSession(handle))?;
                Ok(usize::from(session.is_active() && session.begin_calibration()))
            }
            Target::All => Ok(self
                .sessions_mut()
                .filter(|session| session.is_active())
                .map(|session| usize::from(session.begin_calibration()))
                .sum()),
        }
    }

    /// Forget calibration, return to unity gain, and restore default settings
    pub fn reset(&mut self, target: impl Into<Target>) -> Result<()> {
        match target.into() {
            Target::Session(handle) => self
                .session_mut(handle)
                .ok_or(EngineError::UnknownSession(handle))?
                .reset(),
            Target::All => self.sessions_mut().for_each(StreamSession::reset),
        }

        self.settings = EngineSettings::default();
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.clear() {
                warn!("Failed to clear persisted settings: {}", e);
            }
        }
        info!("Levelling reset");
        Ok(())
    }

    fn sessions_mut(&mut self) -> impl Iterator<Item = &mut StreamSession<S>> {
        self.slots.iter_mut().filter_map(|slot| slot.session.as_mut())
    }

    fn persist(&mut self) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save(&self.settings) {
                warn!("Failed to persist settings: {}", e);
            }
        }
    }
}

impl<S: GainSink> Default for StreamController<S> {
    fn default() -> Self {
        Self::new()
    }
}
