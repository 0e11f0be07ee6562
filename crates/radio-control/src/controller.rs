//! The knob radio state machine.
//!
//! `Controller` owns playback, browsing, mute and volume state plus two
//! single-slot timers: the display-mode timer (Volume / Pick / Title views
//! revert to Normal when it expires) and the channel-knob long-press timer.
//! Every method is one atomic transition.  Time is passed in explicitly and
//! the owner calls [`Controller::on_timer`] once [`Controller::next_deadline`]
//! has passed.

use std::time::{Duration, Instant};

use radio_proto::config::ControllerConfig;
use radio_proto::protocol::{Knob, KnobAction, PlayerStatus, Station, View};
use tracing::{debug, info, warn};

use crate::event::ControlEvent;
use crate::ports::{Connectivity, DisplaySink, SessionId, Transport};
use crate::timer::TimerSlot;
use crate::view::{project, DisplayMode, Snapshot};

/// Title shown until the stream reports one.
pub const NO_INFO: &str = "no info";

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_volume: u8,
    pub volume_step: u8,
    pub display_timeout: Duration,
    pub long_press: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for Settings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            max_volume: config.max_volume.min(100),
            volume_step: config.volume_step,
            display_timeout: Duration::from_millis(config.display_timeout_ms),
            long_press: Duration::from_millis(config.long_press_ms),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("station {index} out of range (catalog has {len})")]
    StationOutOfRange { index: usize, len: usize },
}

/// Kind tag for the long-press slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Refresh,
}

pub struct Controller<T, D, C> {
    settings: Settings,
    stations: Vec<Station>,
    playing: usize,
    picking: usize,
    volume: u8,
    muted: bool,
    backup_volume: Option<u8>,
    title: String,
    session: SessionId,
    display_timer: TimerSlot<DisplayMode>,
    hold_timer: TimerSlot<Hold>,
    transport: T,
    display: D,
    connectivity: C,
}

impl<T, D, C> Controller<T, D, C>
where
    T: Transport,
    D: DisplaySink,
    C: Connectivity,
{
    /// Build the controller and announce the initial catalog: playback of the
    /// first station starts immediately, or the empty view is shown.
    pub fn new(
        settings: Settings,
        volume: u8,
        stations: Vec<Station>,
        transport: T,
        display: D,
        connectivity: C,
    ) -> Self {
        let mut controller = Self {
            settings,
            stations: Vec::new(),
            playing: 0,
            picking: 0,
            volume: volume.min(100),
            muted: false,
            backup_volume: None,
            title: NO_INFO.to_string(),
            session: 0,
            display_timer: TimerSlot::new(),
            hold_timer: TimerSlot::new(),
            transport,
            display,
            connectivity,
        };
        controller.refresh(stations);
        controller
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    pub fn handle(&mut self, event: ControlEvent, now: Instant) {
        match event {
            ControlEvent::Knob { knob, action } => match (knob, action) {
                (Knob::Volume, KnobAction::Rotate { delta }) => self.on_volume_rotate(delta, now),
                (Knob::Volume, KnobAction::Pressed) => self.on_volume_knob_press(),
                (Knob::Volume, KnobAction::Released) => self.on_volume_knob_release(),
                (Knob::Channel, KnobAction::Rotate { delta }) => {
                    self.on_channel_rotate(delta, now)
                }
                (Knob::Channel, KnobAction::Pressed) => self.on_channel_knob_press(now),
                (Knob::Channel, KnobAction::Released) => self.on_channel_knob_release(now),
            },
            ControlEvent::Online => self.on_connectivity_online(),
            ControlEvent::Offline => self.on_connectivity_offline(),
            ControlEvent::StreamTitle { session, title } => self.on_stream_title(session, title),
            ControlEvent::Refresh => {
                let stations = self.stations.clone();
                self.refresh(stations);
            }
            ControlEvent::Catalog(stations) => self.refresh(stations),
        }
    }

    /// Earliest pending deadline across both timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.display_timer.deadline(), self.hold_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every timer whose deadline is at or before `now`, earliest first.
    pub fn on_timer(&mut self, now: Instant) {
        loop {
            let display_due = self.display_timer.deadline().filter(|d| *d <= now);
            let hold_due = self.hold_timer.deadline().filter(|d| *d <= now);
            match (display_due, hold_due) {
                (Some(d), Some(h)) if h < d => self.fire_hold(now),
                (Some(_), _) => self.fire_display(now),
                (None, Some(_)) => self.fire_hold(now),
                (None, None) => break,
            }
        }
    }

    fn fire_display(&mut self, now: Instant) {
        let Some(mode) = self.display_timer.take_expired(now) else {
            return;
        };
        debug!("display timer expired: {:?} → Normal", mode);
        if mode == DisplayMode::Pick {
            self.picking = self.playing;
        }
        self.render();
    }

    fn fire_hold(&mut self, now: Instant) {
        if self.hold_timer.take_expired(now).is_some() {
            info!("channel knob held, refreshing station list");
            let stations = self.stations.clone();
            self.refresh(stations);
        }
    }

    // ── knob transitions ──────────────────────────────────────────────────────

    pub fn on_volume_rotate(&mut self, delta: i32, now: Instant) {
        if self.muted || self.stations.is_empty() {
            debug!("volume rotate ignored (muted={})", self.muted);
            return;
        }
        let step = i64::from(self.settings.volume_step);
        let next = (i64::from(self.volume) + i64::from(delta) * step).clamp(0, 100);
        self.volume = next as u8;
        let output = self.scaled(self.volume);
        self.transport.set_volume(output);
        self.arm_display(DisplayMode::Volume, now);
        self.render();
    }

    /// Mute toggles on release; the press itself does nothing.
    pub fn on_volume_knob_press(&mut self) {}

    pub fn on_volume_knob_release(&mut self) {
        if self.muted {
            self.muted = false;
            if let Some(volume) = self.backup_volume.take() {
                self.volume = volume;
            }
            info!("unmuted, volume {}", self.volume);
            let output = self.scaled(self.volume);
            self.transport.set_volume(output);
        } else {
            self.muted = true;
            self.display_timer.cancel();
            self.backup_volume = Some(self.volume);
            info!("muted at volume {}", self.volume);
            self.transport.set_volume(0);
        }
        self.render();
    }

    pub fn on_channel_rotate(&mut self, delta: i32, now: Instant) {
        if self.muted || self.stations.is_empty() {
            debug!("channel rotate ignored (muted={})", self.muted);
            return;
        }
        let len = self.stations.len() as i64;
        let step = i64::from(delta.signum());
        self.picking = ((self.picking as i64 + step + len) % len) as usize;
        self.arm_display(DisplayMode::Pick, now);
        self.render();
    }

    pub fn on_channel_knob_press(&mut self, now: Instant) {
        if self.muted {
            return;
        }
        self.hold_timer
            .arm(Hold::Refresh, now + self.settings.long_press);
    }

    pub fn on_channel_knob_release(&mut self, now: Instant) {
        // Nothing pending means the long press already fired (or the press was
        // ignored); either way the release has no short-press meaning.
        if self.hold_timer.cancel().is_none() {
            return;
        }
        if self.muted || self.stations.is_empty() {
            return;
        }
        if self.picking == self.playing {
            self.arm_display(DisplayMode::Title, now);
            self.render();
        } else if let Err(e) = self.play(self.picking) {
            warn!("short press: {}", e);
        }
    }

    // ── connectivity / metadata ───────────────────────────────────────────────

    pub fn on_connectivity_online(&mut self) {
        info!("connectivity restored, refreshing station list");
        let stations = self.stations.clone();
        self.refresh(stations);
    }

    pub fn on_connectivity_offline(&mut self) {
        info!("connectivity lost");
        self.render();
    }

    pub fn on_stream_title(&mut self, session: SessionId, title: String) {
        if session != self.session || self.stations.is_empty() {
            debug!("stale title for session {} ignored", session);
            return;
        }
        debug!("title: {}", title);
        self.title = title;
        if matches!(self.mode(), DisplayMode::Normal | DisplayMode::Title) {
            self.render();
        }
    }

    // ── playback ──────────────────────────────────────────────────────────────

    pub fn play(&mut self, index: usize) -> Result<(), ControlError> {
        let Some(station) = self.stations.get(index) else {
            return Err(ControlError::StationOutOfRange {
                index,
                len: self.stations.len(),
            });
        };
        let url = station.url.clone();
        info!("playing station {}: {}", index, station.name);

        self.display_timer.cancel();
        self.playing = index;
        self.picking = index;
        self.transport.stop();
        self.session += 1;
        self.transport.play(self.session, &url);
        self.title = NO_INFO.to_string();
        let output = self.effective_volume();
        self.transport.set_volume(output);
        self.render();
        Ok(())
    }

    pub fn refresh(&mut self, stations: Vec<Station>) {
        info!("refresh with {} stations", stations.len());
        if self.muted {
            self.muted = false;
            if let Some(volume) = self.backup_volume.take() {
                self.volume = volume;
            }
        }
        self.transport.stop();
        self.stations = stations;
        self.picking = 0;
        self.display_timer.cancel();

        if self.stations.is_empty() {
            self.playing = 0;
            // Invalidate titles still in flight from the stopped session.
            self.session += 1;
            self.title = NO_INFO.to_string();
            self.render();
        } else if let Err(e) = self.play(0) {
            warn!("refresh: {}", e);
        }
    }

    // ── views ─────────────────────────────────────────────────────────────────

    pub fn mode(&self) -> DisplayMode {
        self.display_timer.kind().unwrap_or_default()
    }

    pub fn view(&self) -> View {
        project(&Snapshot {
            stations: &self.stations,
            playing: self.playing,
            picking: self.picking,
            volume: self.volume,
            muted: self.muted,
            mode: self.mode(),
            online: self.connectivity.is_online(),
            title: &self.title,
        })
    }

    /// Snapshot for publishing; `rev` is assigned by the publisher.
    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            rev: 0,
            stations: self.stations.clone(),
            playing_index: self.playing_index(),
            picking_index: self.picking_index(),
            volume: self.volume,
            muted: self.muted,
            title: self.title.clone(),
            online: self.connectivity.is_online(),
            view: Some(self.view()),
        }
    }

    fn render(&mut self) {
        let view = self.view();
        self.display.render(&view);
    }

    fn arm_display(&mut self, mode: DisplayMode, now: Instant) {
        if let Some(previous) = self
            .display_timer
            .arm(mode, now + self.settings.display_timeout)
        {
            debug!("display timer {:?} replaced by {:?}", previous, mode);
        }
    }

    fn scaled(&self, volume: u8) -> u8 {
        (u32::from(volume) * u32::from(self.settings.max_volume) / 100) as u8
    }

    fn effective_volume(&self) -> u8 {
        if self.muted {
            0
        } else {
            self.scaled(self.volume)
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn playing_index(&self) -> Option<usize> {
        (!self.stations.is_empty()).then_some(self.playing)
    }

    pub fn picking_index(&self) -> Option<usize> {
        (!self.stations.is_empty()).then_some(self.picking)
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn connectivity(&self) -> &C {
        &self.connectivity
    }

    pub fn connectivity_mut(&mut self) -> &mut C {
        &mut self.connectivity
    }
}
