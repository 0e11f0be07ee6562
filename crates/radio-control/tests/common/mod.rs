//! Recording collaborators for driving the controller without I/O.

#![allow(dead_code)]

use radio_control::{Connectivity, Controller, DisplaySink, SessionId, Settings, Transport};
use radio_proto::protocol::{Station, View};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Play { session: SessionId, url: String },
    Stop,
    SetVolume(u8),
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub calls: Vec<Call>,
}

impl RecordingTransport {
    pub fn last_volume(&self) -> Option<u8> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::SetVolume(v) => Some(*v),
            _ => None,
        })
    }

    pub fn last_url(&self) -> Option<&str> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Play { url, .. } => Some(url.as_str()),
            _ => None,
        })
    }

    pub fn plays(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Play { .. }))
            .count()
    }
}

impl Transport for RecordingTransport {
    fn play(&mut self, session: SessionId, url: &str) {
        self.calls.push(Call::Play {
            session,
            url: url.to_string(),
        });
    }

    fn stop(&mut self) {
        self.calls.push(Call::Stop);
    }

    fn set_volume(&mut self, percent: u8) {
        self.calls.push(Call::SetVolume(percent));
    }
}

#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub views: Vec<View>,
}

impl RecordingDisplay {
    pub fn last(&self) -> Option<&View> {
        self.views.last()
    }
}

impl DisplaySink for RecordingDisplay {
    fn render(&mut self, view: &View) {
        self.views.push(view.clone());
    }
}

#[derive(Debug)]
pub struct Link {
    pub online: bool,
}

impl Connectivity for Link {
    fn is_online(&self) -> bool {
        self.online
    }
}

pub type TestController = Controller<RecordingTransport, RecordingDisplay, Link>;

pub fn stations(names: &[&str]) -> Vec<Station> {
    names
        .iter()
        .map(|n| Station::new(*n, format!("http://{}.example/stream", n.to_lowercase())))
        .collect()
}

pub fn controller(names: &[&str], volume: u8) -> TestController {
    Controller::new(
        Settings::default(),
        volume,
        stations(names),
        RecordingTransport::default(),
        RecordingDisplay::default(),
        Link { online: true },
    )
}
