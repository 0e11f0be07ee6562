//! Collaborators the controller drives.  The daemon plugs in mpv, the panel
//! broadcaster and the network probe; tests plug in recorders.

use radio_proto::protocol::View;

/// Identifies one playback started by the controller.  Titles reported by
/// the transport carry the session they belong to.
pub type SessionId = u64;

/// Audio output.  Calls must not block: implementations queue the work and
/// execute it in call order, so a `stop` completes before the next `play`.
pub trait Transport {
    fn play(&mut self, session: SessionId, url: &str);
    fn stop(&mut self);
    /// Output volume in percent, already scaled by the configured ceiling.
    fn set_volume(&mut self, percent: u8);
}

pub trait DisplaySink {
    fn render(&mut self, view: &View);
}

pub trait Connectivity {
    fn is_online(&self) -> bool;
}
