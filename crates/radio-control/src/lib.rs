//! Knob radio control core: turns knob, connectivity and metadata events into
//! transport commands and panel views.  Pure state; the daemon supplies time,
//! I/O and the event queue.

pub mod controller;
pub mod event;
pub mod ports;
pub mod timer;
pub mod view;

pub use controller::{ControlError, Controller, Settings, NO_INFO};
pub use event::ControlEvent;
pub use ports::{Connectivity, DisplaySink, SessionId, Transport};
pub use view::DisplayMode;
