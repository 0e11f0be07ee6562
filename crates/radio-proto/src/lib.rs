//! Shared types for the knob radio: wire protocol, configuration, station
//! catalog loading, panel text layout and persisted state.

pub mod catalog;
pub mod config;
pub mod display;
pub mod platform;
pub mod protocol;
pub mod state;
