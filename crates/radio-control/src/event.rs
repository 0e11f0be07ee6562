use radio_proto::protocol::{Command, Knob, KnobAction, Station};

use crate::ports::SessionId;

/// All inputs into the controller.  The daemon serializes these through one
/// queue; each is handled to completion before the next.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Knob { knob: Knob, action: KnobAction },
    Online,
    Offline,
    /// Now-playing title reported by the transport.
    StreamTitle { session: SessionId, title: String },
    /// Re-announce the current catalog.
    Refresh,
    /// Replace the catalog with a freshly loaded one.
    Catalog(Vec<Station>),
}

impl ControlEvent {
    /// Map a client command onto a controller input.  Commands served by the
    /// daemon itself (status queries, catalog reloads) map to `None`.
    pub fn from_command(cmd: &Command) -> Option<Self> {
        match cmd {
            Command::Knob { knob, action } => Some(ControlEvent::Knob {
                knob: *knob,
                action: *action,
            }),
            Command::Refresh => Some(ControlEvent::Refresh),
            Command::ReloadCatalog | Command::GetStatus => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command() {
        let cmd = Command::Knob {
            knob: Knob::Volume,
            action: KnobAction::Rotate { delta: 3 },
        };
        assert_eq!(
            ControlEvent::from_command(&cmd),
            Some(ControlEvent::Knob {
                knob: Knob::Volume,
                action: KnobAction::Rotate { delta: 3 }
            })
        );
        assert_eq!(
            ControlEvent::from_command(&Command::Refresh),
            Some(ControlEvent::Refresh)
        );
        assert_eq!(ControlEvent::from_command(&Command::GetStatus), None);
        assert_eq!(ControlEvent::from_command(&Command::ReloadCatalog), None);
    }
}
