//! Projection from controller state to the single view the panel shows.

use radio_proto::protocol::{Station, View};

/// Transient display modes.  `Normal` is the resting state and is never timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Normal,
    Volume,
    Pick,
    Title,
}

/// Everything the projection looks at.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub stations: &'a [Station],
    pub playing: usize,
    pub picking: usize,
    pub volume: u8,
    pub muted: bool,
    pub mode: DisplayMode,
    pub online: bool,
    pub title: &'a str,
}

/// Precedence: empty catalog, offline, muted, then the active mode.
pub fn project(s: &Snapshot<'_>) -> View {
    if s.stations.is_empty() {
        return View::EmptyCatalog;
    }
    if !s.online {
        return View::Offline;
    }
    if s.muted {
        return View::Muted;
    }

    match s.mode {
        DisplayMode::Volume => View::Volume { volume: s.volume },
        DisplayMode::Pick => View::Pick {
            index: s.picking,
            name: station_name(s.stations, s.picking),
        },
        DisplayMode::Title => View::Title {
            title: s.title.to_string(),
        },
        DisplayMode::Normal => View::Normal {
            name: station_name(s.stations, s.playing),
            volume: s.volume,
            title: s.title.to_string(),
        },
    }
}

fn station_name(stations: &[Station], index: usize) -> String {
    stations
        .get(index)
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        vec![
            Station::new("A", "http://a"),
            Station::new("B", "http://b"),
            Station::new("C", "http://c"),
        ]
    }

    fn snapshot(stations: &[Station]) -> Snapshot<'_> {
        Snapshot {
            stations,
            playing: 0,
            picking: 2,
            volume: 50,
            muted: false,
            mode: DisplayMode::Normal,
            online: true,
            title: "no info",
        }
    }

    #[test]
    fn test_mode_views() {
        let stations = stations();
        let mut s = snapshot(&stations);
        assert_eq!(
            project(&s),
            View::Normal {
                name: "A".into(),
                volume: 50,
                title: "no info".into()
            }
        );
        s.mode = DisplayMode::Volume;
        assert_eq!(project(&s), View::Volume { volume: 50 });
        s.mode = DisplayMode::Pick;
        assert_eq!(
            project(&s),
            View::Pick {
                index: 2,
                name: "C".into()
            }
        );
        s.mode = DisplayMode::Title;
        assert_eq!(
            project(&s),
            View::Title {
                title: "no info".into()
            }
        );
    }

    #[test]
    fn test_precedence() {
        let stations = stations();
        let mut s = snapshot(&stations);
        s.mode = DisplayMode::Pick;
        s.muted = true;
        assert_eq!(project(&s), View::Muted);
        s.online = false;
        assert_eq!(project(&s), View::Offline);

        let empty: Vec<Station> = Vec::new();
        let mut e = snapshot(&empty);
        e.online = false;
        e.muted = true;
        assert_eq!(project(&e), View::EmptyCatalog);
    }

    #[test]
    fn test_pick_view_returns_after_offline() {
        let stations = stations();
        let mut s = snapshot(&stations);
        s.mode = DisplayMode::Pick;
        s.online = false;
        assert_eq!(project(&s), View::Offline);
        s.online = true;
        assert!(matches!(project(&s), View::Pick { index: 2, .. }));
    }
}
