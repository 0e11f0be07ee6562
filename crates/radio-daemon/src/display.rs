use radio_control::DisplaySink;
use radio_proto::display::layout;
use radio_proto::protocol::View;
use tokio::sync::broadcast;
use tracing::debug;

use crate::BroadcastMessage;

/// Panel output: lays each view out for the configured width and hands it to
/// every connected panel driver through the broadcast channel.
pub struct PanelDisplay {
    columns: usize,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl PanelDisplay {
    pub fn new(columns: usize, broadcast_tx: broadcast::Sender<BroadcastMessage>) -> Self {
        Self {
            columns,
            broadcast_tx,
        }
    }
}

impl DisplaySink for PanelDisplay {
    fn render(&mut self, view: &View) {
        let lines = layout(view, self.columns);
        debug!("panel [{}]: {}", view.label(), lines.join(" / "));
        // No receivers just means no panel is attached yet.
        let _ = self.broadcast_tx.send(BroadcastMessage::View {
            view: view.clone(),
            lines,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_broadcasts_laid_out_lines() {
        let (tx, mut rx) = broadcast::channel(4);
        let mut panel = PanelDisplay::new(10, tx);
        let view = View::Normal {
            name: "Radio Nova Paris".into(),
            volume: 40,
            title: "no info".into(),
        };
        panel.render(&view);

        match rx.try_recv() {
            Ok(BroadcastMessage::View { view: sent, lines }) => {
                assert_eq!(sent, view);
                assert_eq!(lines, vec!["Radio Nova", "Paris", "Vol 40%", "no info"]);
            }
            other => panic!("unexpected broadcast: {:?}", other),
        }
    }

    #[test]
    fn test_render_without_panels_is_fine() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let mut panel = PanelDisplay::new(21, tx);
        panel.render(&View::Muted);
    }
}
