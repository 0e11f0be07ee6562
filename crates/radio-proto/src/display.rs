//! Text layout for the panel.
//!
//! The panel is a fixed-width character grid (a 128 px OLED with a 6 px font
//! gives 21 columns).  Views are laid out as whole lines; long station names
//! and titles are word-wrapped, and words wider than the panel are split.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::protocol::View;

pub const DEFAULT_COLUMNS: usize = 21;

/// Lay a view out as the lines the panel should draw, top to bottom.
pub fn layout(view: &View, columns: usize) -> Vec<String> {
    match view {
        View::EmptyCatalog => vec!["NO STATIONS".to_string()],
        View::Offline => vec!["NO INTERNET".to_string()],
        View::Muted => vec!["MUTE".to_string()],
        View::Volume { volume } => vec![format!("Volume: {}%", volume)],
        View::Pick { index, name } => {
            let mut lines = vec![index.to_string()];
            lines.extend(wrap(name, columns));
            lines
        }
        View::Title { title } => wrap(title, columns),
        View::Normal {
            name,
            volume,
            title,
        } => {
            let mut lines = wrap(name, columns);
            lines.push(format!("Vol {}%", volume));
            lines.extend(wrap(title, columns));
            lines
        }
    }
}

/// Greedy word wrap measured in terminal columns.  `columns == 0` disables
/// wrapping.
pub fn wrap(text: &str, columns: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if columns == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = word.width();

        if word_width > columns {
            // Flush what we have, then hard-split the oversized word.
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            for ch in word.chars() {
                let w = ch.width().unwrap_or(0);
                if current_width + w > columns {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                current.push(ch);
                current_width += w;
            }
            continue;
        }

        let needed = if current.is_empty() {
            word_width
        } else {
            current_width + 1 + word_width
        };
        if needed > columns {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_width = needed;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_views() {
        assert_eq!(layout(&View::Offline, 21), vec!["NO INTERNET"]);
        assert_eq!(layout(&View::Muted, 21), vec!["MUTE"]);
        assert_eq!(layout(&View::EmptyCatalog, 21), vec!["NO STATIONS"]);
        assert_eq!(
            layout(&View::Volume { volume: 52 }, 21),
            vec!["Volume: 52%"]
        );
    }

    #[test]
    fn test_pick_shows_index_then_name() {
        let view = View::Pick {
            index: 2,
            name: "Radio Paradise".to_string(),
        };
        assert_eq!(layout(&view, 21), vec!["2", "Radio Paradise"]);
    }

    #[test]
    fn test_normal_wraps_name_and_title() {
        let view = View::Normal {
            name: "FIP".to_string(),
            volume: 50,
            title: "Miles Davis - So What (Live at Newport)".to_string(),
        };
        assert_eq!(
            layout(&view, 21),
            vec!["FIP", "Vol 50%", "Miles Davis - So What", "(Live at Newport)"]
        );
    }

    #[test]
    fn test_wrap_splits_oversized_words() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("ab abcdefgh c", 4), vec!["ab", "abcd", "efgh", "c"]);
    }

    #[test]
    fn test_wrap_measures_wide_chars() {
        // Each CJK character is two columns wide.
        assert_eq!(wrap("日本語ラジオ", 4), vec!["日本", "語ラ", "ジオ"]);
    }

    #[test]
    fn test_wrap_edge_cases() {
        assert!(wrap("   ", 10).is_empty());
        assert_eq!(wrap("one two", 0), vec!["one two"]);
    }
}
