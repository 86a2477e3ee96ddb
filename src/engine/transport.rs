// Transport state: position, volume, rate and the keyboard shortcuts driving them.

use serde::Serialize;

use crate::config::PLAYBACK_RATES;

/// Keyboard-driven transport actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    TogglePlay,
    SeekBackward,
    SeekForward,
    VolumeUp,
    VolumeDown,
    ToggleMute,
    Fullscreen,
}

impl Shortcut {
    /// Map a DOM-style key name to a shortcut.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            " " | "Space" | "k" | "K" => Some(Shortcut::TogglePlay),
            "ArrowLeft" | "j" | "J" => Some(Shortcut::SeekBackward),
            "ArrowRight" | "l" | "L" => Some(Shortcut::SeekForward),
            "ArrowUp" => Some(Shortcut::VolumeUp),
            "ArrowDown" => Some(Shortcut::VolumeDown),
            "m" | "M" => Some(Shortcut::ToggleMute),
            "f" | "F" => Some(Shortcut::Fullscreen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportState {
    pub current_time: f64,
    pub duration: f64,
    pub playing: bool,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: 0.0,
            playing: false,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
        }
    }
}

impl TransportState {
    /// Clamp a seek target to `[0, duration]`.
    pub fn clamp_seek(&self, target: f64) -> f64 {
        if !target.is_finite() {
            return self.current_time;
        }
        target.clamp(0.0, self.duration.max(0.0))
    }

    pub fn clamp_volume(volume: f64) -> f64 {
        if volume.is_nan() {
            return 0.0;
        }
        volume.clamp(0.0, 1.0)
    }

    /// Returns the matching entry of the fixed rate set, if any.
    pub fn supported_rate(rate: f64) -> Option<f64> {
        PLAYBACK_RATES
            .iter()
            .copied()
            .find(|r| (r - rate).abs() < 1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_seek() {
        let t = TransportState {
            duration: 100.0,
            current_time: 42.0,
            ..Default::default()
        };
        assert_eq!(t.clamp_seek(-10.0), 0.0);
        assert_eq!(t.clamp_seek(150.0), 100.0);
        assert_eq!(t.clamp_seek(55.5), 55.5);
        assert_eq!(t.clamp_seek(f64::NAN), 42.0);
    }

    #[test]
    fn test_volume_and_rate() {
        assert_eq!(TransportState::clamp_volume(1.3), 1.0);
        assert_eq!(TransportState::clamp_volume(-0.2), 0.0);
        assert_eq!(TransportState::supported_rate(1.25), Some(1.25));
        assert_eq!(TransportState::supported_rate(3.0), None);
    }

    #[test]
    fn test_shortcut_keys() {
        assert_eq!(Shortcut::from_key(" "), Some(Shortcut::TogglePlay));
        assert_eq!(Shortcut::from_key("ArrowRight"), Some(Shortcut::SeekForward));
        assert_eq!(Shortcut::from_key("M"), Some(Shortcut::ToggleMute));
        assert_eq!(Shortcut::from_key("q"), None);
    }
}
