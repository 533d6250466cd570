use serde::{Deserialize, Serialize};
use std::fmt;

/// An sRGB color as drawn on the overlay and status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Box color for emotions outside the palette.
pub const FALLBACK_COLOR: Rgb = Rgb::from_hex(0xFFFFFF);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprise,
    Neutral,
    Fear,
    Disgust,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Fear,
        Emotion::Disgust,
    ];

    /// Exact, case-sensitive match on the label the backend reports.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "angry" => Some(Emotion::Angry),
            "surprise" => Some(Emotion::Surprise),
            "neutral" => Some(Emotion::Neutral),
            "fear" => Some(Emotion::Fear),
            "disgust" => Some(Emotion::Disgust),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            Emotion::Happy => Rgb::from_hex(0xF1C40F),
            Emotion::Sad => Rgb::from_hex(0x3498DB),
            Emotion::Angry => Rgb::from_hex(0xE74C3C),
            Emotion::Surprise => Rgb::from_hex(0x9B59B6),
            Emotion::Neutral => Rgb::from_hex(0x2ECC71),
            Emotion::Fear => Rgb::from_hex(0xE67E22),
            Emotion::Disgust => Rgb::from_hex(0x95A5A6),
        }
    }
}

pub fn color_for_label(label: &str) -> Rgb {
    Emotion::from_label(label)
        .map(Emotion::color)
        .unwrap_or(FALLBACK_COLOR)
}

/// Two-decimal percentage, e.g. `83` -> `83.00%`.
pub fn format_confidence(value: f64) -> String {
    format!("{:.2}%", value)
}

/// `<emotion> (<confidence>%)`, used for overlay labels and the summary line.
pub fn face_label(emotion: &str, confidence: f64) -> String {
    format!("{} ({})", emotion, format_confidence(confidence))
}

/// Tone of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusTone {
    Success,
    Error,
    #[default]
    Neutral,
}

impl StatusTone {
    pub fn color(self) -> Rgb {
        match self {
            StatusTone::Success => Rgb::from_hex(0x27AE60),
            StatusTone::Error => Rgb::from_hex(0xE74C3C),
            StatusTone::Neutral => Rgb::from_hex(0x34495E),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_matches_known_labels() {
        assert_eq!(color_for_label("happy").to_hex(), "#F1C40F");
        assert_eq!(color_for_label("disgust").to_hex(), "#95A5A6");
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::from_label(emotion.label()), Some(emotion));
        }
    }

    #[test]
    fn unknown_labels_fall_back() {
        assert_eq!(color_for_label("contempt"), FALLBACK_COLOR);
        assert_eq!(color_for_label("Happy"), FALLBACK_COLOR);
        assert_eq!(color_for_label(""), FALLBACK_COLOR);
    }

    #[test]
    fn confidence_always_has_two_decimals() {
        assert_eq!(format_confidence(83.0), "83.00%");
        assert_eq!(format_confidence(12.3456), "12.35%");
        assert_eq!(format_confidence(0.0), "0.00%");
        assert_eq!(face_label("sad", 7.1), "sad (7.10%)");
    }
}
