//! What the kiosk should be showing.
//!
//! The session publishes a [`Screen`] after every transition. Rendering is
//! somebody else's job; a front-end subscribes to the watch channel and
//! draws whatever it receives.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Welcome,
    Countdown {
        remaining: u32,
    },
    /// Shutter is firing.
    Cheese,
    Composing,
    Review {
        montage: PathBuf,
    },
    Printing,
    PhotoError,
    PrintError,
}

impl Screen {
    pub fn title(&self) -> &'static str {
        match self {
            Screen::Welcome => "Welcome to the photo booth!",
            Screen::Countdown { .. } => "",
            Screen::Cheese => "Cheese!",
            Screen::Composing => "Developing your picture...",
            Screen::Review { .. } => "Gorgeous! Shall we print it?",
            Screen::Printing => "Printing...",
            Screen::PhotoError => "The picture could not be taken",
            Screen::PrintError => "The picture could not be printed",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            Screen::Welcome => "Press the button, strike a pose, smile...",
            Screen::PhotoError | Screen::PrintError => "If it keeps happening, ask for help",
            _ => "",
        }
    }

    pub fn photo_button_enabled(&self) -> bool {
        matches!(
            self,
            Screen::Welcome | Screen::Review { .. } | Screen::PhotoError | Screen::PrintError
        )
    }

    pub fn print_button_enabled(&self) -> bool {
        matches!(self, Screen::Review { .. })
    }

    pub fn change_frame_enabled(&self) -> bool {
        matches!(self, Screen::Review { .. })
    }

    /// The live webcam feed sits behind welcome and countdown.
    pub fn camera_preview_visible(&self) -> bool {
        matches!(self, Screen::Welcome | Screen::Countdown { .. })
    }
}
