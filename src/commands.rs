/// Where the walk happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Home,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pee,
    Poop,
}

/// One of the fixed keyboard buttons: a location/action pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityButton {
    pub location: Location,
    pub action: Action,
}

impl ActivityButton {
    /// All buttons in keyboard order.
    pub const ALL: [ActivityButton; 4] = [
        ActivityButton::new(Location::Home, Action::Pee),
        ActivityButton::new(Location::Home, Action::Poop),
        ActivityButton::new(Location::Outside, Action::Pee),
        ActivityButton::new(Location::Outside, Action::Poop),
    ];

    pub const fn new(location: Location, action: Action) -> Self {
        Self { location, action }
    }

    /// Display text of the button. Incoming text must match it exactly.
    pub fn label(&self) -> &'static str {
        match (self.location, self.action) {
            (Location::Home, Action::Pee) => "🏠 пописала дома",
            (Location::Home, Action::Poop) => "🏠 покакала дома",
            (Location::Outside, Action::Pee) => "🌳 пописала на улице",
            (Location::Outside, Action::Poop) => "🌳 покакала на улице",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|button| button.label() == text)
    }
}

/// Classified incoming text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start` or `/help`
    Start,
    Activity(ActivityButton),
    Unrecognized,
}

impl Command {
    pub fn classify(text: &str) -> Self {
        if let Some(name) = bot_command_name(text) {
            if name == "start" || name == "help" {
                return Command::Start;
            }
        }
        match ActivityButton::from_label(text) {
            Some(button) => Command::Activity(button),
            None => Command::Unrecognized,
        }
    }
}

/// Extracts `name` from `/name`, `/name@bot` or `/name args`.
fn bot_command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let name = command.split('@').next().unwrap_or(command);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Button labels laid out two per row.
pub fn keyboard_rows() -> Vec<Vec<String>> {
    ActivityButton::ALL
        .chunks(2)
        .map(|row| row.iter().map(|b| b.label().to_string()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_help() {
        assert_eq!(Command::classify("/start"), Command::Start);
        assert_eq!(Command::classify("/help"), Command::Start);
        assert_eq!(Command::classify("/start@pawlog_bot"), Command::Start);
        assert_eq!(Command::classify("/start deep-link"), Command::Start);
    }

    #[test]
    fn test_other_commands_are_unrecognized() {
        assert_eq!(Command::classify("/stop"), Command::Unrecognized);
        assert_eq!(Command::classify("/Start"), Command::Unrecognized);
        assert_eq!(Command::classify("/"), Command::Unrecognized);
        assert_eq!(Command::classify("start"), Command::Unrecognized);
    }

    #[test]
    fn test_every_label_maps_to_its_button() {
        for button in ActivityButton::ALL {
            assert_eq!(Command::classify(button.label()), Command::Activity(button));
        }
    }

    #[test]
    fn test_labels_must_match_exactly() {
        assert_eq!(Command::classify("🏠 пописала дома "), Command::Unrecognized);
        assert_eq!(Command::classify("пописала дома"), Command::Unrecognized);
        assert_eq!(Command::classify("🏠 ПОПИСАЛА ДОМА"), Command::Unrecognized);
        assert_eq!(Command::classify("blah"), Command::Unrecognized);
        assert_eq!(Command::classify(""), Command::Unrecognized);
    }

    #[test]
    fn test_label_decoding() {
        assert_eq!(
            ActivityButton::from_label("🌳 покакала на улице"),
            Some(ActivityButton::new(Location::Outside, Action::Poop))
        );
    }

    #[test]
    fn test_keyboard_is_two_by_two() {
        let rows = keyboard_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.len() == 2));
        assert_eq!(rows[0][0], "🏠 пописала дома");
        assert_eq!(rows[1][1], "🌳 покакала на улице");
    }
}
