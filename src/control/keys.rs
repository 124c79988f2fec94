//! Operator key bindings

/// Operator actions bound to single keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKey {
    BalanceLeft,
    BalanceMid,
    BalanceRight,
    VolumeDown,
    VolumeUp,
    MuteToggle,
    PitchUp,
    PitchDown,
    PitchReset,
    TempoUp,
    TempoDown,
    TempoReset,
    SeekToBegin,
    PlayStop,
    Exit,
}

const BINDINGS: &[(char, ControlKey)] = &[
    ('q', ControlKey::BalanceLeft),
    ('w', ControlKey::BalanceMid),
    ('e', ControlKey::BalanceRight),
    ('a', ControlKey::VolumeDown),
    ('s', ControlKey::VolumeUp),
    ('d', ControlKey::MuteToggle),
    ('r', ControlKey::PitchUp),
    ('f', ControlKey::PitchDown),
    ('v', ControlKey::PitchReset),
    ('t', ControlKey::TempoUp),
    ('g', ControlKey::TempoDown),
    ('b', ControlKey::TempoReset),
    ('z', ControlKey::SeekToBegin),
    ('x', ControlKey::PlayStop),
    ('c', ControlKey::Exit),
];

/// The exit key
pub const EXIT_KEY: char = 'c';

impl ControlKey {
    /// Action bound to `key`, if any
    pub fn from_char(key: char) -> Option<Self> {
        BINDINGS
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, action)| *action)
    }

    /// Key bound to this action
    pub fn key(self) -> char {
        BINDINGS
            .iter()
            .find(|(_, action)| *action == self)
            .map(|(key, _)| *key)
            .unwrap_or(EXIT_KEY)
    }

    pub fn is_balance(self) -> bool {
        matches!(
            self,
            ControlKey::BalanceLeft | ControlKey::BalanceMid | ControlKey::BalanceRight
        )
    }
}

/// Key help printed before interactive playback
///
/// Balance keys are omitted for mono sources.
pub fn banner(stereo: bool) -> String {
    let balance = if stereo {
        "[q] Balance Left  [w] Balance Mid  [e] Balance Right  "
    } else {
        "                                                      "
    };
    let rule = "*".repeat(101);
    format!(
        "{rule}\n\
         * {balance}[r] Pitch High   [t] Tempo Fast   |  KPLAY  *\n\
         * [a] Volume Down   [s] Volume Up    [d] Mute/Unmute    [f] Pitch Low    [g] Tempo Slow   |         *\n\
         * [z] Re-start      [x] Play/Stop    [c] Exit           [v] Pitch Reset  [b] Tempo Reset  |         *\n\
         {rule}"
    )
}
