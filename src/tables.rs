//! Static lookup tables.
//!
//! The position of a name is the identifier the firmware uses on the wire, so
//! entries must never be reordered.

/// Equalizer (sound mode) names indexed by `i_curr_eq`
pub const EQUALIZERS: [&str; 23] = [
    "Standard",
    "Bass",
    "Flat",
    "Boost",
    "Treble and Bass",
    "User",
    "Music",
    "Cinema",
    "Night",
    "News",
    "Voice",
    "ia_sound",
    "Adaptive Sound Control",
    "Movie",
    "Bass Blast",
    "Dolby Atmos",
    "DTS Virtual X",
    "Bass Boost Plus",
    "DTS X",
    "AI Sound Pro",
    "Clear Voice",
    "Sports",
    "Game",
];

/// Source function names indexed by `i_curr_func`
pub const FUNCTIONS: [&str; 21] = [
    "Wi-Fi",
    "Bluetooth",
    "Portable",
    "Aux",
    "Optical",
    "CP",
    "HDMI",
    "ARC",
    "Spotify",
    "Optical2",
    "HDMI2",
    "HDMI3",
    "LG TV",
    "Mic",
    "Chromecast",
    "Optical/HDMI ARC",
    "LG Optical",
    "FM",
    "USB",
    "USB2",
    "E-ARC",
];

/// Stream type names indexed by `i_stream_type`; 0 means nothing is streaming
pub const STREAM_TYPES: [&str; 5] = ["Unknown0", "Google Cast", "Unknown2", "Airplay", "Spotify Connect"];

/// `i_play_ctrl` value reported while playback is paused or stopped
pub const PLAY_CONTROL_PAUSED: i32 = 1;

/// Name at `index`, or `None` for -1 and anything out of bounds
pub fn lookup(table: &[&'static str], index: i32) -> Option<&'static str> {
    usize::try_from(index).ok().and_then(|i| table.get(i).copied())
}

/// Wire index of `name`
pub fn index_of(table: &[&'static str], name: &str) -> Option<i32> {
    table.iter().position(|entry| *entry == name).map(|i| i as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_respects_bounds() {
        assert_eq!(lookup(&FUNCTIONS, 0), Some("Wi-Fi"));
        assert_eq!(lookup(&FUNCTIONS, 20), Some("E-ARC"));
        assert_eq!(lookup(&FUNCTIONS, 21), None);
        assert_eq!(lookup(&FUNCTIONS, -1), None);
        assert_eq!(lookup(&EQUALIZERS, 22), Some("Game"));
    }

    #[test]
    fn index_of_finds_wire_identifier() {
        assert_eq!(index_of(&FUNCTIONS, "HDMI"), Some(6));
        assert_eq!(index_of(&EQUALIZERS, "Cinema"), Some(7));
        assert_eq!(index_of(&EQUALIZERS, "Loud"), None);
    }
}
