use serde_json::{Value, json};

/// 8-bit RGB colour.
pub type Rgb = (u8, u8, u8);

/// Colours used by the dispatcher.
pub mod palette {
    use super::Rgb;

    pub const OFF: Rgb = (0, 0, 0);
    /// Someone is in the room.
    pub const ATTRACT: Rgb = (186, 85, 211);
    pub const LISTEN: Rgb = (52, 158, 235);
    pub const RECORD: Rgb = (255, 255, 255);
    pub const ERROR: Rgb = (255, 0, 0);
    pub const ENROLL: Rgb = (0, 255, 0);
}

/// Lighting animation shown on the LED ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedState {
    Static(Rgb),
    Breathe(Rgb),
    Loop(Rgb),
    /// Fill `percent` of the ring.
    Progress(Rgb, u8),
}

impl LedState {
    /// WLED JSON segment command for this state.
    pub fn command(&self) -> Value {
        let (color, mut seg) = match *self {
            LedState::Static(c) => (c, json!({ "fx": 0 })),
            LedState::Breathe(c) => (c, json!({ "fx": 2 })),
            LedState::Loop(c) => (c, json!({ "fx": 41, "sx": 200 })),
            LedState::Progress(c, percent) => (c, json!({ "fx": 98, "ix": percent.min(100) })),
        };
        seg["col"] = json!([[color.0, color.1, color.2]]);
        json!({ "seg": [seg] })
    }
}

/// LED ring driver.
pub trait Leds: Send + Sync {
    fn show(&self, state: LedState);
    /// Switch the strip off for good.
    fn power_off(&self) {}
}

/// [`Leds`] implementation that ignores every command.
#[derive(Clone, Default)]
pub struct NoopLeds;

impl Leds for NoopLeds {
    fn show(&self, _state: LedState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_command_carries_speed() {
        let cmd = LedState::Loop(palette::LISTEN).command();
        assert_eq!(cmd["seg"][0]["fx"], 41);
        assert_eq!(cmd["seg"][0]["sx"], 200);
        assert_eq!(cmd["seg"][0]["col"][0], json!([52, 158, 235]));
    }

    #[test]
    fn progress_is_clamped() {
        let cmd = LedState::Progress(palette::ENROLL, 140).command();
        assert_eq!(cmd["seg"][0]["ix"], 100);
    }
}
