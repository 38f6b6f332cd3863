//! Controller-button remapping table.

/// Physical buttons of a tracked controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerButton {
    A,
    B,
    X,
    Y,
    Grip,
    Trigger,
    ThumbstickUp,
    ThumbstickDown,
    ThumbstickLeft,
    ThumbstickRight,
}

impl ControllerButton {
    pub const ALL: [ControllerButton; 10] = [
        Self::A,
        Self::B,
        Self::X,
        Self::Y,
        Self::Grip,
        Self::Trigger,
        Self::ThumbstickUp,
        Self::ThumbstickDown,
        Self::ThumbstickLeft,
        Self::ThumbstickRight,
    ];

    pub const COUNT: usize = Self::ALL.len();

    fn index(self) -> usize {
        self as usize
    }
}

/// One mapped key code per [`ControllerButton`].
///
/// Persisted as a string with one char per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerMapping([u8; ControllerButton::COUNT]);

impl ControllerMapping {
    pub fn get(&self, button: ControllerButton) -> u8 {
        self.0[button.index()]
    }

    pub fn set(&mut self, button: ControllerButton, code: u8) {
        self.0[button.index()] = code;
    }

    /// Decode the persisted form. Short input leaves trailing slots at 0,
    /// extra chars are ignored.
    pub fn decode(encoded: &str) -> Self {
        let mut slots = [0u8; ControllerButton::COUNT];
        for (slot, ch) in slots.iter_mut().zip(encoded.chars()) {
            *slot = u32::from(ch) as u8;
        }
        Self(slots)
    }

    pub fn encode(&self) -> String {
        self.0.iter().map(|b| char::from(*b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_zero_slots() {
        let mapping = ControllerMapping::default();
        assert_eq!(mapping.encode(), "\0".repeat(ControllerButton::COUNT));
    }

    #[test]
    fn test_set_and_decode() {
        let mut mapping = ControllerMapping::default();
        mapping.set(ControllerButton::Trigger, 62);
        mapping.set(ControllerButton::ThumbstickRight, 22);
        let decoded = ControllerMapping::decode(&mapping.encode());
        assert_eq!(decoded.get(ControllerButton::Trigger), 62);
        assert_eq!(decoded.get(ControllerButton::ThumbstickRight), 22);
        assert_eq!(decoded.get(ControllerButton::A), 0);
    }

    #[test]
    fn test_decode_short_input() {
        let decoded = ControllerMapping::decode("\u{1}");
        assert_eq!(decoded.get(ControllerButton::A), 1);
        assert_eq!(decoded.get(ControllerButton::B), 0);
    }
}
