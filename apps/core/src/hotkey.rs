use crate::input_hook::{KeyNotification, KeyTransition};

pub const DEFAULT_HOTKEY: &str = "Ctrl+Space";

pub const VK_TAB: u32 = 0x09;
pub const VK_RETURN: u32 = 0x0D;
pub const VK_ESCAPE: u32 = 0x1B;
pub const VK_SPACE: u32 = 0x20;
pub const VK_F1: u32 = 0x70;

pub const VK_LWIN: u32 = 0x5B;
pub const VK_RWIN: u32 = 0x5C;
pub const VK_LSHIFT: u32 = 0xA0;
pub const VK_RSHIFT: u32 = 0xA1;
pub const VK_LCONTROL: u32 = 0xA2;
pub const VK_RCONTROL: u32 = 0xA3;
pub const VK_LMENU: u32 = 0xA4;
pub const VK_RMENU: u32 = 0xA5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
}

impl Modifiers {
    pub const CTRL: Self = Self {
        ctrl: true,
        alt: false,
        shift: false,
        win: false,
    };

    /// True when every modifier set in `required` is also set in `self`.
    pub fn contains(&self, required: Modifiers) -> bool {
        (!required.ctrl || self.ctrl)
            && (!required.alt || self.alt)
            && (!required.shift || self.shift)
            && (!required.win || self.win)
    }

    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.alt || self.shift || self.win)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyParseError {
    #[error("hotkey must include at least one modifier and one key")]
    MissingParts,
    #[error("unsupported modifier '{0}'; use Ctrl, Alt, Shift or Win")]
    UnsupportedModifier(String),
    #[error("unsupported key '{0}'; use A-Z, 0-9, Space, Tab, Enter, Escape or F1-F24")]
    UnsupportedKey(String),
    #[error("hotkey '{0}' is reserved by Windows")]
    Reserved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub modifiers: Modifiers,
    pub vk_code: u32,
}

impl Default for Hotkey {
    fn default() -> Self {
        Self {
            modifiers: Modifiers::CTRL,
            vk_code: VK_SPACE,
        }
    }
}

impl Hotkey {
    pub fn is_triggered_by(&self, notification: &KeyNotification) -> bool {
        let event = &notification.event;
        if event.vk_code != self.vk_code {
            return false;
        }

        // Windows reports key presses made while Alt is held as system keys.
        let pressed = match event.transition {
            KeyTransition::KeyDown => true,
            KeyTransition::SystemKeyDown => self.modifiers.alt,
            KeyTransition::KeyUp | KeyTransition::SystemKeyUp => false,
        };

        pressed && notification.modifiers.contains(self.modifiers)
    }
}

pub fn parse_hotkey(input: &str) -> Result<Hotkey, HotkeyParseError> {
    let parts: Vec<&str> = input
        .split('+')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() < 2 {
        return Err(HotkeyParseError::MissingParts);
    }

    let mut modifiers = Modifiers::default();
    for part in &parts[..parts.len() - 1] {
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers.ctrl = true,
            "alt" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            "win" | "windows" | "meta" | "super" => modifiers.win = true,
            _ => return Err(HotkeyParseError::UnsupportedModifier(part.to_string())),
        }
    }

    let key = parts[parts.len() - 1];
    let vk_code = parse_key(key).ok_or_else(|| HotkeyParseError::UnsupportedKey(key.to_string()))?;
    let hotkey = Hotkey { modifiers, vk_code };

    if is_reserved(&hotkey) {
        return Err(HotkeyParseError::Reserved(input.trim().to_string()));
    }

    Ok(hotkey)
}

fn parse_key(input: &str) -> Option<u32> {
    let upper = input.to_ascii_uppercase();
    match upper.as_str() {
        "SPACE" => return Some(VK_SPACE),
        "TAB" => return Some(VK_TAB),
        "ENTER" | "RETURN" => return Some(VK_RETURN),
        "ESC" | "ESCAPE" => return Some(VK_ESCAPE),
        _ => {}
    }

    if let Some(number) = upper.strip_prefix('F') {
        if let Ok(parsed) = number.parse::<u32>() {
            return (1..=24).contains(&parsed).then(|| VK_F1 + parsed - 1);
        }
    }

    let mut chars = upper.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c as u32),
        _ => None,
    }
}

fn is_reserved(hotkey: &Hotkey) -> bool {
    let Modifiers {
        ctrl,
        alt,
        shift,
        win,
    } = hotkey.modifiers;
    if win {
        return false;
    }

    match hotkey.vk_code {
        VK_TAB => alt && !ctrl && !shift,
        code if code == VK_F1 + 3 => alt && !ctrl && !shift,
        VK_ESCAPE => (ctrl && !alt) || (alt && !ctrl && !shift),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hotkey_is_ctrl_space() {
        let parsed = parse_hotkey(DEFAULT_HOTKEY).unwrap();
        assert_eq!(parsed, Hotkey::default());
        assert_eq!(parsed.vk_code, 0x20);
    }

    #[test]
    fn function_keys_map_to_contiguous_codes() {
        assert_eq!(parse_key("F1"), Some(0x70));
        assert_eq!(parse_key("f12"), Some(0x7B));
        assert_eq!(parse_key("F24"), Some(0x87));
        assert_eq!(parse_key("F25"), None);
    }

    #[test]
    fn letters_and_digits_use_ascii_codes() {
        assert_eq!(parse_key("k"), Some('K' as u32));
        assert_eq!(parse_key("7"), Some('7' as u32));
        assert_eq!(parse_key("?"), None);
    }

    #[test]
    fn modifier_containment_allows_extra_modifiers() {
        let held = Modifiers {
            ctrl: true,
            shift: true,
            ..Default::default()
        };
        assert!(held.contains(Modifiers::CTRL));
        assert!(!Modifiers::CTRL.contains(held));
        assert!(Modifiers::default().is_empty());
    }
}
