//! Temperature deck emulator.
//!
//! Speaks the module's single-line command dialect: a G-code token
//! optionally followed by a payload (`M104 S40`). Replies are single ASCII
//! lines or nothing at all.

use tracing::{debug, info, warn};

/// Serial number reported by `DEVICE_INFO`.
pub const SERIAL: &str = "fake_serial";

/// Model reported by `DEVICE_INFO`.
pub const MODEL: &str = "temp_emulator";

/// Firmware version reported by `DEVICE_INFO`.
pub const VERSION: u32 = 1;

/// A device that consumes command lines and optionally replies.
pub trait CommandProcessor: Send {
    /// Handles one command with its payload.
    fn handle(&mut self, cmd: &str, payload: &str) -> Option<String>;

    /// Splits a raw line into command and payload, then handles it.
    fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        let (cmd, payload) = match line.split_once(char::is_whitespace) {
            Some((cmd, payload)) => (cmd, payload.trim()),
            None => (line, ""),
        };
        self.handle(cmd, payload)
    }
}

/// Command tokens understood by the temperature deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gcode {
    GetTemp,
    SetTemp,
    DeviceInfo,
    Disengage,
    ProgrammingMode,
}

impl Gcode {
    pub const ALL: [Gcode; 5] = [
        Gcode::GetTemp,
        Gcode::SetTemp,
        Gcode::DeviceInfo,
        Gcode::Disengage,
        Gcode::ProgrammingMode,
    ];

    /// Wire token for this command.
    pub const fn code(self) -> &'static str {
        match self {
            Self::GetTemp => "M105",
            Self::SetTemp => "M104",
            Self::DeviceInfo => "M115",
            Self::Disengage => "M18",
            Self::ProgrammingMode => "dfu",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.code() == code)
    }
}

/// Emulated temperature deck.
///
/// Reaches its target instantly; there is no thermal model.
#[derive(Debug, Clone, Default)]
pub struct TempDeck {
    target_temp: f64,
    current_temp: f64,
}

impl TempDeck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_temp(&self) -> f64 {
        self.target_temp
    }

    pub fn current_temp(&self) -> f64 {
        self.current_temp
    }

    fn set_target(&mut self, payload: &str) {
        let celsius = payload
            .split_whitespace()
            .find_map(|token| token.strip_prefix('S'))
            .and_then(|value| value.parse::<f64>().ok());

        match celsius {
            Some(c) if c.is_finite() => {
                self.target_temp = c;
                self.current_temp = c;
            }
            _ => warn!(payload, "SET_TEMP without a valid S parameter"),
        }
    }
}

impl CommandProcessor for TempDeck {
    fn handle(&mut self, cmd: &str, payload: &str) -> Option<String> {
        info!(cmd, "Got command");

        match Gcode::from_code(cmd) {
            Some(Gcode::GetTemp) => Some(format!(
                "T:{} C:{}",
                self.target_temp, self.current_temp
            )),
            Some(Gcode::SetTemp) => {
                self.set_target(payload);
                None
            }
            Some(Gcode::Disengage) => {
                self.target_temp = 0.0;
                None
            }
            Some(Gcode::DeviceInfo) => Some(format!(
                "serial:{SERIAL} model:{MODEL} version:{VERSION}"
            )),
            Some(Gcode::ProgrammingMode) => None,
            None => {
                debug!(cmd, "Unknown command");
                None
            }
        }
    }
}

/// Parses a `GET_TEMP` reply (`T:<target> C:<current>`).
pub fn parse_temperature(reply: &str) -> Option<(f64, f64)> {
    let mut target = None;
    let mut current = None;
    for token in reply.split_whitespace() {
        if let Some(v) = token.strip_prefix("T:") {
            target = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("C:") {
            current = v.parse().ok();
        }
    }
    Some((target?, current?))
}

/// Parses a `DEVICE_INFO` reply into `(key, value)` pairs.
pub fn parse_device_info(reply: &str) -> Vec<(String, String)> {
    reply
        .split_whitespace()
        .filter_map(|token| token.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_temp_initial() {
        let mut deck = TempDeck::new();
        assert_eq!(deck.handle("M105", ""), Some("T:0 C:0".to_string()));
    }

    #[test]
    fn test_set_temp_then_get() {
        let mut deck = TempDeck::new();
        assert_eq!(deck.handle_line("M104 S40"), None);
        assert_eq!(deck.handle_line("M105"), Some("T:40 C:40".to_string()));

        assert_eq!(deck.handle_line("M104 S4.5"), None);
        assert_eq!(deck.target_temp(), 4.5);
    }

    #[test]
    fn test_set_temp_invalid_payload_is_ignored() {
        let mut deck = TempDeck::new();
        deck.handle_line("M104 S40");
        assert_eq!(deck.handle_line("M104 Sabc"), None);
        assert_eq!(deck.handle_line("M104"), None);
        assert_eq!(deck.target_temp(), 40.0);
    }

    #[test]
    fn test_device_info() {
        let mut deck = TempDeck::new();
        assert_eq!(
            deck.handle("M115", ""),
            Some("serial:fake_serial model:temp_emulator version:1".to_string())
        );
    }

    #[test]
    fn test_disengage_and_dfu_have_no_reply() {
        let mut deck = TempDeck::new();
        deck.handle_line("M104 S70");
        assert_eq!(deck.handle("M18", ""), None);
        assert_eq!(deck.target_temp(), 0.0);
        assert_eq!(deck.handle("dfu", ""), None);
        assert_eq!(deck.handle("G28", ""), None);
    }

    #[test]
    fn test_gcode_table() {
        for gcode in Gcode::ALL {
            assert_eq!(Gcode::from_code(gcode.code()), Some(gcode));
        }
        assert_eq!(Gcode::from_code("M999"), None);
    }

    #[test]
    fn test_parse_replies() {
        assert_eq!(parse_temperature("T:40 C:25.5"), Some((40.0, 25.5)));
        assert_eq!(parse_temperature("T:40"), None);
        assert_eq!(parse_temperature("garbage"), None);

        let info = parse_device_info("serial:fake_serial model:temp_emulator version:1");
        assert_eq!(info.len(), 3);
        assert_eq!(info[1], ("model".to_string(), "temp_emulator".to_string()));
    }
}
