//! objlink Devices - emulated hardware and demo object graph
//!
//! Application-side objects served by objlinkd:
//! - `tempdeck` - temperature deck emulator speaking the G-code dialect
//! - `deck` - a deck with labware, wells and a temperature module, exposed
//!   as remote objects

pub mod deck;
pub mod tempdeck;

pub use deck::{Deck, Labware, LabwareDefinition, TemperatureModule, Well};
pub use tempdeck::{CommandProcessor, Gcode, TempDeck};
