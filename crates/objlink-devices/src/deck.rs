//! Demo deck graph exposed as remote objects.
//!
//! ```text
//! Deck ──slots──▶ Labware ──wells──▶ Well
//!   │                ▲                 │
//!   │                └─────parent──────┘
//!   └──slots──▶ TemperatureModule ──▶ TempDeck (emulator)
//! ```
//!
//! Wells hold a weak back-reference to their labware, so every deep
//! serialization of a labware walks a reference cycle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tracing::debug;

use objlink_core::{Args, InvokeError, InvokeResult, ObjectRef, RemoteObject, Value};

use crate::tempdeck::{parse_device_info, parse_temperature, CommandProcessor, Gcode, TempDeck};

// ============================================================================
// Labware Definitions
// ============================================================================

/// Static description of a labware type.
#[derive(Debug, Clone, PartialEq)]
pub struct LabwareDefinition {
    pub namespace: &'static str,
    pub load_name: &'static str,
    pub display_name: &'static str,
    pub version: u32,
    pub rows: usize,
    pub columns: usize,
    pub is_tiprack: bool,
    /// Center of A1 relative to the labware origin (mm)
    pub first_well: (f64, f64),
    /// Center-to-center distance between wells (mm)
    pub spacing: f64,
    pub height: f64,
    pub well_depth: f64,
    pub well_diameter: f64,
    pub max_volume: f64,
}

impl LabwareDefinition {
    pub const WELLPLATE_96: LabwareDefinition = LabwareDefinition {
        namespace: "demo",
        load_name: "corning_96_wellplate_360ul_flat",
        display_name: "Corning 96 Well Plate 360 µL Flat",
        version: 1,
        rows: 8,
        columns: 12,
        is_tiprack: false,
        first_well: (14.38, 74.24),
        spacing: 9.0,
        height: 14.22,
        well_depth: 10.67,
        well_diameter: 6.86,
        max_volume: 360.0,
    };

    pub const TIPRACK_300: LabwareDefinition = LabwareDefinition {
        namespace: "demo",
        load_name: "tiprack_96_300ul",
        display_name: "96 Tip Rack 300 µL",
        version: 1,
        rows: 8,
        columns: 12,
        is_tiprack: true,
        first_well: (14.38, 74.24),
        spacing: 9.0,
        height: 64.69,
        well_depth: 59.3,
        well_diameter: 5.23,
        max_volume: 300.0,
    };

    /// `namespace/load_name/version`
    pub fn uri(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.load_name, self.version)
    }

    /// Well name for a zero-based row and column (`A1`, `H12`).
    pub fn well_name(row: usize, column: usize) -> String {
        let letter = (b'A' + (row % 26) as u8) as char;
        format!("{letter}{}", column + 1)
    }
}

// ============================================================================
// Labware
// ============================================================================

/// A piece of labware placed in a deck slot.
pub struct Labware {
    definition: LabwareDefinition,
    slot: String,
    wells: Vec<Arc<Well>>,
}

impl Labware {
    /// Builds the labware and its wells, column-major from A1.
    pub fn new(definition: LabwareDefinition, slot: impl Into<String>) -> Arc<Self> {
        let slot = slot.into();
        Arc::new_cyclic(|parent: &Weak<Labware>| {
            let mut wells = Vec::with_capacity(definition.rows * definition.columns);
            for column in 0..definition.columns {
                for row in 0..definition.rows {
                    wells.push(Arc::new(Well {
                        name: LabwareDefinition::well_name(row, column),
                        center: (
                            definition.first_well.0 + column as f64 * definition.spacing,
                            definition.first_well.1 - row as f64 * definition.spacing,
                        ),
                        top_z: definition.height,
                        depth: definition.well_depth,
                        diameter: definition.well_diameter,
                        max_volume: definition.max_volume,
                        parent: parent.clone(),
                    }));
                }
            }
            Labware {
                definition,
                slot,
                wells,
            }
        })
    }

    pub fn definition(&self) -> &LabwareDefinition {
        &self.definition
    }

    pub fn wells(&self) -> &[Arc<Well>] {
        &self.wells
    }

    pub fn well(&self, name: &str) -> Option<&Arc<Well>> {
        self.wells.iter().find(|w| w.name == name)
    }

    fn display_name(&self) -> String {
        format!("{} on {}", self.definition.display_name, self.slot)
    }

    fn well_values(&self) -> Value {
        Value::List(self.wells.iter().map(|w| Value::object(Arc::clone(w))).collect())
    }

    /// Wells grouped by row letter, in column order.
    fn rows(&self) -> Value {
        let mut rows: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for well in &self.wells {
            let letter = well.name.chars().take(1).collect::<String>();
            rows.entry(letter)
                .or_default()
                .push(Value::object(Arc::clone(well)));
        }
        Value::map(rows)
    }
}

#[async_trait]
impl RemoteObject for Labware {
    fn class_name(&self) -> &'static str {
        "Labware"
    }

    fn methods(&self) -> &'static [&'static str] {
        &[
            "get_name",
            "get_uri",
            "get_display_name",
            "is_tiprack",
            "wells",
            "well",
            "rows",
        ]
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::from(self.definition.load_name)),
            ("uri", Value::from(self.definition.uri())),
            ("slot", Value::from(self.slot.as_str())),
            ("is_tiprack", Value::from(self.definition.is_tiprack)),
            ("wells", self.well_values()),
        ]
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value> {
        let args = Args::new(method, args);
        match method {
            "get_name" => Ok(Value::from(self.definition.load_name)),
            "get_uri" => Ok(Value::from(self.definition.uri())),
            "get_display_name" => Ok(Value::from(self.display_name())),
            "is_tiprack" => Ok(Value::from(self.definition.is_tiprack)),
            "wells" => Ok(self.well_values()),
            "well" => {
                args.expect_len(1)?;
                let name = args.str(0)?;
                self.well(name)
                    .map(|w| Value::object(Arc::clone(w)))
                    .ok_or_else(|| InvokeError::Failed(format!("no well named {name}")))
            }
            "rows" => Ok(self.rows()),
            other => Err(InvokeError::unknown(self.class_name(), other)),
        }
    }
}

// ============================================================================
// Well
// ============================================================================

/// A single well or tip position.
pub struct Well {
    name: String,
    /// XY center in labware coordinates (mm)
    center: (f64, f64),
    top_z: f64,
    depth: f64,
    diameter: f64,
    max_volume: f64,
    parent: Weak<Labware>,
}

impl Well {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the well top, optionally offset along Z.
    pub fn top(&self, z: f64) -> (f64, f64, f64) {
        (self.center.0, self.center.1, self.top_z + z)
    }

    /// Position of the well bottom, optionally offset along Z.
    pub fn bottom(&self, z: f64) -> (f64, f64, f64) {
        (self.center.0, self.center.1, self.top_z - self.depth + z)
    }

    fn parent_value(&self) -> Value {
        match self.parent.upgrade() {
            Some(parent) => Value::object(parent),
            None => Value::Null,
        }
    }
}

fn point(p: (f64, f64, f64)) -> Value {
    Value::map([("x", p.0), ("y", p.1), ("z", p.2)])
}

fn optional_offset(args: &Args<'_>) -> InvokeResult<f64> {
    if args.is_empty() {
        Ok(0.0)
    } else {
        args.expect_len(1)?;
        args.f64(0)
    }
}

#[async_trait]
impl RemoteObject for Well {
    fn class_name(&self) -> &'static str {
        "Well"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["get_name", "top", "bottom", "get_parent", "max_volume"]
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::from(self.name.as_str())),
            ("depth", Value::from(self.depth)),
            ("diameter", Value::from(self.diameter)),
            ("max_volume", Value::from(self.max_volume)),
            ("parent", self.parent_value()),
        ]
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value> {
        let args = Args::new(method, args);
        match method {
            "get_name" => Ok(Value::from(self.name.as_str())),
            "top" => Ok(point(self.top(optional_offset(&args)?))),
            "bottom" => Ok(point(self.bottom(optional_offset(&args)?))),
            "get_parent" => Ok(self.parent_value()),
            "max_volume" => Ok(Value::from(self.max_volume)),
            other => Err(InvokeError::unknown(self.class_name(), other)),
        }
    }
}

// ============================================================================
// Temperature Module
// ============================================================================

/// Remote driver for a temperature deck.
///
/// Talks to the device only through its command-line contract.
pub struct TemperatureModule {
    slot: String,
    device: Mutex<Box<dyn CommandProcessor>>,
}

impl TemperatureModule {
    /// Creates a module backed by the emulator.
    pub fn emulated(slot: impl Into<String>) -> Arc<Self> {
        Self::with_device(slot, Box::new(TempDeck::new()))
    }

    pub fn with_device(slot: impl Into<String>, device: Box<dyn CommandProcessor>) -> Arc<Self> {
        Arc::new(Self {
            slot: slot.into(),
            device: Mutex::new(device),
        })
    }

    /// Sends one command line and returns the reply.
    pub fn send(&self, line: &str) -> Option<String> {
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        let reply = device.handle_line(line);
        debug!(line, reply = ?reply, "Module command");
        reply
    }

    fn temperature(&self) -> InvokeResult<(f64, f64)> {
        let reply = self
            .send(Gcode::GetTemp.code())
            .ok_or_else(|| InvokeError::failed("no reply to GET_TEMP"))?;
        parse_temperature(&reply)
            .ok_or_else(|| InvokeError::Failed(format!("unparseable GET_TEMP reply: {reply}")))
    }
}

#[async_trait]
impl RemoteObject for TemperatureModule {
    fn class_name(&self) -> &'static str {
        "TemperatureModule"
    }

    fn methods(&self) -> &'static [&'static str] {
        &[
            "get_temperature",
            "get_target",
            "set_temperature",
            "deactivate",
            "device_info",
            "send_command",
        ]
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![("slot", Value::from(self.slot.as_str()))]
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value> {
        let args = Args::new(method, args);
        match method {
            "get_temperature" => Ok(Value::from(self.temperature()?.1)),
            "get_target" => Ok(Value::from(self.temperature()?.0)),
            "set_temperature" => {
                args.expect_len(1)?;
                let celsius = args.f64(0)?;
                self.send(&format!("{} S{celsius}", Gcode::SetTemp.code()));
                Ok(Value::Null)
            }
            "deactivate" => {
                self.send(Gcode::Disengage.code());
                Ok(Value::Null)
            }
            "device_info" => {
                let reply = self
                    .send(Gcode::DeviceInfo.code())
                    .ok_or_else(|| InvokeError::failed("no reply to DEVICE_INFO"))?;
                Ok(Value::map(parse_device_info(&reply)))
            }
            "send_command" => {
                args.expect_len(1)?;
                Ok(Value::from(self.send(args.str(0)?)))
            }
            other => Err(InvokeError::unknown(self.class_name(), other)),
        }
    }
}

// ============================================================================
// Deck
// ============================================================================

/// Robot deck: numbered slots holding labware and modules.
pub struct Deck {
    name: String,
    slots: BTreeMap<String, ObjectRef>,
}

impl Deck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: BTreeMap::new(),
        }
    }

    /// Places an object in a slot, replacing any previous occupant.
    pub fn place(mut self, slot: impl Into<String>, item: ObjectRef) -> Self {
        self.slots.insert(slot.into(), item);
        self
    }

    /// Demo layout: plate in 1, tip rack in 2, temperature module in 3.
    pub fn demo() -> Arc<Self> {
        let deck = Self::new("demo deck")
            .place("1", Labware::new(LabwareDefinition::WELLPLATE_96, "1"))
            .place("2", Labware::new(LabwareDefinition::TIPRACK_300, "2"))
            .place("3", TemperatureModule::emulated("3"));
        Arc::new(deck)
    }

    pub fn slot(&self, slot: &str) -> Option<&ObjectRef> {
        self.slots.get(slot)
    }

    fn slot_arg(args: &Args<'_>) -> InvokeResult<String> {
        args.expect_len(1)?;
        let value = args.value(0)?;
        if let Some(s) = value.as_str() {
            return Ok(s.to_string());
        }
        value
            .as_i64()
            .map(|n| n.to_string())
            .ok_or(InvokeError::InvalidArgument {
                method: "get_slot".to_string(),
                index: 0,
                expected: "a slot name or number",
            })
    }
}

#[async_trait]
impl RemoteObject for Deck {
    fn class_name(&self) -> &'static str {
        "Deck"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["get_name", "list_slots", "get_slot"]
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::from(self.name.as_str())),
            (
                "slots",
                Value::map(
                    self.slots
                        .iter()
                        .map(|(slot, item)| (slot.clone(), Value::Object(Arc::clone(item)))),
                ),
            ),
        ]
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value> {
        let args = Args::new(method, args);
        match method {
            "get_name" => Ok(Value::from(self.name.as_str())),
            "list_slots" => Ok(Value::from(
                self.slots.keys().cloned().collect::<Vec<String>>(),
            )),
            "get_slot" => {
                let slot = Self::slot_arg(&args)?;
                self.slot(&slot)
                    .map(|item| Value::Object(Arc::clone(item)))
                    .ok_or_else(|| InvokeError::Failed(format!("slot {slot} is empty")))
            }
            other => Err(InvokeError::unknown(self.class_name(), other)),
        }
    }
}
