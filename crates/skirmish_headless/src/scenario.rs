//! Scenario loading and configuration.
//!
//! Scenarios define the initial game state for headless runs: the tech tree,
//! map, deposits, factions and their starting units, plus the AI settings
//! the run uses.

use std::path::Path;

use serde::{Deserialize, Serialize};
use skirmish_core::ai::BasicAiSettings;
use skirmish_core::components::Field;
use skirmish_core::config::AiConfig;
use skirmish_core::factions::ControlType;
use skirmish_core::map::Map;
use skirmish_core::math::GridPos;
use skirmish_core::tech::{
    CommandClass, CommandType, Requirements, ResourceType, TechTree, UnitType,
};
use skirmish_core::world::World;
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Neither a built-in scenario name nor a file.
    #[error("Unknown scenario: {0}")]
    Unknown(String),
    /// The scenario does not describe a valid world.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// A deposit on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPlacement {
    /// Resource type name.
    pub resource: String,
    /// Cell.
    pub pos: (i32, i32),
    /// Amount.
    pub amount: i64,
}

/// A starting unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type name.
    pub unit_type: String,
    /// Cell.
    pub pos: (i32, i32),
}

impl UnitPlacement {
    fn new(unit_type: &str, x: i32, y: i32) -> Self {
        Self {
            unit_type: unit_type.to_string(),
            pos: (x, y),
        }
    }
}

/// Setup for one faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionSetup {
    /// Faction type name.
    pub name: String,
    /// Team.
    pub team: usize,
    /// Controller.
    pub control: ControlType,
    /// Home cell; becomes the faction's start location.
    pub home: (i32, i32),
    /// Starting stockpile by resource name.
    #[serde(default)]
    pub resources: Vec<(String, i64)>,
    /// Starting units.
    #[serde(default)]
    pub units: Vec<UnitPlacement>,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Map width and height in cells.
    pub map_size: (i32, i32),
    /// Tech tree; the built-in one when omitted.
    #[serde(default = "builtin_tech")]
    pub tech: TechTree,
    /// Resource deposits.
    #[serde(default)]
    pub deposits: Vec<DepositPlacement>,
    /// Factions, in index order.
    pub factions: Vec<FactionSetup>,
    /// Frames to run when the command line does not say.
    #[serde(default = "default_frames")]
    pub frames: u64,
    /// AI interface configuration.
    #[serde(default)]
    pub ai: AiConfig,
    /// Tuning for the built-in AI.
    #[serde(default)]
    pub basic_ai: BasicAiSettings,
}

fn default_frames() -> u64 {
    600
}

/// Tech tree used by the built-in scenarios.
#[must_use]
pub fn builtin_tech() -> TechTree {
    TechTree {
        name: "classic".into(),
        resource_types: vec![
            ResourceType {
                id: 0,
                name: "gold".into(),
            },
            ResourceType {
                id: 1,
                name: "wood".into(),
            },
        ],
        unit_types: vec![
            UnitType {
                id: 0,
                name: "peasant".into(),
                max_hp: 20,
                sight: 4,
                attack: 1,
                cost: vec![(0, 50)],
                command_types: vec![
                    CommandType::new(1, CommandClass::Stop, "stop"),
                    CommandType::new(2, CommandClass::Move, "move"),
                    CommandType::new(3, CommandClass::Attack, "attack"),
                    CommandType::new(4, CommandClass::Harvest, "harvest").harvesting(&[0, 1]),
                ],
                hidden: false,
                requirements: Requirements::default(),
            },
            UnitType {
                id: 1,
                name: "swordman".into(),
                max_hp: 40,
                sight: 5,
                attack: 4,
                cost: vec![(0, 80), (1, 20)],
                command_types: vec![
                    CommandType::new(10, CommandClass::Stop, "stop"),
                    CommandType::new(11, CommandClass::Move, "move"),
                    CommandType::new(12, CommandClass::Attack, "attack"),
                ],
                hidden: false,
                requirements: Requirements::default(),
            },
            UnitType {
                id: 2,
                name: "castle".into(),
                max_hp: 300,
                sight: 7,
                attack: 0,
                cost: vec![(0, 500), (1, 300)],
                command_types: vec![
                    CommandType::new(20, CommandClass::Produce, "train peasant").producing(0),
                    CommandType::new(21, CommandClass::Produce, "train swordman").producing(1),
                ],
                hidden: false,
                requirements: Requirements::default(),
            },
        ],
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// # Errors
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    ///
    /// # Errors
    /// Returns an error on malformed input.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// A built-in scenario by name, or a scenario file.
    ///
    /// # Errors
    /// Returns an error if `name` is neither.
    pub fn resolve(name: &str) -> Result<Self, ScenarioError> {
        if let Some(scenario) = Self::builtin(name) {
            return Ok(scenario);
        }
        if Path::new(name).exists() {
            return Self::load(name);
        }
        Err(ScenarioError::Unknown(name.to_string()))
    }

    /// Built-in scenario by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "skirmish_1v1" => Some(Self::skirmish_1v1()),
            "skirmish_ffa4" => Some(Self::skirmish_ffa4()),
            _ => None,
        }
    }

    /// Two CPU factions in opposite corners of a 48x48 map.
    #[must_use]
    pub fn skirmish_1v1() -> Self {
        let homes = [(6, 6, 1), (41, 41, -1)];
        Self::corners("skirmish_1v1", "Standard 1v1 CPU skirmish", 48, &homes)
    }

    /// Four CPU factions, one per corner of a 64x64 map.
    #[must_use]
    pub fn skirmish_ffa4() -> Self {
        let homes = [(6, 6, 1), (57, 57, -1), (57, 6, -1), (6, 57, 1)];
        Self::corners(
            "skirmish_ffa4",
            "Four-way CPU free-for-all",
            64,
            &homes,
        )
    }

    fn corners(name: &str, description: &str, size: i32, homes: &[(i32, i32, i32)]) -> Self {
        let mut deposits = Vec::new();
        let mut factions = Vec::new();
        for (index, &(x, y, dir)) in homes.iter().enumerate() {
            deposits.push(DepositPlacement {
                resource: "gold".into(),
                pos: (x + 4 * dir, y),
                amount: 2_000,
            });
            deposits.push(DepositPlacement {
                resource: "wood".into(),
                pos: (x, y + 4 * dir),
                amount: 2_000,
            });
            factions.push(FactionSetup {
                name: format!("player{index}"),
                team: index,
                control: ControlType::Cpu,
                home: (x, y),
                resources: vec![("gold".into(), 300), ("wood".into(), 100)],
                units: vec![
                    UnitPlacement::new("castle", x, y),
                    UnitPlacement::new("peasant", x + dir, y + dir),
                    UnitPlacement::new("peasant", x - dir, y + dir),
                    UnitPlacement::new("swordman", x + dir, y - dir),
                ],
            });
        }
        Self {
            name: name.to_string(),
            description: description.to_string(),
            map_size: (size, size),
            tech: builtin_tech(),
            deposits,
            factions,
            frames: default_frames(),
            ai: AiConfig::default(),
            basic_ai: BasicAiSettings::default(),
        }
    }

    /// Build the initial world.
    ///
    /// # Errors
    /// Returns `Invalid` for unknown type names or units that can't be placed.
    pub fn build_world(&self) -> Result<World, ScenarioError> {
        let (width, height) = self.map_size;
        let mut world = World::new(self.tech.clone(), Map::new(width, height));

        for deposit in &self.deposits {
            let rt = self.resource_id(&deposit.resource)?;
            let pos = GridPos::new(deposit.pos.0, deposit.pos.1);
            if !world.map().is_inside(pos) {
                return Err(ScenarioError::Invalid(format!(
                    "Deposit at {pos} is off the map"
                )));
            }
            world.map_mut().place_resource(pos, rt, deposit.amount);
        }

        for setup in &self.factions {
            let home = GridPos::new(setup.home.0, setup.home.1);
            let start = world.map_mut().add_start_location(home);
            let index = world.add_faction(setup.team, setup.name.clone(), setup.control, start);
            for (resource, amount) in &setup.resources {
                let rt = self.resource_id(resource)?;
                if let Some(faction) = world.faction_mut(index) {
                    faction.add_resource(rt, *amount);
                }
            }
            for placement in &setup.units {
                let ut = self
                    .tech
                    .unit_type_by_name(&placement.unit_type)
                    .ok_or_else(|| {
                        ScenarioError::Invalid(format!("Unknown unit type {}", placement.unit_type))
                    })?;
                let pos = GridPos::new(placement.pos.0, placement.pos.1);
                world
                    .spawn_unit(index, ut.id, pos, Field::Land)
                    .map_err(|e| ScenarioError::Invalid(e.to_string()))?;
            }
        }

        world.refresh_visibility();
        Ok(world)
    }

    fn resource_id(&self, name: &str) -> Result<u32, ScenarioError> {
        self.tech
            .resource_type_by_name(name)
            .map(|rt| rt.id)
            .ok_or_else(|| ScenarioError::Invalid(format!("Unknown resource {name}")))
    }
}
