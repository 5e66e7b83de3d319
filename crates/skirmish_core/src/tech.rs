//! Tech tree: resource, unit and command type definitions.
//!
//! Types are plain data loaded once per session. Units refer to their type by
//! id so the world can be cloned and serialized cheaply.

use serde::{Deserialize, Serialize};

/// Identifier of a resource type.
pub type ResourceTypeId = u32;
/// Identifier of a unit type.
pub type UnitTypeId = u32;
/// Identifier of a command type. Unique across the whole tech tree.
pub type CommandTypeId = u32;
/// Identifier of an upgrade researched by an upgrade command.
pub type UpgradeTypeId = u32;

/// What a faction needs before a command or unit type becomes available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    /// Unit types the faction needs at least one living unit of.
    #[serde(default)]
    pub units: Vec<UnitTypeId>,
    /// Upgrades the faction must have researched.
    #[serde(default)]
    pub upgrades: Vec<UpgradeTypeId>,
}

impl Requirements {
    /// True when nothing is required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.upgrades.is_empty()
    }
}

/// A harvestable resource (gold, wood, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    /// Resource type id.
    pub id: ResourceTypeId,
    /// Name, used as the persisted key.
    pub name: String,
}

/// Broad category of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandClass {
    /// Clear the command queue.
    Stop,
    /// Walk to a position.
    Move,
    /// Attack a unit or a position.
    Attack,
    /// Construct a building at a position.
    Build,
    /// Gather a resource.
    Harvest,
    /// Repair a unit.
    Repair,
    /// Produce a unit.
    Produce,
    /// Research an upgrade.
    Upgrade,
    /// Change into another unit type.
    Morph,
    /// Ask to switch team.
    SwitchTeam,
}

impl std::fmt::Display for CommandClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A concrete command a unit type can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandType {
    /// Command type id.
    pub id: CommandTypeId,
    /// Command class.
    pub class: CommandClass,
    /// Display name.
    pub name: String,
    /// Resources a harvest command can gather.
    #[serde(default)]
    pub harvests: Vec<ResourceTypeId>,
    /// Unit type made by a produce or build command.
    #[serde(default)]
    pub produces: Option<UnitTypeId>,
    /// Upgrade researched by an upgrade command.
    #[serde(default)]
    pub researches: Option<UpgradeTypeId>,
    /// Needed before the command can be given.
    #[serde(default)]
    pub requirements: Requirements,
}

impl CommandType {
    /// Create a command type without harvest or production data.
    #[must_use]
    pub fn new(id: CommandTypeId, class: CommandClass, name: impl Into<String>) -> Self {
        Self {
            id,
            class,
            name: name.into(),
            harvests: Vec::new(),
            produces: None,
            researches: None,
            requirements: Requirements::default(),
        }
    }

    /// Set the resources a harvest command can gather.
    #[must_use]
    pub fn harvesting(mut self, resources: &[ResourceTypeId]) -> Self {
        self.harvests = resources.to_vec();
        self
    }

    /// Set the unit type this command produces.
    #[must_use]
    pub fn producing(mut self, unit_type: UnitTypeId) -> Self {
        self.produces = Some(unit_type);
        self
    }

    /// Set the upgrade this command researches.
    #[must_use]
    pub fn researching(mut self, upgrade: UpgradeTypeId) -> Self {
        self.researches = Some(upgrade);
        self
    }

    /// Set what the faction needs before the command can be given.
    #[must_use]
    pub fn requiring(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }
}

/// A unit type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    /// Unit type id.
    pub id: UnitTypeId,
    /// Display name.
    pub name: String,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Sight radius in cells.
    pub sight: i32,
    /// Damage per tick against an adjacent target.
    pub attack: u32,
    /// Resource cost to produce or build.
    #[serde(default)]
    pub cost: Vec<(ResourceTypeId, i64)>,
    /// Commands this type accepts, in priority order.
    pub command_types: Vec<CommandType>,
    /// Cell-map units (walls, gates) that enemies never see.
    #[serde(default)]
    pub hidden: bool,
    /// Needed before the type can be produced or built.
    #[serde(default)]
    pub requirements: Requirements,
}

impl UnitType {
    /// First command of a class, in declaration order.
    #[must_use]
    pub fn first_command_of_class(&self, class: CommandClass) -> Option<&CommandType> {
        self.command_types.iter().find(|ct| ct.class == class)
    }

    /// Command type by id, if this unit type owns it.
    #[must_use]
    pub fn find_command_type(&self, id: CommandTypeId) -> Option<&CommandType> {
        self.command_types.iter().find(|ct| ct.id == id)
    }

    /// First harvest command able to gather `resource`.
    #[must_use]
    pub fn first_harvest_command(&self, resource: ResourceTypeId) -> Option<&CommandType> {
        self.command_types
            .iter()
            .find(|ct| ct.class == CommandClass::Harvest && ct.harvests.contains(&resource))
    }
}

/// All types available in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechTree {
    /// Tech tree name.
    pub name: String,
    /// Resource types.
    pub resource_types: Vec<ResourceType>,
    /// Unit types.
    pub unit_types: Vec<UnitType>,
}

impl TechTree {
    /// Resource type by id.
    #[must_use]
    pub fn resource_type(&self, id: ResourceTypeId) -> Option<&ResourceType> {
        self.resource_types.iter().find(|rt| rt.id == id)
    }

    /// Resource type by name.
    #[must_use]
    pub fn resource_type_by_name(&self, name: &str) -> Option<&ResourceType> {
        self.resource_types.iter().find(|rt| rt.name == name)
    }

    /// Unit type by id.
    #[must_use]
    pub fn unit_type(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.unit_types.iter().find(|ut| ut.id == id)
    }

    /// Command type by id, searched across every unit type.
    #[must_use]
    pub fn command_type(&self, id: CommandTypeId) -> Option<&CommandType> {
        self.unit_types
            .iter()
            .find_map(|ut| ut.find_command_type(id))
    }

    /// Unit type by name.
    #[must_use]
    pub fn unit_type_by_name(&self, name: &str) -> Option<&UnitType> {
        self.unit_types.iter().find(|ut| ut.name == name)
    }

    /// Whether any unit type of this tree can harvest or costs `resource`.
    #[must_use]
    pub fn uses_resource_type(&self, resource: ResourceTypeId) -> bool {
        self.unit_types.iter().any(|ut| {
            ut.first_harvest_command(resource).is_some()
                || ut.cost.iter().any(|(rt, _)| *rt == resource)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> UnitType {
        UnitType {
            id: 1,
            name: "worker".into(),
            max_hp: 50,
            sight: 5,
            attack: 1,
            cost: vec![(0, 50)],
            command_types: vec![
                CommandType::new(10, CommandClass::Move, "move"),
                CommandType::new(11, CommandClass::Harvest, "harvest_wood").harvesting(&[1]),
                CommandType::new(12, CommandClass::Harvest, "harvest_gold").harvesting(&[0]),
            ],
            hidden: false,
            requirements: Requirements::default(),
        }
    }

    #[test]
    fn test_first_harvest_command_matches_resource() {
        let ut = worker();
        assert_eq!(ut.first_harvest_command(0).map(|ct| ct.id), Some(12));
        assert_eq!(ut.first_harvest_command(1).map(|ct| ct.id), Some(11));
        assert!(ut.first_harvest_command(7).is_none());
    }

    #[test]
    fn test_first_command_of_class_uses_declaration_order() {
        let ut = worker();
        assert_eq!(
            ut.first_command_of_class(CommandClass::Harvest).map(|ct| ct.id),
            Some(11)
        );
        assert!(ut.first_command_of_class(CommandClass::Attack).is_none());
    }

    #[test]
    fn test_command_type_lookup_spans_unit_types() {
        let tree = TechTree {
            name: "t".into(),
            resource_types: Vec::new(),
            unit_types: vec![worker()],
        };
        assert_eq!(tree.command_type(12).map(|ct| ct.name.as_str()), Some("harvest_gold"));
        assert!(tree.command_type(13).is_none());
        assert!(tree.command_type(10).is_some_and(|ct| ct.requirements.is_empty()));
    }
}
