//! Test fixtures and helpers.
//!
//! A small standard tech tree, pre-built skirmish worlds and the service
//! wiring an AI interface needs, for consistent testing.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use skirmish_core::ai::GameContext;
use skirmish_core::commander::{Commander, LockstepCommander, NetworkCommand, SwitchTeamVote};
use skirmish_core::components::{Command, CommandResult, Field, UnitId};
use skirmish_core::config::{AiConfig, GameSettings};
use skirmish_core::console::{Console, MessageConsole};
use skirmish_core::factions::ControlType;
use skirmish_core::map::Map;
use skirmish_core::math::GridPos;
use skirmish_core::tech::{
    CommandClass, CommandType, CommandTypeId, Requirements, ResourceType, ResourceTypeId,
    TechTree, UnitType, UnitTypeId, UpgradeTypeId,
};
use skirmish_core::world::World;

/// Gold resource.
pub const GOLD: ResourceTypeId = 0;
/// Wood resource.
pub const WOOD: ResourceTypeId = 1;

/// Harvesting worker.
pub const WORKER: UnitTypeId = 0;
/// Fighter.
pub const SOLDIER: UnitTypeId = 1;
/// Producer building.
pub const CASTLE: UnitTypeId = 2;
/// Hidden cell-map unit.
pub const WALL: UnitTypeId = 3;
/// Unit with nothing but a move command.
pub const SCOUT: UnitTypeId = 4;

/// Worker stop.
pub const WORKER_STOP: CommandTypeId = 1;
/// Worker move.
pub const WORKER_MOVE: CommandTypeId = 2;
/// Worker attack.
pub const WORKER_ATTACK: CommandTypeId = 3;
/// Worker harvest (gold and wood).
pub const WORKER_HARVEST: CommandTypeId = 4;
/// Worker build.
pub const WORKER_BUILD: CommandTypeId = 5;
/// Soldier stop.
pub const SOLDIER_STOP: CommandTypeId = 10;
/// Soldier move.
pub const SOLDIER_MOVE: CommandTypeId = 11;
/// Soldier attack.
pub const SOLDIER_ATTACK: CommandTypeId = 12;
/// Castle produces a worker.
pub const CASTLE_PRODUCE_WORKER: CommandTypeId = 20;
/// Castle produces a soldier.
pub const CASTLE_PRODUCE_SOLDIER: CommandTypeId = 21;
/// Castle researches armor.
pub const CASTLE_RESEARCH_ARMOR: CommandTypeId = 22;
/// Scout move.
pub const SCOUT_MOVE: CommandTypeId = 30;

/// Armor upgrade.
pub const ARMOR: UpgradeTypeId = 0;

/// The standard tech tree used across tests.
#[must_use]
pub fn standard_tech() -> TechTree {
    TechTree {
        name: "skirmish".into(),
        resource_types: vec![
            ResourceType {
                id: GOLD,
                name: "gold".into(),
            },
            ResourceType {
                id: WOOD,
                name: "wood".into(),
            },
        ],
        unit_types: vec![
            UnitType {
                id: WORKER,
                name: "worker".into(),
                max_hp: 20,
                sight: 4,
                attack: 1,
                cost: vec![(GOLD, 50)],
                command_types: vec![
                    CommandType::new(WORKER_STOP, CommandClass::Stop, "stop"),
                    CommandType::new(WORKER_MOVE, CommandClass::Move, "move"),
                    CommandType::new(WORKER_ATTACK, CommandClass::Attack, "attack"),
                    CommandType::new(WORKER_HARVEST, CommandClass::Harvest, "harvest")
                        .harvesting(&[GOLD, WOOD]),
                    CommandType::new(WORKER_BUILD, CommandClass::Build, "build")
                        .producing(CASTLE),
                ],
                hidden: false,
                requirements: Requirements::default(),
            },
            UnitType {
                id: SOLDIER,
                name: "soldier".into(),
                max_hp: 40,
                sight: 5,
                attack: 4,
                cost: vec![(GOLD, 80)],
                command_types: vec![
                    CommandType::new(SOLDIER_STOP, CommandClass::Stop, "stop"),
                    CommandType::new(SOLDIER_MOVE, CommandClass::Move, "move"),
                    CommandType::new(SOLDIER_ATTACK, CommandClass::Attack, "attack"),
                ],
                hidden: false,
                requirements: Requirements {
                    units: vec![CASTLE],
                    upgrades: Vec::new(),
                },
            },
            UnitType {
                id: CASTLE,
                name: "castle".into(),
                max_hp: 200,
                sight: 6,
                attack: 0,
                cost: vec![(GOLD, 400), (WOOD, 200)],
                command_types: vec![
                    CommandType::new(CASTLE_PRODUCE_WORKER, CommandClass::Produce, "worker")
                        .producing(WORKER),
                    CommandType::new(CASTLE_PRODUCE_SOLDIER, CommandClass::Produce, "soldier")
                        .producing(SOLDIER),
                    CommandType::new(CASTLE_RESEARCH_ARMOR, CommandClass::Upgrade, "armor")
                        .researching(ARMOR),
                ],
                hidden: false,
                requirements: Requirements::default(),
            },
            UnitType {
                id: WALL,
                name: "wall".into(),
                max_hp: 100,
                sight: 0,
                attack: 0,
                cost: Vec::new(),
                command_types: Vec::new(),
                hidden: true,
                requirements: Requirements::default(),
            },
            UnitType {
                id: SCOUT,
                name: "scout".into(),
                max_hp: 10,
                sight: 8,
                attack: 0,
                cost: vec![(GOLD, 30)],
                command_types: vec![CommandType::new(SCOUT_MOVE, CommandClass::Move, "move")],
                hidden: false,
                requirements: Requirements::default(),
            },
        ],
    }
}

/// Builder for small hand-placed worlds.
pub struct WorldBuilder {
    world: World,
}

impl WorldBuilder {
    /// Empty `width` x `height` map with the standard tech tree.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            world: World::new(standard_tech(), Map::new(width, height)),
        }
    }

    /// Add a start location and a faction on `team` living there.
    #[must_use]
    pub fn faction(mut self, team: usize, control: ControlType, home: GridPos) -> Self {
        let start = self.world.map_mut().add_start_location(home);
        let index = self.world.faction_count();
        self.world
            .add_faction(team, format!("faction{index}"), control, start);
        self
    }

    /// Give a faction a stockpile.
    ///
    /// # Panics
    /// Panics if the faction does not exist.
    #[must_use]
    pub fn stock(mut self, faction: usize, resource: ResourceTypeId, amount: i64) -> Self {
        self.world
            .faction_mut(faction)
            .expect("faction exists")
            .add_resource(resource, amount);
        self
    }

    /// Place a deposit.
    #[must_use]
    pub fn deposit(mut self, pos: GridPos, resource: ResourceTypeId, amount: i64) -> Self {
        self.world.map_mut().place_resource(pos, resource, amount);
        self
    }

    /// Spawn a land unit.
    ///
    /// # Panics
    /// Panics if the unit can't be placed.
    #[must_use]
    pub fn unit(mut self, faction: usize, unit_type: UnitTypeId, pos: GridPos) -> Self {
        self.world
            .spawn_unit(faction, unit_type, pos, Field::Land)
            .expect("unit placement");
        self
    }

    /// Finish, with visibility computed.
    #[must_use]
    pub fn build(mut self) -> World {
        self.world.refresh_visibility();
        self.world
    }
}

/// A two to four faction skirmish on a 32x32 map.
///
/// Every faction is a local CPU on its own team, starts in a corner with a
/// castle, two workers, a soldier, 200 gold and a gold and wood deposit
/// nearby.
///
/// # Panics
/// Panics unless `factions` is between 2 and 4.
#[must_use]
pub fn skirmish_world(factions: usize) -> World {
    assert!((2..=4).contains(&factions), "2 to 4 factions");
    let corners = [
        (GridPos::new(4, 4), 1),
        (GridPos::new(27, 27), -1),
        (GridPos::new(27, 4), -1),
        (GridPos::new(4, 27), 1),
    ];
    let mut builder = WorldBuilder::new(32, 32);
    for (index, (home, dir)) in corners.iter().take(factions).enumerate() {
        let (home, dir) = (*home, *dir);
        builder = builder
            .faction(index, ControlType::Cpu, home)
            .stock(index, GOLD, 200)
            .deposit(home + GridPos::new(3 * dir, 0), GOLD, 500)
            .deposit(home + GridPos::new(0, 3 * dir), WOOD, 500)
            .unit(index, CASTLE, home)
            .unit(index, WORKER, home + GridPos::new(dir, dir))
            .unit(index, WORKER, home + GridPos::new(-dir, dir))
            .unit(index, SOLDIER, home + GridPos::new(dir, -dir));
    }
    builder.build()
}

/// Config running AI ticks inline with logging off.
#[must_use]
pub fn inline_config() -> AiConfig {
    AiConfig::default().with_worker_threads(false)
}

/// Config with worker threads, short timeouts and logging off.
#[must_use]
pub fn threaded_config() -> AiConfig {
    AiConfig {
        worker_threads: true,
        barrier_timeout_ms: 2_000,
        tick_timeout_ms: 2_000,
        shutdown_timeout_ms: 1_000,
        ..AiConfig::default()
    }
}

/// Config logging at `level` into `dir`.
#[must_use]
pub fn logging_config(dir: &Path, level: u8) -> AiConfig {
    AiConfig {
        log_level: level,
        log_dir: dir.to_path_buf(),
        ..inline_config()
    }
}

/// Commander that records everything instead of applying it.
#[derive(Default)]
pub struct RecordingCommander {
    commands: Mutex<Vec<NetworkCommand>>,
    votes: Mutex<Vec<SwitchTeamVote>>,
}

impl RecordingCommander {
    /// Commands received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<NetworkCommand> {
        self.commands.lock().clone()
    }

    /// Votes received so far.
    #[must_use]
    pub fn votes(&self) -> Vec<SwitchTeamVote> {
        self.votes.lock().clone()
    }
}

impl Commander for RecordingCommander {
    fn try_give_command(
        &self,
        faction: usize,
        unit: UnitId,
        command: Command,
    ) -> (CommandResult, String) {
        self.commands.lock().push(NetworkCommand {
            faction,
            unit,
            command,
        });
        (CommandResult::Success, String::new())
    }

    fn try_switch_team_vote(&self, vote: SwitchTeamVote) {
        self.votes.lock().push(vote);
    }
}

/// Services for driving an AI interface directly in tests.
pub struct TestHarness {
    /// Shared world.
    pub world: Arc<RwLock<World>>,
    /// Console receiving redirected log lines.
    pub console: Arc<MessageConsole>,
    /// Commander the context routes CPU commands to.
    pub commander: Arc<dyn Commander>,
    /// Session settings.
    pub settings: Arc<GameSettings>,
}

impl TestHarness {
    /// Harness with a lockstep commander over `world`.
    #[must_use]
    pub fn new(world: World, settings: GameSettings) -> Self {
        let world = Arc::new(RwLock::new(world));
        let settings = Arc::new(settings);
        let commander = Arc::new(LockstepCommander::new(
            Arc::clone(&world),
            Arc::clone(&settings),
        ));
        Self {
            world,
            console: Arc::new(MessageConsole::default()),
            commander,
            settings,
        }
    }

    /// Harness whose commander is `commander`.
    #[must_use]
    pub fn with_commander(world: World, settings: GameSettings, commander: Arc<dyn Commander>) -> Self {
        Self {
            world: Arc::new(RwLock::new(world)),
            console: Arc::new(MessageConsole::default()),
            commander,
            settings: Arc::new(settings),
        }
    }

    /// Context for a new interface, without a barrier.
    #[must_use]
    pub fn context(&self) -> GameContext {
        GameContext {
            world: Arc::clone(&self.world),
            commander: Arc::clone(&self.commander),
            console: Arc::clone(&self.console) as Arc<dyn Console>,
            settings: Arc::clone(&self.settings),
            controller: None,
        }
    }
}
