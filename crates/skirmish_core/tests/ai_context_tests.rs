//! Query and command tests for the AI context.
//!
//! Each test builds a small world, wraps one faction in an inline
//! [`AiInterface`] and talks to the game the way a brain would.

use std::sync::Arc;

use skirmish_core::ai::{AiInterface, AiOrder, CommandSpec, IdleBrain, OrderTarget, UnitRef};
use skirmish_core::commander::{Commander, SwitchTeamVote};
use skirmish_core::components::{CommandResult, Field};
use skirmish_core::config::{AiConfig, GameSettings};
use skirmish_core::error::GameError;
use skirmish_core::factions::ControlType;
use skirmish_core::math::GridPos;
use skirmish_core::tech::CommandClass;
use skirmish_test_utils::fixtures::{
    inline_config, logging_config, skirmish_world, RecordingCommander, TestHarness, WorldBuilder,
    CASTLE, CASTLE_RESEARCH_ARMOR, GOLD, SCOUT, SOLDIER, SOLDIER_MOVE, WALL, WOOD, WORKER,
    WORKER_BUILD, WORKER_MOVE,
};

fn interface(harness: &TestHarness, faction: usize, config: AiConfig) -> AiInterface {
    AiInterface::new(harness.context(), faction, config, Box::new(IdleBrain))
        .expect("interface for an existing faction")
}

/// Faction 0 (CPU, team 0) holds a castle at (4, 4); faction 1 (human,
/// team 1) stands `enemies` soldiers in view of it.
fn raid_world(enemies: usize) -> TestHarness {
    let spots = [(7, 3), (7, 4), (7, 5), (8, 3), (8, 4), (8, 5), (6, 6)];
    let mut builder = WorldBuilder::new(32, 32)
        .faction(0, ControlType::Cpu, GridPos::new(4, 4))
        .faction(1, ControlType::Human, GridPos::new(27, 27))
        .unit(0, CASTLE, GridPos::new(4, 4));
    for &(x, y) in spots.iter().take(enemies) {
        builder = builder.unit(1, SOLDIER, GridPos::new(x, y));
    }
    TestHarness::new(builder.build(), GameSettings::default())
}

// =============================================================================
// Identity and map queries
// =============================================================================

#[test]
fn test_basic_queries_reflect_the_world() {
    let harness = TestHarness::new(skirmish_world(3), GameSettings::default());
    let ai = interface(&harness, 2, inline_config());
    ai.with_context(|ctx| {
        assert_eq!(ctx.faction_index(), 2);
        assert_eq!(ctx.team_index(), 2);
        assert_eq!(ctx.faction_count(), 3);
        assert_eq!(ctx.map_max_players(), 3);
        assert_eq!(ctx.map_size(), (32, 32));
        assert_eq!(ctx.home_location(), Some(GridPos::new(27, 4)));
        assert_eq!(ctx.start_location(0), Some(GridPos::new(4, 4)));
        assert_eq!(ctx.control_type(), Some(ControlType::Cpu));
        assert_eq!(ctx.my_unit_count(), 4);
        assert_eq!(ctx.resource_amount(GOLD), 200);
        assert_eq!(ctx.resource_amount(WOOD), 0);
        assert!(ctx.check_costs(WORKER));
        assert!(!ctx.check_costs(CASTLE));
        assert!(ctx.faction_uses_resource_type(WOOD));
        assert_eq!(ctx.unit_type(SCOUT).map(|ut| ut.name), Some("scout".to_string()));
    });
}

#[test]
fn test_requirements_and_upgrades() {
    let harness = raid_world(0);
    let ai = interface(&harness, 0, inline_config());
    let result = ai.with_context(|ctx| {
        assert_eq!(ctx.my_upgrade_count(), 0);
        assert!(ctx.reqs_ok(CASTLE_RESEARCH_ARMOR));
        assert!(!ctx.reqs_ok(999));
        assert!(ctx.unit_type_reqs_ok(SOLDIER));
        ctx.issue_command(AiOrder::new(
            UnitRef::Index(0),
            CommandSpec::Type(CASTLE_RESEARCH_ARMOR),
            OrderTarget::None,
        ))
    });
    assert_eq!(result.unwrap().0, CommandResult::Success);
    harness.world.write().update();
    ai.with_context(|ctx| assert_eq!(ctx.my_upgrade_count(), 1));

    // No castle on faction 1's side.
    let other = interface(&harness, 1, inline_config());
    other.with_context(|ctx| {
        assert!(!ctx.unit_type_reqs_ok(SOLDIER));
        assert!(ctx.unit_type_reqs_ok(WORKER));
        assert_eq!(ctx.my_upgrade_count(), 0);
    });
}

#[test]
fn test_my_unit_out_of_range_is_unit_not_found() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    ai.with_context(|ctx| {
        let castle = ctx.my_unit(0).unwrap();
        assert_eq!(castle.unit_type, CASTLE);
        assert!(ctx.is_ally(&castle));
        assert!(matches!(
            ctx.my_unit(4),
            Err(GameError::UnitNotFound { faction: 0, .. })
        ));
    });
}

#[test]
fn test_free_cells_sees_units() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    ai.with_context(|ctx| {
        assert!(!ctx.is_free_cells(GridPos::new(4, 4), 1, Field::Land));
        assert!(ctx.is_free_cells(GridPos::new(12, 12), 3, Field::Land));
        assert!(ctx.is_free_cells(GridPos::new(4, 4), 1, Field::Air));
    });
}

// =============================================================================
// Resource queries
// =============================================================================

#[test]
fn test_region_scan_finds_deposit_within_range() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    ai.with_context(|ctx| {
        let home = GridPos::new(4, 4);
        assert_eq!(
            ctx.is_resource_in_region(home, WOOD, 3),
            Some(GridPos::new(4, 7))
        );
        assert_eq!(ctx.is_resource_in_region(home, WOOD, 2), None);
        assert_eq!(
            ctx.is_resource_near(GridPos::new(6, 5), GOLD, false),
            Some(GridPos::new(7, 4))
        );
        assert_eq!(ctx.is_resource_near(home, GOLD, false), None);
    });
}

#[test]
fn test_nearest_sighted_resource_ignores_unexplored_deposits() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    ai.with_context(|ctx| {
        // Faction 1's gold at (24, 27) is closer to (20, 20) but unexplored.
        assert_eq!(
            ctx.nearest_sighted_resource(GOLD, GridPos::new(20, 20), false),
            Some(GridPos::new(7, 4))
        );
    });
}

#[test]
fn test_nearest_usable_resource_needs_a_harvester() {
    let world = WorldBuilder::new(16, 16)
        .faction(0, ControlType::Cpu, GridPos::new(3, 3))
        .deposit(GridPos::new(6, 3), GOLD, 100)
        .unit(0, CASTLE, GridPos::new(3, 3))
        .build();
    let harness = TestHarness::new(world, GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    ai.with_context(|ctx| {
        assert_eq!(
            ctx.nearest_sighted_resource(GOLD, GridPos::new(3, 3), false),
            Some(GridPos::new(6, 3))
        );
        assert_eq!(ctx.nearest_sighted_resource(GOLD, GridPos::new(3, 3), true), None);
        assert!(!ctx.can_use_resource_type(GOLD));
    });
}

#[test]
fn test_harvest_cache_avoids_rescans() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());

    for _ in 0..5 {
        assert!(ai.with_context(|ctx| ctx.can_use_resource_type(GOLD)));
    }
    let cache = ai.harvest_cache();
    assert_eq!(cache.scans(), 1);
    let harvester = cache.get(GOLD).expect("first worker cached");

    // The cached worker dies; the next query rescans and finds the other.
    harness.world.write().remove_unit(harvester);
    assert!(ai.with_context(|ctx| ctx.can_use_resource_type(GOLD)));
    let cache = ai.harvest_cache();
    assert_eq!(cache.scans(), 2);
    assert_ne!(cache.get(GOLD), Some(harvester));
}

// =============================================================================
// Threat queries
// =============================================================================

#[test]
fn test_six_enemies_raise_one_warning() {
    let harness = raid_world(6);
    let ai = interface(&harness, 0, inline_config());

    let first = ai.with_context(|ctx| ctx.first_sighted_enemy(10)).unwrap();
    assert_eq!(first.faction, 1);
    assert_eq!(first.pos, GridPos::new(7, 3));
    assert_eq!(ai.enemy_warning_positions(), vec![GridPos::new(7, 3)]);

    // Seeing the same group again does not duplicate the warning.
    ai.with_context(|ctx| ctx.first_sighted_enemy(10));
    assert_eq!(ai.enemy_warning_positions().len(), 1);

    ai.with_context(|ctx| {
        assert!(ctx.remove_enemy_warning_position(GridPos::new(7, 3)));
        assert!(!ctx.remove_enemy_warning_position(GridPos::new(7, 3)));
    });
    assert!(ai.enemy_warning_positions().is_empty());
}

#[test]
fn test_five_enemies_are_sighted_without_warning() {
    let harness = raid_world(5);
    let ai = interface(&harness, 0, inline_config());
    assert!(ai.with_context(|ctx| ctx.first_sighted_enemy(10)).is_some());
    assert!(ai.enemy_warning_positions().is_empty());
}

#[test]
fn test_hidden_and_distant_units_are_not_sighted() {
    let world = WorldBuilder::new(32, 32)
        .faction(0, ControlType::Cpu, GridPos::new(4, 4))
        .faction(1, ControlType::Human, GridPos::new(27, 27))
        .unit(0, CASTLE, GridPos::new(4, 4))
        .unit(1, WALL, GridPos::new(6, 4))
        .unit(1, SOLDIER, GridPos::new(27, 27))
        .build();
    let harness = TestHarness::new(world, GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    assert!(ai.with_context(|ctx| ctx.first_sighted_enemy(10)).is_none());
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn test_failed_resolution_leaves_world_untouched() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    let before = harness.world.read().state_hash();

    ai.with_context(|ctx| {
        let target = GridPos::new(10, 10);
        assert!(matches!(
            ctx.give_command_class(99, CommandClass::Move, target),
            Err(GameError::UnitNotFound { faction: 0, .. })
        ));
        // Index 0 is the castle, which can't move.
        assert!(matches!(
            ctx.give_command_class(0, CommandClass::Move, target),
            Err(GameError::CommandTypeUnsupported { faction: 0, .. })
        ));
        // Index 1 is a worker, which doesn't own the soldier's move.
        match ctx.give_command_at(1, SOLDIER_MOVE, target) {
            Err(GameError::Desync { world_dump, .. }) => assert!(!world_dump.is_empty()),
            other => panic!("expected Desync, got {other:?}"),
        }
        assert!(matches!(
            ctx.issue_command(AiOrder::new(
                UnitRef::Id(9_999),
                CommandSpec::Class(CommandClass::Stop),
                OrderTarget::None,
            )),
            Err(GameError::UnitNotFound { .. })
        ));
    });

    assert_eq!(harness.world.read().state_hash(), before);
}

#[test]
fn test_cpu_commands_go_through_the_commander() {
    let recorder = Arc::new(RecordingCommander::default());
    let harness = TestHarness::with_commander(
        skirmish_world(2),
        GameSettings::default(),
        Arc::clone(&recorder) as Arc<dyn Commander>,
    );
    let ai = interface(&harness, 0, inline_config());

    let result = ai.with_context(|ctx| {
        assert!(ctx.routes_through_commander());
        ctx.switch_team_vote(1, 0, true);
        ctx.issue_command(
            AiOrder::new(
                UnitRef::Index(1),
                CommandSpec::Class(CommandClass::Move),
                OrderTarget::Position(GridPos::new(10, 10)),
            )
            .in_group(7),
        )
    });
    assert_eq!(result.unwrap().0, CommandResult::Success);

    let commands = recorder.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].faction, 0);
    assert_eq!(commands[0].command.command_type, WORKER_MOVE);
    assert_eq!(commands[0].command.group_id, Some(7));
    assert_eq!(
        recorder.votes(),
        vec![SwitchTeamVote {
            faction: 0,
            requesting_faction: 1,
            team: 0,
            allow: true,
        }]
    );

    // Recorded, not applied.
    let world = harness.world.read();
    assert!(world.faction(0).unwrap().units().iter().all(|u| u.is_idle()));
}

#[test]
fn test_human_faction_commands_apply_directly() {
    let world = WorldBuilder::new(16, 16)
        .faction(0, ControlType::Human, GridPos::new(3, 3))
        .unit(0, WORKER, GridPos::new(3, 3))
        .build();
    let recorder = Arc::new(RecordingCommander::default());
    let harness = TestHarness::with_commander(
        world,
        GameSettings::default(),
        Arc::clone(&recorder) as Arc<dyn Commander>,
    );
    let ai = interface(&harness, 0, inline_config());

    let (result, _) = ai
        .with_context(|ctx| {
            assert!(!ctx.routes_through_commander());
            ctx.give_command_at(0, WORKER_MOVE, GridPos::new(8, 8))
        })
        .unwrap();
    assert_eq!(result, CommandResult::Success);
    assert!(recorder.commands().is_empty());

    let world = harness.world.read();
    let worker = world.faction(0).unwrap().unit(0).unwrap();
    assert_eq!(
        worker.current_command().map(|c| c.command_type),
        Some(WORKER_MOVE)
    );
}

#[test]
fn test_unaffordable_production_is_rejected_by_the_world() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 0, inline_config());
    let (result, message) = ai
        .with_context(|ctx| {
            ctx.give_build_command(1, WORKER_BUILD, GridPos::new(8, 8), CASTLE)
        })
        .unwrap();
    assert_eq!(result, CommandResult::FailResources);
    assert!(!message.is_empty());
}

// =============================================================================
// Logging
// =============================================================================

#[test]
fn test_log_file_gets_header_and_filtered_lines() {
    let dir = tempfile::tempdir().unwrap();
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let ai = interface(&harness, 1, logging_config(dir.path(), 3));

    ai.print_log(1, "scouting");
    ai.print_log(3, "details");
    ai.print_log(4, "too chatty");

    let text = std::fs::read_to_string(dir.path().join("ai1.log")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "AI log file for Tech [skirmish] Faction [faction1] #1"
    );
    assert_eq!(&lines[1..], &["(1) scouting", "(1) details"]);
    assert!(harness.console.lines().is_empty());
}

#[test]
fn test_redirected_log_lines_reach_the_console() {
    let dir = tempfile::tempdir().unwrap();
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let config = AiConfig {
        log_redirect: true,
        ..logging_config(dir.path(), 2)
    };
    let ai = interface(&harness, 0, config);
    ai.print_log(2, "hello");
    assert_eq!(harness.console.lines(), vec!["(0) hello".to_string()]);
}

#[test]
fn test_unwritable_log_dir_is_cannot_open_log() {
    let dir = tempfile::tempdir().unwrap();
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let config = logging_config(&dir.path().join("no").join("such").join("dir"), 1);
    match AiInterface::new(harness.context(), 0, config, Box::new(IdleBrain)) {
        Err(GameError::CannotOpenLog { path, .. }) => assert!(path.ends_with("ai0.log")),
        Err(other) => panic!("expected CannotOpenLog, got {other:?}"),
        Ok(_) => panic!("expected CannotOpenLog"),
    }
}

#[test]
fn test_missing_faction_is_rejected() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    assert!(matches!(
        AiInterface::new(harness.context(), 5, inline_config(), Box::new(IdleBrain)),
        Err(GameError::InvalidState(_))
    ));
}
