//! Built-in AI behaviour and threaded determinism.

use skirmish_core::ai::{AiInterface, BasicAi, BasicAiSettings};
use skirmish_core::config::GameSettings;
use skirmish_core::session::Session;
use skirmish_test_utils::determinism::{compare_inline_and_threaded, find_first_divergence};
use skirmish_test_utils::fixtures::{
    inline_config, skirmish_world, threaded_config, TestHarness, GOLD,
};

#[test]
fn test_basic_ai_grows_its_economy() {
    let mut session =
        Session::new(skirmish_world(2), GameSettings::default(), inline_config()).unwrap();
    let start = session.state_hash();
    session.run(150).unwrap();

    assert_ne!(session.state_hash(), start);
    let world = session.world().read();
    for faction in world.factions() {
        let ai = session.ai(faction.index).unwrap();
        assert_eq!(ai.tick_counter(), 150);
        assert!(
            faction.unit_count() > 4 || faction.resource(GOLD) != 200,
            "faction {} did nothing",
            faction.index
        );
    }
}

#[test]
fn test_basic_ai_thinks_on_its_interval() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let settings = BasicAiSettings {
        think_interval: 4,
        ..BasicAiSettings::default()
    };
    let ai = AiInterface::new(
        harness.context(),
        0,
        inline_config(),
        Box::new(BasicAi::new(settings)),
    )
    .unwrap();

    // Nothing happens until the first decision tick.
    let before = harness.world.read().state_hash();
    for _ in 0..3 {
        ai.update().unwrap();
    }
    assert_eq!(harness.world.read().state_hash(), before);

    ai.update().unwrap();
    let world = harness.world.read();
    assert!(world.faction(0).unwrap().units().iter().any(|u| !u.is_idle()));
}

#[test]
fn test_threaded_sessions_match_inline() {
    let result = compare_inline_and_threaded(
        || skirmish_world(4),
        &inline_config(),
        &threaded_config(),
        3,
        120,
    )
    .unwrap();
    result.assert_deterministic();
    assert_eq!(result.unique_hashes().len(), 1);
}

#[test]
fn test_no_frame_diverges() {
    assert_eq!(
        find_first_divergence(|| skirmish_world(3), &threaded_config(), 60).unwrap(),
        None
    );
}
