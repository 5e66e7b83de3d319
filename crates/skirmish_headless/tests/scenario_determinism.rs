//! Built-in scenarios under the shared determinism harness.

use skirmish_headless::scenario::Scenario;
use skirmish_test_utils::determinism::{
    compare_inline_and_threaded, find_first_divergence, verify_save_determinism,
};
use skirmish_test_utils::fixtures::{inline_config, threaded_config};

fn ffa4() -> skirmish_core::world::World {
    Scenario::skirmish_ffa4()
        .build_world()
        .expect("built-in scenario builds")
}

#[test]
fn test_ffa4_threaded_matches_inline() {
    let result = compare_inline_and_threaded(ffa4, &inline_config(), &threaded_config(), 3, 60)
        .expect("sessions run");
    result.assert_deterministic();
}

#[test]
fn test_ffa4_never_diverges_frame_by_frame() {
    let divergence = find_first_divergence(ffa4, &threaded_config(), 40).expect("sessions run");
    assert_eq!(divergence, None);
}

#[test]
fn test_ffa4_survives_save_and_reload() {
    assert!(verify_save_determinism(ffa4, &threaded_config(), 25, 25).expect("sessions run"));
}

#[test]
fn test_scenario_file_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duel.ron");
    let text = ron::ser::to_string_pretty(&Scenario::skirmish_1v1(), Default::default()).unwrap();
    std::fs::write(&path, text).unwrap();

    let loaded = Scenario::resolve(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded, Scenario::skirmish_1v1());
}
