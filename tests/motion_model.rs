//! Integration tests for the motion model
//!
//! These drive `MotionModel` through a recording mock transport and check
//! the position bookkeeping against the command stream that was emitted.

use drivester::adapters::{MockAdapter, MockHandle};
use drivester::channel::CommandChannel;
use drivester::command::{Direction, SpeedUnit};
use drivester::config::MotorSettings;
use drivester::motion::{DriveMode, MotionModel, MotorConfig, MotorPreset};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn recorded_model() -> (MotionModel, MockHandle) {
    let adapter = MockAdapter::new();
    let handle = adapter.handle();
    (MotionModel::new(CommandChannel::with_sink(adapter)), handle)
}

fn emitted_steps(handle: &MockHandle) -> i64 {
    handle
        .commands()
        .iter()
        .filter_map(|line| line.strip_prefix("STEP "))
        .map(|n| n.parse::<i64>().unwrap())
        .sum()
}

fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

// =============================================================================
// Counter bookkeeping
// =============================================================================

#[test]
fn test_counter_equals_sum_of_emitted_steps() {
    let (mut model, handle) = recorded_model();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..500 {
        match rng.gen_range(0..8) {
            0 => model.step(rng.gen_range(-200..200)).unwrap(),
            1 => {
                model.move_to_angle(rng.gen_range(-360.0..360.0)).unwrap();
            }
            2 => {
                model.move_relative(rng.gen_range(-360.0..360.0)).unwrap();
            }
            3 => model.calibrate_zero().unwrap(),
            4 => model.toggle().unwrap(),
            5 => model.set_speed(rng.gen_range(0.0..300.0), SpeedUnit::Rpm).unwrap(),
            6 => model.set_direction(Direction::CounterClockwise).unwrap(),
            _ => model.set_decay(rng.gen_range(0..100)).unwrap(),
        }
        assert_eq!(model.state().current_step_count, emitted_steps(&handle));
    }
}

#[test]
fn test_angle_always_in_range() {
    let (mut model, _handle) = recorded_model();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..300 {
        model.move_relative(rng.gen_range(-360.0..360.0)).unwrap();
        if rng.gen_bool(0.2) {
            model.calibrate_zero().unwrap();
        }
        let angle = model.get_angle_degrees();
        assert!((0.0..360.0).contains(&angle), "angle {} out of range", angle);
    }
}

#[test]
fn test_move_to_angle_lands_within_one_step() {
    let (mut model, _handle) = recorded_model();
    model.set_microstepping(8).unwrap();
    let resolution = 360.0 / model.effective_steps() as f64;
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..200 {
        let target = rng.gen_range(-360.0..360.0);
        model.move_to_angle(target).unwrap();
        let reached = model.get_angle_degrees();
        assert!(
            angular_distance(reached, target) <= resolution / 2.0 + 1e-9,
            "target {} reached {}",
            target,
            reached
        );
    }
}

// =============================================================================
// Calibration and homing
// =============================================================================

#[test]
fn test_calibrate_zero_reads_zero() {
    let (mut model, handle) = recorded_model();
    model.step(137).unwrap();
    model.calibrate_zero().unwrap();

    assert_eq!(model.get_angle_degrees(), 0.0);
    assert_eq!(model.state().current_step_count, 137);
    assert_eq!(model.state().calibration_offset_steps, -137);
    assert_eq!(handle.commands(), vec!["STEP 137", "CALIBRATE_ZERO"]);
}

#[test]
fn test_move_after_calibration_uses_new_zero() {
    let (mut model, handle) = recorded_model();
    model.step(30).unwrap();
    model.calibrate_zero().unwrap();

    let delta = model.move_to_angle(90.0).unwrap();
    assert_eq!(delta, 50);
    assert_eq!(model.state().current_step_count, 80);
    assert!((model.get_angle_degrees() - 90.0).abs() < 1e-9);
    assert_eq!(handle.commands().last().unwrap(), "STEP 50");
}

#[test]
fn test_home_resets_both_counters() {
    let (mut model, handle) = recorded_model();
    model.step(75).unwrap();
    model.calibrate_zero().unwrap();
    model.home().unwrap();

    assert_eq!(model.state().current_step_count, 0);
    assert_eq!(model.state().calibration_offset_steps, 0);
    assert_eq!(model.get_angle_degrees(), 0.0);
    assert_eq!(handle.commands().last().unwrap(), "HOME");
}

#[test]
fn test_calibrate_after_home_starts_from_clean_zero() {
    let (mut model, handle) = recorded_model();
    model.step(75).unwrap();
    model.calibrate_zero().unwrap();
    model.home().unwrap();
    model.calibrate_zero().unwrap();

    assert_eq!(model.state().current_step_count, 0);
    assert_eq!(model.state().calibration_offset_steps, 0);
    assert_eq!(model.get_angle_degrees(), 0.0);
    assert_eq!(
        handle.commands(),
        vec!["STEP 75", "CALIBRATE_ZERO", "HOME", "CALIBRATE_ZERO"]
    );
}

#[test]
fn test_home_differs_from_calibrate_zero() {
    let (mut calibrated, _) = recorded_model();
    let (mut homed, _) = recorded_model();
    for model in [&mut calibrated, &mut homed] {
        model.step(40).unwrap();
    }
    calibrated.calibrate_zero().unwrap();
    homed.home().unwrap();

    calibrated.move_to_angle(0.0).unwrap();
    homed.move_to_angle(0.0).unwrap();

    assert_eq!(calibrated.state().current_step_count, 40);
    assert_eq!(homed.state().current_step_count, 0);
}

// =============================================================================
// Worked examples
// =============================================================================

#[test]
fn test_quarter_turn_full_step() {
    let (mut model, handle) = recorded_model();
    model.move_to_angle(90.0).unwrap();
    model.move_to_angle(0.0).unwrap();

    assert_eq!(handle.commands(), vec!["STEP 50", "STEP -50"]);
    assert_eq!(model.state().current_step_count, 0);
}

#[test]
fn test_quarter_turn_sixteenth_step() {
    let (mut model, handle) = recorded_model();
    model.set_microstepping(16).unwrap();
    assert_eq!(model.effective_steps(), 3200);

    model.move_to_angle(90.0).unwrap();
    assert_eq!(
        handle.commands(),
        vec!["SET_MICROSTEPPING 16", "STEP 800"]
    );
}

#[test]
fn test_relative_moves_accumulate() {
    let (mut model, handle) = recorded_model();
    model.move_relative(-45.0).unwrap();
    model.move_relative(-45.0).unwrap();

    assert_eq!(handle.commands(), vec!["STEP -25", "STEP -25"]);
    assert!((model.get_angle_degrees() - 270.0).abs() < 1e-9);
}

#[test]
fn test_half_steps_round_to_even() {
    let adapter = MockAdapter::new();
    let handle = adapter.handle();
    let config = MotorConfig::new(4, 1).unwrap();
    let mut model = MotionModel::with_config(CommandChannel::with_sink(adapter), config);

    assert_eq!(model.move_relative(45.0).unwrap(), 0);
    assert_eq!(model.move_relative(135.0).unwrap(), 2);
    assert_eq!(model.move_relative(225.0).unwrap(), 2);
    assert_eq!(model.move_relative(-45.0).unwrap(), 0);
    assert_eq!(
        handle.commands(),
        vec!["STEP 0", "STEP 2", "STEP 2", "STEP 0"]
    );
}

#[test]
fn test_zero_delta_still_emits_step() {
    let (mut model, handle) = recorded_model();
    model.move_to_angle(0.0).unwrap();
    assert_eq!(handle.commands(), vec!["STEP 0"]);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_setters_are_idempotent() {
    let (mut model, handle) = recorded_model();
    model.step(123).unwrap();

    model.set_microstepping(4).unwrap();
    let once = (*model.config(), *model.state(), model.get_angle_degrees());
    model.set_microstepping(4).unwrap();
    let twice = (*model.config(), *model.state(), model.get_angle_degrees());
    assert_eq!(once, twice);

    model.set_steps_per_revolution(400).unwrap();
    let once = (*model.config(), *model.state());
    model.set_steps_per_revolution(400).unwrap();
    assert_eq!(once, (*model.config(), *model.state()));

    let micro_commands = handle
        .commands()
        .iter()
        .filter(|c| c.starts_with("SET_MICROSTEPPING"))
        .count();
    assert_eq!(micro_commands, 2);
}

#[test]
fn test_geometry_change_reinterprets_counter() {
    let (mut model, _handle) = recorded_model();
    model.step(50).unwrap();
    assert!((model.get_angle_degrees() - 90.0).abs() < 1e-9);

    model.apply_preset(MotorPreset::Byj48).unwrap();
    assert_eq!(model.state().current_step_count, 50);
    assert!((model.get_angle_degrees() - 50.0 * 360.0 / 2048.0).abs() < 1e-9);
}

#[test]
fn test_largest_geometry_keeps_angle_in_range() {
    let (mut model, _handle) = recorded_model();
    model.set_steps_per_revolution(u32::MAX).unwrap();
    model.set_microstepping(u32::MAX).unwrap();
    assert_eq!(
        model.effective_steps(),
        u64::from(u32::MAX) * u64::from(u32::MAX)
    );

    model.step(-1).unwrap();
    let angle = model.get_angle_degrees();
    assert!((0.0..360.0).contains(&angle), "angle {} out of range", angle);

    model.calibrate_zero().unwrap();
    assert_eq!(model.get_angle_degrees(), 0.0);
    assert!(model.move_relative(-1e-3).unwrap() < 0);
    assert!((0.0..360.0).contains(&model.get_angle_degrees()));
    assert!(model.move_relative(720.0).is_err());
}

#[test]
fn test_zero_geometry_rejected_without_side_effects() {
    let (mut model, handle) = recorded_model();
    assert!(model.set_steps_per_revolution(0).is_err());
    assert!(model.set_microstepping(0).is_err());
    assert_eq!(model.config().steps_per_revolution(), 200);
    assert_eq!(model.config().microstepping(), 1);
    assert!(handle.is_empty());
}

#[test]
fn test_from_settings_pushes_startup_commands() {
    let adapter = MockAdapter::new();
    let handle = adapter.handle();
    let settings = MotorSettings {
        microstepping: 2,
        default_speed_rpm: 90.0,
        ..MotorSettings::default()
    };

    let model = MotionModel::from_settings(CommandChannel::with_sink(adapter), &settings).unwrap();
    assert_eq!(model.effective_steps(), 400);
    assert_eq!(
        handle.commands(),
        vec!["SET_SPEED 90 RPM", "SET_MICROSTEPPING 2"]
    );
}

// =============================================================================
// Execute dispatch and edge cases
// =============================================================================

#[test]
fn test_execute_dispatch() {
    let (mut model, handle) = recorded_model();
    model.execute(DriveMode::Spin).unwrap();
    model.execute(DriveMode::Step(12)).unwrap();
    model.execute(DriveMode::Spin).unwrap();

    assert_eq!(handle.commands(), vec!["START", "STEP 12", "STOP"]);
    assert!(!model.is_running());
    assert_eq!(model.state().current_step_count, 12);
}

#[test]
fn test_detached_model_still_tracks_position() {
    let channel = CommandChannel::detached();
    let mut model = MotionModel::new(channel.clone());

    model.move_to_angle(180.0).unwrap();
    model.start().unwrap();

    assert_eq!(model.state().current_step_count, 100);
    assert!(model.is_running());
    assert_eq!(channel.stats().mocked, 2);
}
