use cruise_bridge_arbiter::{Arbiter, CycleReport};
use cruise_bridge_core::{
    units, ActuationEnvelope, ActuationStrategy, AlertSignal, BusFrame, NavLimit,
    SpeedConstraints, VehicleProfile, VehicleSnapshot,
};
use cruise_bridge_frames::{read_field, FrameKind};
use cruise_bridge_system_button_emulation::ButtonTiming;
use cruise_bridge_system_speed_fusion::FusionTuning;

const CRUISE_STATUS_ID: u32 = 0x420;
const ACCEL_COMMAND_ID: u32 = 0x421;
const COMFORT_BAND_ID: u32 = 0x389;
const ACCESSORY_ID: u32 = 0x50A;
const CRUISE_BUTTONS_ID: u32 = 0x4F1;

fn direct_arbiter(seed: u64) -> Arbiter {
    Arbiter::new(
        VehicleProfile::default(),
        FusionTuning::default(),
        ButtonTiming::default(),
        seed,
    )
}

fn button_arbiter(seed: u64) -> Arbiter {
    let profile = VehicleProfile {
        strategy: ActuationStrategy::ButtonSpam,
        ..VehicleProfile::default()
    };
    Arbiter::new(
        profile,
        FusionTuning::default(),
        ButtonTiming::default(),
        seed,
    )
}

fn highway_snapshot(speed_kph: f32, set_speed_kph: f32) -> VehicleSnapshot {
    VehicleSnapshot {
        v_ego_ms: speed_kph * units::KPH_TO_MS,
        v_ego_cluster_ms: speed_kph * units::KPH_TO_MS,
        cruise_available: true,
        cruise_enabled: true,
        cruise_set_speed_ms: set_speed_kph * units::KPH_TO_MS,
        ..VehicleSnapshot::default()
    }
}

fn nav_limited(limit_kph: f32) -> SpeedConstraints {
    SpeedConstraints {
        nav_limit: Some(NavLimit {
            limit_clu: limit_kph,
            left_distance_m: 400.0,
            just_started: false,
        }),
        ..SpeedConstraints::default()
    }
}

fn run_cycle(
    arbiter: &mut Arbiter,
    snapshot: &VehicleSnapshot,
    constraints: &SpeedConstraints,
    envelope: &ActuationEnvelope,
    requested_kph: f32,
) -> (Vec<BusFrame>, Vec<AlertSignal>, CycleReport) {
    let mut frames = Vec::new();
    let mut alerts = Vec::new();
    let report = arbiter
        .cycle(
            snapshot,
            constraints,
            envelope,
            requested_kph,
            &mut frames,
            &mut alerts,
        )
        .expect("cycle encodes");
    (frames, alerts, report)
}

#[test]
fn slowdown_scenario_chimes_once_and_trends_toward_the_limit() {
    let mut arbiter = direct_arbiter(1);
    let snapshot = highway_snapshot(100.0, 100.0);
    let constraints = nav_limited(80.0);
    let envelope = ActuationEnvelope {
        accel_mps2: -0.5,
        set_speed_clu: 100.0,
        ..ActuationEnvelope::default()
    };

    let mut chimes = 0;
    let mut silent_notices = 0;
    let mut last_report = None;
    for _ in 0..600 {
        let (frames, alerts, report) = run_cycle(&mut arbiter, &snapshot, &constraints, &envelope, 110.0);
        chimes += alerts
            .iter()
            .filter(|alert| **alert == AlertSignal::SlowingDownWithSound)
            .count();
        silent_notices += alerts
            .iter()
            .filter(|alert| **alert == AlertSignal::SlowingDown)
            .count();
        let status = frames
            .iter()
            .find(|frame| frame.id() == CRUISE_STATUS_ID)
            .expect("cruise status present");
        assert_eq!(
            read_field(FrameKind::CruiseStatus, &status.raw(), "camera_act").expect("readable"),
            2.0,
            "active navigation limit lights the camera indicator"
        );
        last_report = Some(report);
    }

    assert_eq!(chimes, 1, "the chime fires once per slowdown episode");
    assert!(silent_notices > 0, "visual notice persists while over limit");
    let report = last_report.expect("cycles ran");
    assert!(
        report.max_speed_clu >= 80.0 && report.max_speed_clu <= 81.0,
        "ceiling {} settles at the 80 km/h limit",
        report.max_speed_clu
    );
}

#[test]
fn lagging_set_speed_starts_an_accelerate_session_immediately() {
    let mut arbiter = button_arbiter(3);
    let snapshot = highway_snapshot(95.0, 95.0);

    let (frames, _, report) = run_cycle(
        &mut arbiter,
        &snapshot,
        &SpeedConstraints::default(),
        &ActuationEnvelope::default(),
        100.0,
    );

    assert_eq!(report.strategy, ActuationStrategy::ButtonSpam);
    assert!(report.engaged);
    assert_eq!(report.target_speed_clu, 100.0);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id(), CRUISE_BUTTONS_ID);
    let sw_state =
        read_field(FrameKind::CruiseButtons, &frames[0].raw(), "sw_state").expect("readable");
    assert_eq!(sw_state, 1.0, "resume/accelerate press");
}

#[test]
fn braking_mid_press_resets_and_holds_the_cooldown() {
    let mut arbiter = button_arbiter(7);
    let cruising = highway_snapshot(95.0, 95.0);
    let constraints = SpeedConstraints::default();
    let envelope = ActuationEnvelope::default();

    for _ in 0..3 {
        let (frames, _, _) = run_cycle(&mut arbiter, &cruising, &constraints, &envelope, 100.0);
        assert_eq!(frames.len(), 1, "press session under way");
    }

    let mut braking = cruising.clone();
    braking.brake_pressed = true;
    for _ in 0..5 {
        let (frames, _, report) = run_cycle(&mut arbiter, &braking, &constraints, &envelope, 100.0);
        assert!(frames.is_empty(), "no presses while braking");
        assert!(!report.engaged);
        assert_eq!(report.max_speed_clu, 0.0, "fusion state dropped");
    }

    // longest press (12) plus longest pause (16) must elapse first
    for cycle in 0..28 {
        let (frames, _, _) = run_cycle(&mut arbiter, &cruising, &constraints, &envelope, 100.0);
        assert!(frames.is_empty(), "cycle {cycle} falls inside the cooldown");
    }
    let (frames, _, _) = run_cycle(&mut arbiter, &cruising, &constraints, &envelope, 100.0);
    assert_eq!(frames.len(), 1, "presses resume after the cooldown");
}

#[test]
fn manual_stalk_input_suspends_the_emulated_session() {
    let mut arbiter = button_arbiter(11);
    let cruising = highway_snapshot(95.0, 95.0);
    let constraints = SpeedConstraints::default();
    let envelope = ActuationEnvelope::default();

    let (frames, _, _) = run_cycle(&mut arbiter, &cruising, &constraints, &envelope, 100.0);
    assert_eq!(frames.len(), 1);

    let mut driver_pressing = cruising.clone();
    driver_pressing.cruise_button = cruise_bridge_core::CruiseButton::GapDist;
    let (frames, _, report) = run_cycle(
        &mut arbiter,
        &driver_pressing,
        &constraints,
        &envelope,
        100.0,
    );
    assert!(frames.is_empty(), "driver owns the stalk");
    assert!(!report.engaged);
}

#[test]
fn the_two_strategies_never_share_frame_identifiers() {
    let snapshot = highway_snapshot(95.0, 95.0);
    let constraints = nav_limited(80.0);
    let envelope = ActuationEnvelope {
        set_speed_clu: 95.0,
        ..ActuationEnvelope::default()
    };

    let mut direct = direct_arbiter(5);
    let mut buttons = button_arbiter(5);
    let mut direct_ids = Vec::new();
    let mut button_ids = Vec::new();
    for _ in 0..50 {
        let (frames, _, _) = run_cycle(&mut direct, &snapshot, &constraints, &envelope, 100.0);
        direct_ids.extend(frames.iter().map(BusFrame::id));
        let (frames, _, _) = run_cycle(&mut buttons, &snapshot, &constraints, &envelope, 100.0);
        button_ids.extend(frames.iter().map(BusFrame::id));
    }

    assert!(button_ids.iter().all(|id| *id == CRUISE_BUTTONS_ID));
    assert!(direct_ids.iter().all(|id| {
        [
            CRUISE_STATUS_ID,
            ACCEL_COMMAND_ID,
            COMFORT_BAND_ID,
            ACCESSORY_ID,
        ]
        .contains(id)
    }));
    assert!(
        !direct_ids.iter().any(|id| button_ids.contains(id)),
        "strategies never mix on the wire"
    );
}

#[test]
fn accessory_frame_goes_out_once_per_activation() {
    let mut arbiter = direct_arbiter(9);
    let engaged = highway_snapshot(80.0, 80.0);
    let mut disengaged = engaged.clone();
    disengaged.cruise_enabled = false;
    let constraints = SpeedConstraints::default();
    let envelope = ActuationEnvelope {
        set_speed_clu: 80.0,
        ..ActuationEnvelope::default()
    };

    let mut accessory_frames = 0;
    for _ in 0..10 {
        let (frames, _, _) = run_cycle(&mut arbiter, &engaged, &constraints, &envelope, 90.0);
        accessory_frames += frames.iter().filter(|f| f.id() == ACCESSORY_ID).count();
    }
    assert_eq!(accessory_frames, 1, "activation frame is not periodic");

    for _ in 0..3 {
        let (frames, _, report) = run_cycle(&mut arbiter, &disengaged, &constraints, &envelope, 90.0);
        assert!(!report.engaged);
        assert_eq!(
            frames.len(),
            3,
            "periodic frames keep flowing while disengaged"
        );
        assert!(frames.iter().all(|f| f.id() != ACCESSORY_ID));
    }

    let (frames, _, _) = run_cycle(&mut arbiter, &engaged, &constraints, &envelope, 90.0);
    assert_eq!(
        frames.iter().filter(|f| f.id() == ACCESSORY_ID).count(),
        1,
        "re-activation announces the accessory state again"
    );
}

#[test]
fn disengaged_direct_cycles_zero_the_displayed_set_speed() {
    let mut arbiter = direct_arbiter(13);
    let mut snapshot = highway_snapshot(80.0, 80.0);
    snapshot.brake_pressed = true;
    let envelope = ActuationEnvelope {
        accel_mps2: -1.0,
        set_speed_clu: 80.0,
        ..ActuationEnvelope::default()
    };

    let (frames, _, report) = run_cycle(
        &mut arbiter,
        &snapshot,
        &SpeedConstraints::default(),
        &envelope,
        90.0,
    );
    assert!(!report.engaged);
    let status = frames
        .iter()
        .find(|frame| frame.id() == CRUISE_STATUS_ID)
        .expect("cruise status present");
    assert_eq!(
        read_field(FrameKind::CruiseStatus, &status.raw(), "vset_dis").expect("readable"),
        0.0
    );
    let accel = frames
        .iter()
        .find(|frame| frame.id() == ACCEL_COMMAND_ID)
        .expect("accel command present");
    assert_eq!(
        read_field(FrameKind::AccelCommand, &accel.raw(), "acc_mode").expect("readable"),
        0.0
    );
}

#[test]
fn accelerator_sync_surfaces_a_requested_speed_override() {
    let mut arbiter = button_arbiter(17);
    let mut snapshot = highway_snapshot(104.4, 95.0);
    snapshot.gas_pressed = true;

    let (_, _, report) = run_cycle(
        &mut arbiter,
        &snapshot,
        &SpeedConstraints::default(),
        &ActuationEnvelope::default(),
        95.0,
    );

    let override_kph = report
        .requested_override_kph
        .expect("accelerator sync raises the request");
    assert!(
        (override_kph - 107.4).abs() < 0.2,
        "override {override_kph} tracks cluster speed plus margin"
    );
}
