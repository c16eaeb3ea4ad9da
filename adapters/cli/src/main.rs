#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line harness: replays a synthetic slowdown-and-recover drive
//! against the actuation arbiter and prints the produced bus traffic.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use cruise_bridge_arbiter::Arbiter;
use cruise_bridge_core::{
    units, ActuationEnvelope, ActuationStrategy, AlertSignal, BusFrame, NavLimit,
    SpeedConstraints, VehicleProfile, VehicleSnapshot,
};
use cruise_bridge_frames::{read_field, FrameKind};
use cruise_bridge_system_button_emulation::ButtonTiming;
use cruise_bridge_system_speed_fusion::FusionTuning;

/// Simulated control-loop rate.
const CONTROL_RATE_HZ: f32 = 100.0;
/// How often a status line is printed.
const STATUS_EVERY_CYCLES: u32 = 50;
/// Identifier of the emulated stalk frame.
const STALK_FRAME_ID: u32 = 0x4F1;
/// Held press frames the simulated stock controller needs per set-speed step.
const PRESS_FRAMES_PER_STEP: u32 = 8;

/// Replays a synthetic drive against the longitudinal actuation arbiter.
#[derive(Parser, Debug)]
#[command(name = "cruise-bridge", version)]
struct Cli {
    /// Actuation strategy to exercise.
    #[arg(long, value_enum, default_value_t = StrategyArg::Direct)]
    strategy: StrategyArg,
    /// Seed for the press-duration pools.
    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,
    /// Control cycles to run, one hundred per simulated second.
    #[arg(long, default_value_t = 1200)]
    cycles: u32,
    /// Initial speed and stock set-speed in km/h.
    #[arg(long, default_value_t = 95.0)]
    speed_kph: f32,
    /// Driver-requested cruise speed in km/h.
    #[arg(long, default_value_t = 105.0)]
    requested_kph: f32,
    /// Navigation speed limit in km/h entering mid-drive.
    #[arg(long, default_value_t = 80.0)]
    limit_kph: f32,
    /// Drive a cluster that displays mph.
    #[arg(long)]
    imperial: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Re-encode the stock acceleration frames.
    Direct,
    /// Emulate cruise-stalk presses.
    Buttons,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let profile = VehicleProfile {
        strategy: match cli.strategy {
            StrategyArg::Direct => ActuationStrategy::DirectAccel,
            StrategyArg::Buttons => ActuationStrategy::ButtonSpam,
        },
        metric_cluster: !cli.imperial,
        ..VehicleProfile::default()
    };
    let mut arbiter = Arbiter::new(
        profile,
        FusionTuning::default(),
        ButtonTiming::default(),
        cli.seed,
    );

    println!(
        "cruise-bridge drive: strategy={:?} seed={:#x} cycles={} requested={:.0} km/h",
        arbiter.strategy(),
        cli.seed,
        cli.cycles,
        cli.requested_kph,
    );

    let mut plant = DrivePlant::new(cli.speed_kph, profile.metric_cluster);
    let limit_window = (cli.cycles / 3, 2 * cli.cycles / 3);
    let mut target_clu = units::kph_to_clu(cli.requested_kph, profile.metric_cluster);

    for cycle in 0..cli.cycles {
        if cycle == limit_window.0 {
            println!("-- navigation limit {:.0} km/h ahead --", cli.limit_kph);
        }
        if cycle == limit_window.1 {
            println!("-- navigation limit cleared --");
        }
        let limited = cycle >= limit_window.0 && cycle < limit_window.1;
        let constraints = if limited {
            SpeedConstraints {
                nav_limit: Some(NavLimit {
                    limit_clu: units::kph_to_clu(cli.limit_kph, profile.metric_cluster),
                    left_distance_m: 300.0,
                    just_started: cycle == limit_window.0,
                }),
                ..SpeedConstraints::default()
            }
        } else {
            SpeedConstraints::default()
        };

        let snapshot = plant.snapshot();
        let envelope = plant.envelope(target_clu);
        let mut frames = Vec::new();
        let mut alerts = Vec::new();
        let report = arbiter.cycle(
            &snapshot,
            &constraints,
            &envelope,
            cli.requested_kph,
            &mut frames,
            &mut alerts,
        )?;
        target_clu = report.target_speed_clu;

        let chase_clu = match cli.strategy {
            StrategyArg::Direct => report.target_speed_clu,
            StrategyArg::Buttons => plant.set_speed_clu(),
        };
        plant.advance(&frames, chase_clu)?;

        for alert in &alerts {
            println!("cycle {cycle:5}  alert: {}", describe_alert(*alert));
        }
        if cycle % STATUS_EVERY_CYCLES == 0 {
            println!(
                "cycle {cycle:5}  v={:6.1} clu  set={:5.1} clu  target={:5.1}  ceiling={:5.1}",
                plant.speed_clu(),
                plant.set_speed_clu(),
                report.target_speed_clu,
                report.max_speed_clu,
            );
            for frame in &frames {
                println!("             {}", format_frame(frame));
            }
        }
    }
    Ok(())
}

/// Crude vehicle stand-in: a first-order speed response plus a stock cruise
/// controller that steps its set-speed once per eight held press frames.
struct DrivePlant {
    metric: bool,
    speed_clu: f32,
    set_speed_clu: f32,
    held_frames: u32,
    accel_mps2: f32,
}

impl DrivePlant {
    fn new(speed_kph: f32, metric: bool) -> Self {
        let speed_clu = units::kph_to_clu(speed_kph, metric);
        Self {
            metric,
            speed_clu,
            set_speed_clu: speed_clu,
            held_frames: 0,
            accel_mps2: 0.0,
        }
    }

    fn speed_clu(&self) -> f32 {
        self.speed_clu
    }

    fn set_speed_clu(&self) -> f32 {
        self.set_speed_clu
    }

    fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            v_ego_ms: units::clu_to_ms(self.speed_clu, self.metric),
            v_ego_cluster_ms: units::clu_to_ms(self.speed_clu, self.metric),
            cruise_available: true,
            cruise_enabled: true,
            cruise_set_speed_ms: units::clu_to_ms(self.set_speed_clu, self.metric),
            ..VehicleSnapshot::default()
        }
    }

    fn envelope(&self, target_clu: f32) -> ActuationEnvelope {
        ActuationEnvelope {
            accel_mps2: self.accel_mps2,
            jerk_upper: 1.2,
            set_speed_clu: target_clu,
            ..ActuationEnvelope::default()
        }
    }

    fn advance(&mut self, frames: &[BusFrame], chase_clu: f32) -> Result<()> {
        for frame in frames {
            if frame.id() == STALK_FRAME_ID {
                let sw_state = read_field(FrameKind::CruiseButtons, &frame.raw(), "sw_state")?;
                self.apply_press(sw_state as u8);
            }
        }
        let error_ms = units::clu_to_ms(chase_clu - self.speed_clu, self.metric);
        self.accel_mps2 = (error_ms * 0.4).clamp(-3.5, 2.0);
        let next_ms =
            units::clu_to_ms(self.speed_clu, self.metric) + self.accel_mps2 / CONTROL_RATE_HZ;
        self.speed_clu = units::ms_to_clu(next_ms.max(0.0), self.metric);
        Ok(())
    }

    fn apply_press(&mut self, sw_state: u8) {
        let delta = match sw_state {
            1 => 1.0,
            2 => -1.0,
            _ => return,
        };
        self.held_frames += 1;
        if self.held_frames % PRESS_FRAMES_PER_STEP == 0 {
            self.set_speed_clu = (self.set_speed_clu + delta).clamp(30.0, 160.0);
        }
    }
}

fn format_frame(frame: &BusFrame) -> String {
    let bytes = frame
        .data()
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{:#05X} bus {}  {}", frame.id(), frame.bus(), bytes)
}

const fn describe_alert(alert: AlertSignal) -> &'static str {
    match alert {
        AlertSignal::SlowingDown => "slowing down",
        AlertSignal::SlowingDownWithSound => "slowing down (chime)",
    }
}
