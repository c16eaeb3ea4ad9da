#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Arbitration façade: fuses the per-cycle speed constraints, then routes
//! actuation through exactly one strategy (direct acceleration commands or
//! emulated stalk presses) fixed for the lifetime of the instance.

use cruise_bridge_core::{
    units, ActuationEnvelope, ActuationStrategy, AlertSignal, BusFrame, SpeedConstraints,
    VehicleProfile, VehicleSnapshot,
};
use cruise_bridge_frames::EncodeError;
use cruise_bridge_system_button_emulation::{ButtonEmulation, ButtonTiming};
use cruise_bridge_system_direct_command::DirectCommand;
use cruise_bridge_system_speed_fusion::{FusionTuning, SpeedFusion};
use tracing::{debug, info};

/// Stock set-speeds outside this open interval mark the cruise state as
/// not actually holding a speed, in cluster units.
const SET_SPEED_WINDOW_CLU: (f32, f32) = (1.0, 255.0);

/// Per-cycle summary handed back to the control loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    /// Strategy that produced this cycle's frames.
    pub strategy: ActuationStrategy,
    /// Arbitration preconditions held and actuation was active.
    pub engaged: bool,
    /// Smoothed speed ceiling in cluster units, zero when reset.
    pub max_speed_clu: f32,
    /// Clipped target speed in cluster units, zero when reset.
    pub target_speed_clu: f32,
    /// New requested cruise speed in km/h after an accelerator sync.
    pub requested_override_kph: Option<f32>,
}

enum Strategy {
    Direct(DirectCommand),
    Buttons(ButtonEmulation),
}

/// Single-threaded arbiter driven once per control-loop tick.
///
/// Owns every piece of persisted actuation state: the fusion filter, the
/// press session or frame counters, and the accessory-frame latch. Nothing
/// here blocks; a cycle consumes the caller's snapshot and appends frames
/// and alerts to caller-owned queues.
pub struct Arbiter {
    profile: VehicleProfile,
    fusion: SpeedFusion,
    strategy: Strategy,
    accessory_sent: bool,
    preconditions_were_ok: bool,
    cycle_index: u64,
}

impl Arbiter {
    /// Creates an arbiter for one vehicle, selecting the actuation strategy
    /// from the profile once and for all.
    ///
    /// The profile's cluster-unit choice overrides `tuning.metric_cluster`
    /// so the fusion filter and the encoders can never disagree. `seed`
    /// feeds the press-duration pools in stalk-press mode.
    #[must_use]
    pub fn new(
        profile: VehicleProfile,
        mut tuning: FusionTuning,
        timing: ButtonTiming,
        seed: u64,
    ) -> Self {
        tuning.metric_cluster = profile.metric_cluster;
        let strategy = match profile.strategy {
            ActuationStrategy::DirectAccel => Strategy::Direct(DirectCommand::new(profile)),
            ActuationStrategy::ButtonSpam => {
                Strategy::Buttons(ButtonEmulation::new(timing, profile.metric_cluster, seed))
            }
        };
        Self {
            profile,
            fusion: SpeedFusion::new(tuning),
            strategy,
            accessory_sent: false,
            preconditions_were_ok: false,
            cycle_index: 0,
        }
    }

    /// Strategy this instance was fixed to at construction.
    #[must_use]
    pub const fn strategy(&self) -> ActuationStrategy {
        self.profile.strategy
    }

    /// Number of cycles run so far.
    #[must_use]
    pub const fn cycle_index(&self) -> u64 {
        self.cycle_index
    }

    /// Runs one arbitration cycle.
    ///
    /// Appends this cycle's frames to `out_frames` and any driver
    /// notifications to `out_alerts`. A failed encode is a contract
    /// violation: the error surfaces to the caller, which must stop
    /// draining frames onto the bus rather than retry.
    pub fn cycle(
        &mut self,
        snapshot: &VehicleSnapshot,
        constraints: &SpeedConstraints,
        envelope: &ActuationEnvelope,
        requested_kph: f32,
        out_frames: &mut Vec<BusFrame>,
        out_alerts: &mut Vec<AlertSignal>,
    ) -> Result<CycleReport, EncodeError> {
        self.cycle_index = self.cycle_index.wrapping_add(1);
        let base_ok = snapshot.cruise_enabled && !snapshot.brake_pressed;

        let report = match &mut self.strategy {
            Strategy::Buttons(buttons) => {
                let set_clu =
                    units::ms_to_clu(snapshot.cruise_set_speed_ms, self.profile.metric_cluster)
                        .round();
                let ok = base_ok
                    && !snapshot.cruise_standstill
                    && !snapshot.cruise_button.is_pressed()
                    && set_clu > SET_SPEED_WINDOW_CLU.0
                    && set_clu < SET_SPEED_WINDOW_CLU.1;
                if ok {
                    let update = self.fusion.update(snapshot, constraints, requested_kph);
                    let pressed = buttons.handle(
                        snapshot,
                        update.target_speed_clu,
                        self.fusion.min_set_speed_clu(),
                        self.profile.cruise_bus,
                        out_frames,
                    )?;
                    if let Some(button) = pressed {
                        debug!(?button, "stalk press issued");
                    }
                    self.preconditions_were_ok = true;
                    CycleReport {
                        strategy: ActuationStrategy::ButtonSpam,
                        engaged: true,
                        max_speed_clu: update.max_speed_clu,
                        target_speed_clu: update.target_speed_clu,
                        requested_override_kph: update.requested_override_kph,
                    }
                } else {
                    if self.preconditions_were_ok {
                        info!("stalk-press preconditions lost, session reset with cooldown");
                    }
                    self.preconditions_were_ok = false;
                    self.fusion.reset();
                    buttons.reset(true);
                    CycleReport {
                        strategy: ActuationStrategy::ButtonSpam,
                        engaged: false,
                        max_speed_clu: 0.0,
                        target_speed_clu: 0.0,
                        requested_override_kph: None,
                    }
                }
            }
            Strategy::Direct(direct) => {
                let engaged = base_ok;
                let (update_max, update_target, override_kph, camera_active) = if engaged {
                    let update = self.fusion.update(snapshot, constraints, requested_kph);
                    (
                        update.max_speed_clu,
                        update.target_speed_clu,
                        update.requested_override_kph,
                        update.camera_active,
                    )
                } else {
                    if self.preconditions_were_ok {
                        info!("direct actuation disengaged, fusion reset");
                    }
                    self.fusion.reset();
                    (0.0, 0.0, None, false)
                };
                self.preconditions_were_ok = engaged;
                direct.handle(snapshot, envelope, engaged, camera_active, out_frames)?;
                if engaged && !self.accessory_sent {
                    out_frames.push(direct.activation_frame(snapshot)?);
                    self.accessory_sent = true;
                } else if !engaged {
                    self.accessory_sent = false;
                }
                CycleReport {
                    strategy: ActuationStrategy::DirectAccel,
                    engaged,
                    max_speed_clu: update_max,
                    target_speed_clu: update_target,
                    requested_override_kph: override_kph,
                }
            }
        };

        self.fusion.drain_alerts(snapshot.cruise_enabled, out_alerts);
        debug!(
            cycle = self.cycle_index,
            engaged = report.engaged,
            max_speed_clu = report.max_speed_clu,
            target_speed_clu = report.target_speed_clu,
            jerk_upper = envelope.jerk_upper,
            "cycle arbitrated"
        );
        Ok(report)
    }
}
