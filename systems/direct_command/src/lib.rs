#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Direct longitudinal actuation: re-encodes the stock adaptive-cruise
//! frames each cycle with the arbiter's acceleration demand in place of
//! the radar's.

use cruise_bridge_core::{ActuationEnvelope, BusFrame, VehicleProfile, VehicleSnapshot};
use cruise_bridge_frames::{
    encode, EncodeError, FrameKind, RollingCounter, CRUISE_STATUS_COUNTER_MODULUS,
    STEERING_STATUS_COUNTER_MODULUS,
};

/// Bus carrying the mirrored steering-status frame on radar-separate variants.
pub const STEERING_SYNC_BUS: u8 = 2;

/// Above this speed a stop request keeps a softened upper comfort bound.
const STOPPING_EASE_SPEED_MS: f32 = 0.27;

/// Jerk/comfort value that signals no constraint from this layer.
const UNCONSTRAINED_BOUND: f64 = 50.0;

/// Per-cycle encoder for the direct-actuation frame set.
///
/// Owns the rolling counters of every frame it produces, so two instances
/// never share wire state.
#[derive(Clone, Debug)]
pub struct DirectCommand {
    profile: VehicleProfile,
    cruise_counter: RollingCounter,
    accel_counter: RollingCounter,
    steering_counter: RollingCounter,
}

impl DirectCommand {
    /// Creates an encoder with counters at zero.
    #[must_use]
    pub fn new(profile: VehicleProfile) -> Self {
        Self {
            profile,
            cruise_counter: RollingCounter::new(CRUISE_STATUS_COUNTER_MODULUS),
            accel_counter: RollingCounter::new(u16::from(profile.accel_counter_modulus)),
            steering_counter: RollingCounter::new(STEERING_STATUS_COUNTER_MODULUS),
        }
    }

    /// Encodes one cycle's frame set in bus order, appending to `out`.
    ///
    /// With `engaged` cleared the set-speed, acceleration and mode fields
    /// are zeroed while the frames keep flowing, which hands control back
    /// to the stock display without starving downstream consumers.
    /// Nothing is appended when any encode fails.
    pub fn handle(
        &mut self,
        snapshot: &VehicleSnapshot,
        envelope: &ActuationEnvelope,
        engaged: bool,
        camera_active: bool,
        out: &mut Vec<BusFrame>,
    ) -> Result<(), EncodeError> {
        let mut staged = Vec::with_capacity(4);
        staged.push(self.cruise_status_frame(snapshot, envelope, engaged, camera_active)?);
        staged.push(self.accel_command_frame(snapshot, envelope, engaged)?);
        if self.profile.has_comfort_band {
            staged.push(self.comfort_band_frame(snapshot, envelope, engaged)?);
        }
        if self.profile.sync_steering_status {
            staged.push(self.steering_sync_frame(snapshot)?);
        }
        out.append(&mut staged);
        Ok(())
    }

    /// Accessory-options frame sent once per activation, outside the
    /// periodic cycle. Pure passthrough of the last stock payload.
    pub fn activation_frame(&self, snapshot: &VehicleSnapshot) -> Result<BusFrame, EncodeError> {
        encode(
            FrameKind::AccessoryOptions,
            self.profile.cruise_bus,
            snapshot.accessory_raw,
            &[],
        )
    }

    fn cruise_status_frame(
        &mut self,
        snapshot: &VehicleSnapshot,
        envelope: &ActuationEnvelope,
        engaged: bool,
        camera_active: bool,
    ) -> Result<BusFrame, EncodeError> {
        let counter = f64::from(self.cruise_counter.value());
        self.cruise_counter.advance();
        let set_speed = if engaged {
            f64::from(envelope.set_speed_clu)
        } else {
            0.0
        };
        let mut fields = vec![
            ("main_mode", flag(snapshot.cruise_available)),
            ("tau_gap", f64::from(snapshot.gap_setting)),
            ("vset_dis", set_speed),
            ("alive_counter", counter),
            // the stock controller runs tighter gains when an object is flagged
            ("obj_valid", 1.0),
        ];
        if self.profile.forward_camera_limiter {
            let camera = if camera_active { 2.0 } else { 0.0 };
            fields.push(("camera_act", camera));
            fields.push(("camera_status", camera));
        }
        encode(
            FrameKind::CruiseStatus,
            self.profile.cruise_bus,
            snapshot.cruise_status_raw,
            &fields,
        )
    }

    fn accel_command_frame(
        &mut self,
        snapshot: &VehicleSnapshot,
        envelope: &ActuationEnvelope,
        engaged: bool,
    ) -> Result<BusFrame, EncodeError> {
        let counter = f64::from(self.accel_counter.value());
        self.accel_counter.advance();
        let accel = if engaged {
            f64::from(envelope.accel_mps2)
        } else {
            0.0
        };
        let mode = if engaged && envelope.long_override {
            2.0
        } else if engaged {
            1.0
        } else {
            0.0
        };
        encode(
            FrameKind::AccelCommand,
            self.profile.cruise_bus,
            snapshot.accel_command_raw,
            &[
                ("acc_mode", mode),
                ("stop_req", flag(engaged && envelope.stopping)),
                ("areq_raw", accel),
                ("areq_value", accel),
                ("alive_counter", counter),
            ],
        )
    }

    fn comfort_band_frame(
        &self,
        snapshot: &VehicleSnapshot,
        envelope: &ActuationEnvelope,
        engaged: bool,
    ) -> Result<BusFrame, EncodeError> {
        let mut fields: Vec<(&str, f64)> = Vec::new();
        if engaged {
            let mode = if snapshot.gas_pressed && envelope.accel_mps2 > -0.2 {
                2.0
            } else {
                1.0
            };
            // TODO: band obj_gap from lead distance once the planner exports range.
            let obj_gap = if envelope.lead_visible { 2.0 } else { 0.0 };
            fields.push(("acc_mode", mode));
            fields.push(("obj_gap", obj_gap));
            if envelope.stopping {
                fields.push(("jerk_upper_limit", 0.5));
                fields.push(("jerk_lower_limit", 10.0));
                let comfort_upper = if snapshot.v_ego_ms > STOPPING_EASE_SPEED_MS {
                    2.0
                } else {
                    0.0
                };
                fields.push(("comfort_band_upper", comfort_upper));
                fields.push(("comfort_band_lower", 0.0));
            } else {
                fields.push(("jerk_upper_limit", UNCONSTRAINED_BOUND));
                fields.push(("jerk_lower_limit", UNCONSTRAINED_BOUND));
                fields.push(("comfort_band_upper", UNCONSTRAINED_BOUND));
                fields.push(("comfort_band_lower", UNCONSTRAINED_BOUND));
            }
        }
        encode(
            FrameKind::ComfortBand,
            self.profile.cruise_bus,
            snapshot.comfort_band_raw,
            &fields,
        )
    }

    fn steering_sync_frame(&mut self, snapshot: &VehicleSnapshot) -> Result<BusFrame, EncodeError> {
        let counter = f64::from(self.steering_counter.value());
        self.steering_counter.advance();
        encode(
            FrameKind::SteeringStatus,
            STEERING_SYNC_BUS,
            snapshot.steering_status_raw,
            &[
                ("toi_active", 0.0),
                ("toi_unavail", 1.0),
                ("msg_count", counter),
            ],
        )
    }
}

fn flag(value: bool) -> f64 {
    f64::from(u8::from(value))
}
