#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the cruise-bridge workspace.
//!
//! This crate defines the value types that connect the surrounding control
//! loop, the arbiter, and the pure actuation systems. The loop supplies a
//! fresh read-only [`VehicleSnapshot`], [`SpeedConstraints`], and
//! [`ActuationEnvelope`] every cycle; the arbiter responds exclusively with
//! [`BusFrame`] batches for the outbound transport and one-shot
//! [`AlertSignal`] values for the driver-notification collaborator. Nothing
//! in here owns state: persistence lives behind the arbiter, and everything
//! below it is deterministic given these inputs.

use serde::{Deserialize, Serialize};

/// Speed-unit conversion factors shared by all crates in the workspace.
pub mod units {
    /// Kilometres per hour to metres per second.
    pub const KPH_TO_MS: f32 = 1.0 / 3.6;
    /// Metres per second to kilometres per hour.
    pub const MS_TO_KPH: f32 = 3.6;
    /// Miles per hour to metres per second.
    pub const MPH_TO_MS: f32 = 0.447_04;
    /// Metres per second to miles per hour.
    pub const MS_TO_MPH: f32 = 1.0 / MPH_TO_MS;

    /// Converts metres per second into cluster units (km/h on metric
    /// instrument clusters, mph otherwise).
    #[must_use]
    pub fn ms_to_clu(ms: f32, metric: bool) -> f32 {
        if metric {
            ms * MS_TO_KPH
        } else {
            ms * MS_TO_MPH
        }
    }

    /// Converts cluster units back into metres per second.
    #[must_use]
    pub fn clu_to_ms(clu: f32, metric: bool) -> f32 {
        if metric {
            clu * KPH_TO_MS
        } else {
            clu * MPH_TO_MS
        }
    }

    /// Converts kilometres per hour into whole cluster units, truncating the
    /// fractional remainder the way the instrument cluster does.
    #[must_use]
    pub fn kph_to_clu(kph: f32, metric: bool) -> f32 {
        if metric {
            kph.trunc()
        } else {
            (kph * KPH_TO_MS * MS_TO_MPH).trunc()
        }
    }
}

/// Steering-wheel cruise-stalk positions observable on the vehicle bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CruiseButton {
    /// Stalk at rest.
    None,
    /// Resume/accelerate detent.
    ResAccel,
    /// Set/decelerate detent.
    SetDecel,
    /// Following-gap adjust detent.
    GapDist,
    /// Cancel detent.
    Cancel,
}

impl CruiseButton {
    /// Numeric switch-state value carried in the stalk frame.
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::ResAccel => 1,
            Self::SetDecel => 2,
            Self::GapDist => 3,
            Self::Cancel => 4,
        }
    }

    /// Reports whether the stalk is deflected from rest.
    #[must_use]
    pub const fn is_pressed(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Default for CruiseButton {
    fn default() -> Self {
        Self::None
    }
}

/// One-shot driver notifications raised by the speed-fusion layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertSignal {
    /// The fused limit dropped below current speed; visual notice only.
    SlowingDown,
    /// First cycle of a slowdown episode; visual notice plus chime.
    SlowingDownWithSound,
}

/// Outbound vehicle-bus frame with a fixed eight-byte payload buffer.
///
/// Ownership transfers to the transport collaborator as soon as the cycle
/// that produced the frame returns; nothing in this workspace retains one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusFrame {
    id: u32,
    bus: u8,
    dlc: u8,
    payload: [u8; 8],
}

impl BusFrame {
    /// Creates a frame addressed to the provided bus identifier.
    #[must_use]
    pub const fn new(id: u32, bus: u8, dlc: u8, payload: [u8; 8]) -> Self {
        Self {
            id,
            bus,
            dlc,
            payload,
        }
    }

    /// Bus identifier of the frame.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Index of the physical bus the frame targets.
    #[must_use]
    pub const fn bus(&self) -> u8 {
        self.bus
    }

    /// Number of payload bytes that carry data.
    #[must_use]
    pub const fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Payload bytes up to the declared length.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload[..usize::from(self.dlc)]
    }

    /// Full eight-byte payload buffer, including unused trailing bytes.
    #[must_use]
    pub const fn raw(&self) -> [u8; 8] {
        self.payload
    }
}

/// Navigation speed-limit restriction supplied by the external limiter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavLimit {
    /// Enforced limit expressed in cluster units.
    pub limit_clu: f32,
    /// Remaining distance over which the limit applies, in metres.
    pub left_distance_m: f32,
    /// True on the first cycle the limiter engages this restriction.
    pub just_started: bool,
}

/// Per-cycle speed restrictions recomputed by external estimators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedConstraints {
    /// Curvature-limited safe speed in metres per second.
    /// `f32::INFINITY` when the road ahead imposes no restriction.
    pub curve_speed_ms: f32,
    /// Active navigation speed limit, if the limiter reports one.
    pub nav_limit: Option<NavLimit>,
}

impl Default for SpeedConstraints {
    fn default() -> Self {
        Self {
            curve_speed_ms: f32::INFINITY,
            nav_limit: None,
        }
    }
}

/// Read-only vehicle state decoded from the bus by an external collaborator.
///
/// The raw captures hold the most recent stock payload for each frame this
/// workspace re-emits; passthrough encoding starts from them so that fields
/// outside this core's responsibility keep their live values.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleSnapshot {
    /// Odometry speed in metres per second.
    pub v_ego_ms: f32,
    /// Instrument-cluster speed in metres per second.
    pub v_ego_cluster_ms: f32,
    /// Adaptive-cruise main switch is on.
    pub cruise_available: bool,
    /// Adaptive cruise is actively engaged.
    pub cruise_enabled: bool,
    /// Stock cruise set-speed in metres per second.
    pub cruise_set_speed_ms: f32,
    /// Stock cruise reports the vehicle held at standstill.
    pub cruise_standstill: bool,
    /// Driver-selected following-gap setting.
    pub gap_setting: u8,
    /// Brake pedal is depressed.
    pub brake_pressed: bool,
    /// Accelerator pedal is depressed.
    pub gas_pressed: bool,
    /// Latest cruise-stalk position observed on the bus.
    pub cruise_button: CruiseButton,
    /// Last stock steering-status payload.
    pub steering_status_raw: [u8; 8],
    /// Last stock cruise-status payload.
    pub cruise_status_raw: [u8; 8],
    /// Last stock acceleration-command payload.
    pub accel_command_raw: [u8; 8],
    /// Last stock jerk/comfort-band payload.
    pub comfort_band_raw: [u8; 8],
    /// Last stock accessory-options payload.
    pub accessory_raw: [u8; 8],
    /// Last stock cruise-stalk payload.
    pub button_raw: [u8; 8],
}

impl Default for VehicleSnapshot {
    fn default() -> Self {
        Self {
            v_ego_ms: 0.0,
            v_ego_cluster_ms: 0.0,
            cruise_available: false,
            cruise_enabled: false,
            cruise_set_speed_ms: 0.0,
            cruise_standstill: false,
            gap_setting: 4,
            brake_pressed: false,
            gas_pressed: false,
            cruise_button: CruiseButton::None,
            steering_status_raw: [0; 8],
            cruise_status_raw: [0; 8],
            accel_command_raw: [0; 8],
            comfort_band_raw: [0; 8],
            accessory_raw: [0; 8],
            button_raw: [0; 8],
        }
    }
}

/// Per-cycle actuation demand from the external longitudinal controller.
///
/// Only consumed in direct-actuation mode; not retained beyond the cycle
/// that supplies it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActuationEnvelope {
    /// Requested acceleration in metres per second squared.
    pub accel_mps2: f32,
    /// Upper jerk bound forwarded from the longitudinal planner.
    pub jerk_upper: f32,
    /// The controller is bringing the vehicle to a halt.
    pub stopping: bool,
    /// A lead vehicle is currently tracked.
    pub lead_visible: bool,
    /// The driver is overriding longitudinal control with the accelerator.
    pub long_override: bool,
    /// Set-speed to display on the cluster, in cluster units.
    pub set_speed_clu: f32,
}

impl Default for ActuationEnvelope {
    fn default() -> Self {
        Self {
            accel_mps2: 0.0,
            jerk_upper: 0.0,
            stopping: false,
            lead_visible: false,
            long_override: false,
            set_speed_clu: 0.0,
        }
    }
}

/// Actuation channel a vehicle variant exposes for longitudinal control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuationStrategy {
    /// The variant accepts acceleration commands directly.
    DirectAccel,
    /// The variant only accepts emulated cruise-stalk presses.
    ButtonSpam,
}

/// Closed per-vehicle configuration selected once at startup.
///
/// Every layout and checksum difference between supported variants is
/// captured here so the encoders stay free of scattered vehicle branching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Actuation channel used for the lifetime of the arbiter instance.
    pub strategy: ActuationStrategy,
    /// Physical bus index carrying the cruise frames.
    pub cruise_bus: u8,
    /// Rolling-counter modulus of the acceleration-command frame; the
    /// vehicle database specifies 15 for most variants and 16 for the rest.
    pub accel_counter_modulus: u8,
    /// The variant carries the extended jerk/comfort-band frame.
    pub has_comfort_band: bool,
    /// The variant keeps its cruise radar on a separate bus and needs the
    /// steering-status frame mirrored back with torque-interface flags
    /// rewritten.
    pub sync_steering_status: bool,
    /// Forward camera speed-limiter activity into the cruise-status frame.
    pub forward_camera_limiter: bool,
    /// The instrument cluster displays km/h rather than mph.
    pub metric_cluster: bool,
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self {
            strategy: ActuationStrategy::DirectAccel,
            cruise_bus: 0,
            accel_counter_modulus: 15,
            has_comfort_band: true,
            sync_steering_status: false,
            forward_camera_limiter: true,
            metric_cluster: true,
        }
    }
}
