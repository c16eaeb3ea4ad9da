#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fuses driver-requested speed, curvature and navigation limits into one
//! smoothed cluster-unit ceiling per control cycle.

use cruise_bridge_core::{units, AlertSignal, SpeedConstraints, VehicleSnapshot};

/// Curvature estimates below this speed are treated as degraded input.
const MIN_CURVE_SPEED_MS: f32 = 32.0 * units::KPH_TO_MS;
/// Navigation limits below this many km/h lack confidence and are ignored.
const MIN_NAV_LIMIT_KPH: f32 = 10.0;

/// Tuning parameters of the fusion filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionTuning {
    /// Per-cycle low-pass gain applied to the fused ceiling.
    pub filter_gain: f32,
    /// Margin in cluster units added to current speed when syncing on gas.
    pub sync_margin_clu: f32,
    /// Lowest selectable cruise set-speed in km/h.
    pub min_set_speed_kph: f32,
    /// Highest selectable cruise set-speed in km/h.
    pub max_set_speed_kph: f32,
    /// Intersect the ceiling with the curvature-limited speed.
    pub slow_on_curves: bool,
    /// Raise the requested speed while the driver holds the accelerator.
    pub sync_on_gas: bool,
    /// The instrument cluster displays km/h rather than mph.
    pub metric_cluster: bool,
}

impl Default for FusionTuning {
    fn default() -> Self {
        Self {
            filter_gain: 0.01,
            sync_margin_clu: 3.0,
            min_set_speed_kph: 30.0,
            max_set_speed_kph: 160.0,
            slow_on_curves: true,
            sync_on_gas: true,
            metric_cluster: true,
        }
    }
}

/// Per-cycle fusion result consumed by both actuation strategies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionUpdate {
    /// Smoothed maximum allowed speed in cluster units.
    pub max_speed_clu: f32,
    /// Requested speed clipped into the allowed band, in cluster units.
    pub target_speed_clu: f32,
    /// Current speed exceeds the active navigation limit.
    pub slowing_down: bool,
    /// New requested cruise speed in km/h after an accelerator sync.
    pub requested_override_kph: Option<f32>,
    /// The navigation limiter is actively tracking a restriction ahead.
    pub camera_active: bool,
}

/// Persistent fusion state owned by the arbiter.
#[derive(Clone, Debug)]
pub struct SpeedFusion {
    tuning: FusionTuning,
    min_set_clu: f32,
    max_set_clu: f32,
    max_speed_clu: f32,
    target_speed_clu: f32,
    slowing_down: bool,
    over_limit: bool,
    sound_pending: bool,
}

impl SpeedFusion {
    /// Creates an idle fusion filter with the provided tuning.
    #[must_use]
    pub fn new(tuning: FusionTuning) -> Self {
        let metric = tuning.metric_cluster;
        Self {
            tuning,
            min_set_clu: units::kph_to_clu(tuning.min_set_speed_kph, metric),
            max_set_clu: units::kph_to_clu(tuning.max_set_speed_kph, metric),
            max_speed_clu: 0.0,
            target_speed_clu: 0.0,
            slowing_down: false,
            over_limit: false,
            sound_pending: false,
        }
    }

    /// Lowest selectable set-speed in cluster units.
    #[must_use]
    pub const fn min_set_speed_clu(&self) -> f32 {
        self.min_set_clu
    }

    /// Highest selectable set-speed in cluster units.
    #[must_use]
    pub const fn max_set_speed_clu(&self) -> f32 {
        self.max_set_clu
    }

    /// Current smoothed speed ceiling in cluster units.
    #[must_use]
    pub const fn max_speed_clu(&self) -> f32 {
        self.max_speed_clu
    }

    /// Current clipped target speed in cluster units.
    #[must_use]
    pub const fn target_speed_clu(&self) -> f32 {
        self.target_speed_clu
    }

    /// Runs one fusion cycle and returns the values the strategies consume.
    pub fn update(
        &mut self,
        snapshot: &VehicleSnapshot,
        constraints: &SpeedConstraints,
        requested_kph: f32,
    ) -> FusionUpdate {
        let metric = self.tuning.metric_cluster;
        let clu_speed = units::ms_to_clu(snapshot.v_ego_cluster_ms, metric);

        let mut bound_clu = self.curve_bound_clu(constraints, requested_kph);
        let camera_active = constraints
            .nav_limit
            .map_or(false, |nav| nav.limit_clu > 0.0 && nav.left_distance_m > 0.0);

        let valid_limit = constraints
            .nav_limit
            .filter(|nav| nav.limit_clu >= units::kph_to_clu(MIN_NAV_LIMIT_KPH, metric));
        if let Some(nav) = valid_limit {
            if nav.just_started {
                self.max_speed_clu = clu_speed;
            }
            bound_clu = bound_clu.min(nav.limit_clu);
            if clu_speed > nav.limit_clu {
                if !self.over_limit && !self.slowing_down {
                    self.sound_pending = true;
                    self.slowing_down = true;
                }
                self.over_limit = true;
            } else {
                self.over_limit = false;
            }
        } else {
            self.over_limit = false;
            self.slowing_down = false;
        }

        self.filter_max_speed(round_to_tenth(bound_clu).trunc());

        let mut requested = requested_kph;
        let mut requested_override_kph = None;
        if snapshot.gas_pressed && self.tuning.sync_on_gas && !snapshot.cruise_button.is_pressed()
        {
            let synced = clu_speed + self.tuning.sync_margin_clu;
            if synced > units::kph_to_clu(requested, metric) {
                let set_speed_clu = synced.clamp(self.min_set_clu, self.max_set_clu);
                requested = units::clu_to_ms(set_speed_clu, metric) * units::MS_TO_KPH;
                requested_override_kph = Some(requested);
            }
        }

        self.target_speed_clu = units::kph_to_clu(requested, metric);
        if self.max_speed_clu > self.min_set_clu {
            self.target_speed_clu = self
                .target_speed_clu
                .clamp(self.min_set_clu, self.max_speed_clu);
        }

        FusionUpdate {
            max_speed_clu: self.max_speed_clu,
            target_speed_clu: self.target_speed_clu,
            slowing_down: self.over_limit,
            requested_override_kph,
            camera_active,
        }
    }

    /// Clears all persisted fusion state after a precondition loss.
    pub fn reset(&mut self) {
        self.max_speed_clu = 0.0;
        self.target_speed_clu = 0.0;
        self.slowing_down = false;
        self.over_limit = false;
        self.sound_pending = false;
    }

    /// Emits pending driver notifications, consuming the one-shot chime.
    pub fn drain_alerts(&mut self, cruise_enabled: bool, out: &mut Vec<AlertSignal>) {
        if !cruise_enabled {
            return;
        }
        if self.sound_pending {
            self.sound_pending = false;
            out.push(AlertSignal::SlowingDownWithSound);
        } else if self.over_limit {
            out.push(AlertSignal::SlowingDown);
        }
    }

    fn curve_bound_clu(&self, constraints: &SpeedConstraints, requested_kph: f32) -> f32 {
        let metric = self.tuning.metric_cluster;
        if self.tuning.slow_on_curves && constraints.curve_speed_ms >= MIN_CURVE_SPEED_MS {
            let bound_ms = (requested_kph * units::KPH_TO_MS).min(constraints.curve_speed_ms);
            units::ms_to_clu(bound_ms, metric)
        } else {
            units::kph_to_clu(requested_kph, metric)
        }
    }

    fn filter_max_speed(&mut self, bound_clu: f32) {
        if self.max_speed_clu <= 0.0 {
            self.max_speed_clu = bound_clu;
        } else {
            let error = bound_clu - self.max_speed_clu;
            self.max_speed_clu += error * self.tuning.filter_gain;
        }
    }
}

fn round_to_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruise_bridge_core::NavLimit;

    fn snapshot_at_kph(kph: f32) -> VehicleSnapshot {
        VehicleSnapshot {
            v_ego_ms: kph * units::KPH_TO_MS,
            v_ego_cluster_ms: kph * units::KPH_TO_MS,
            cruise_enabled: true,
            ..VehicleSnapshot::default()
        }
    }

    #[test]
    fn filter_moves_one_percent_per_cycle() {
        let mut fusion = SpeedFusion::new(FusionTuning::default());
        let snapshot = snapshot_at_kph(100.0);
        let _ = fusion.update(&snapshot, &SpeedConstraints::default(), 110.0);
        assert!((fusion.max_speed_clu() - 110.0).abs() < 0.01);

        let constraints = SpeedConstraints {
            nav_limit: Some(NavLimit {
                limit_clu: 80.0,
                left_distance_m: 500.0,
                just_started: false,
            }),
            ..SpeedConstraints::default()
        };
        let update = fusion.update(&snapshot, &constraints, 110.0);
        assert!((update.max_speed_clu - 109.7).abs() < 0.01);
    }

    #[test]
    fn degraded_curve_estimate_is_ignored() {
        let mut fusion = SpeedFusion::new(FusionTuning::default());
        let constraints = SpeedConstraints {
            curve_speed_ms: 5.0,
            nav_limit: None,
        };
        let update = fusion.update(&snapshot_at_kph(100.0), &constraints, 110.0);
        assert!((update.max_speed_clu - 110.0).abs() < 0.01);
    }
}
