#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Emulated cruise-stalk press sessions that walk the stock set-speed
//! toward the fused target on vehicles without a direct actuation channel.

use cruise_bridge_core::{units, BusFrame, CruiseButton, VehicleSnapshot};
use cruise_bridge_frames::{encode, EncodeError, FrameKind};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Set-speed deltas smaller than this need no correction.
const HYSTERESIS_CLU: f32 = 0.9;
/// Presses pause below this odometry speed instead of resetting.
const MIN_MOVING_SPEED_MS: f32 = 0.1;

const RNG_STREAM_PRESS: &str = "press-frames";
const RNG_STREAM_WAIT: &str = "wait-frames";

/// Press and wait duration pools, in control frames.
///
/// Durations are drawn without replacement from a shuffled copy of each
/// pool; a drained pool is reshuffled before the next draw, so short-term
/// press patterns never repeat while staying inside the pool's bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonTiming {
    /// Candidate press durations for one session.
    pub press_frames: Vec<u8>,
    /// Candidate pause durations between sessions.
    pub wait_frames: Vec<u8>,
}

impl Default for ButtonTiming {
    fn default() -> Self {
        Self {
            press_frames: vec![8, 10, 12],
            wait_frames: vec![10, 12, 14, 16],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Session {
    Idle,
    PressActive {
        button: CruiseButton,
        drawn: u8,
        elapsed: u8,
    },
    Waiting {
        remaining: u16,
    },
}

/// Observable lifecycle phase of the press session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No press in progress; the next cycle may start one.
    Idle,
    /// A button is held and one frame is emitted per cycle.
    PressActive,
    /// Counting down a pause; nothing is emitted.
    Waiting,
}

/// Emulated-press state machine owned by the arbiter.
#[derive(Clone, Debug)]
pub struct ButtonEmulation {
    press_pool: ShuffledPool,
    wait_pool: ShuffledPool,
    session: Session,
    metric_cluster: bool,
}

impl ButtonEmulation {
    /// Creates an idle session with instance-owned duration pools.
    ///
    /// Both pools are seeded from `seed` through independent hash streams,
    /// so two instances sharing a seed replay identical draw sequences.
    /// Empty pools fall back to the default timing.
    #[must_use]
    pub fn new(timing: ButtonTiming, metric_cluster: bool, seed: u64) -> Self {
        let defaults = ButtonTiming::default();
        let press = if timing.press_frames.is_empty() {
            defaults.press_frames
        } else {
            timing.press_frames
        };
        let wait = if timing.wait_frames.is_empty() {
            defaults.wait_frames
        } else {
            timing.wait_frames
        };
        Self {
            press_pool: ShuffledPool::new(press, derive_stream_seed(seed, RNG_STREAM_PRESS)),
            wait_pool: ShuffledPool::new(wait, derive_stream_seed(seed, RNG_STREAM_WAIT)),
            session: Session::Idle,
            metric_cluster,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        match self.session {
            Session::Idle => SessionPhase::Idle,
            Session::PressActive { .. } => SessionPhase::PressActive,
            Session::Waiting { .. } => SessionPhase::Waiting,
        }
    }

    /// Longest possible press plus longest possible pause, in frames.
    #[must_use]
    pub fn cooldown_frames(&self) -> u16 {
        u16::from(self.press_pool.max()) + u16::from(self.wait_pool.max())
    }

    /// Aborts any running session.
    ///
    /// With `cooldown` set, arms the full cooldown pause so a fresh session
    /// cannot start before the stock controller has settled.
    pub fn reset(&mut self, cooldown: bool) {
        if cooldown {
            let remaining = self.cooldown_frames();
            info!(remaining, "press session reset with cooldown");
            self.session = Session::Waiting { remaining };
        } else {
            self.session = Session::Idle;
        }
    }

    /// Runs one session cycle, appending at most one stalk frame to `out`.
    ///
    /// `target_speed_clu` and `min_set_speed_clu` come from the fusion
    /// filter; `bus` addresses the emitted frame. Returns the button held
    /// this cycle, if any.
    pub fn handle(
        &mut self,
        snapshot: &VehicleSnapshot,
        target_speed_clu: f32,
        min_set_speed_clu: f32,
        bus: u8,
        out: &mut Vec<BusFrame>,
    ) -> Result<Option<CruiseButton>, EncodeError> {
        if let Session::Waiting { remaining } = self.session {
            let remaining = remaining.saturating_sub(1);
            self.session = if remaining == 0 {
                Session::Idle
            } else {
                Session::Waiting { remaining }
            };
            return Ok(None);
        }

        if snapshot.v_ego_ms <= MIN_MOVING_SPEED_MS {
            return Ok(None);
        }

        if self.session == Session::Idle {
            let current_set_clu = round_to_tenth(units::ms_to_clu(
                snapshot.cruise_set_speed_ms,
                self.metric_cluster,
            ))
            .trunc();
            match select_button(target_speed_clu, current_set_clu, min_set_speed_clu) {
                Some(button) => {
                    let drawn = self.press_pool.draw();
                    debug!(?button, frames = drawn, "press session started");
                    self.session = Session::PressActive {
                        button,
                        drawn,
                        elapsed: 0,
                    };
                }
                None => return Ok(None),
            }
        }

        if let Session::PressActive {
            button,
            drawn,
            elapsed,
        } = self.session
        {
            let frame = encode(
                FrameKind::CruiseButtons,
                bus,
                snapshot.button_raw,
                &[
                    ("sw_state", f64::from(button.wire_value())),
                    ("alive_count", f64::from(elapsed)),
                ],
            )?;
            out.push(frame);
            let elapsed = elapsed + 1;
            if elapsed >= drawn {
                let pause = self.wait_pool.draw();
                debug!(pause, "press session complete");
                self.session = Session::Waiting {
                    remaining: u16::from(pause),
                };
            } else {
                self.session = Session::PressActive {
                    button,
                    drawn,
                    elapsed,
                };
            }
            return Ok(Some(button));
        }

        Ok(None)
    }
}

fn select_button(
    target_speed_clu: f32,
    current_set_clu: f32,
    min_set_speed_clu: f32,
) -> Option<CruiseButton> {
    if target_speed_clu < min_set_speed_clu {
        return None;
    }
    let error = target_speed_clu - current_set_clu;
    if error.abs() < HYSTERESIS_CLU {
        return None;
    }
    if error > 0.0 {
        Some(CruiseButton::ResAccel)
    } else {
        Some(CruiseButton::SetDecel)
    }
}

fn round_to_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

fn derive_stream_seed(seed: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest[0..8].try_into().expect("sha256 digest slice length");
    u64::from_le_bytes(bytes)
}

/// Duration pool drawn without replacement, reshuffled once drained.
#[derive(Clone, Debug)]
struct ShuffledPool {
    values: Vec<u8>,
    index: usize,
    rng: ChaCha8Rng,
}

impl ShuffledPool {
    fn new(mut values: Vec<u8>, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        values.shuffle(&mut rng);
        Self {
            values,
            index: 0,
            rng,
        }
    }

    fn draw(&mut self) -> u8 {
        if self.index >= self.values.len() {
            self.values.shuffle(&mut self.rng);
            self.index = 0;
        }
        let value = self.values[self.index];
        self.index += 1;
        value
    }

    fn max(&self) -> u8 {
        self.values.iter().copied().max().unwrap_or(0)
    }
}
