#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fixed-layout codec for the vehicle-bus frames this workspace re-emits.
//!
//! Every supported frame type carries a static [`FrameLayout`] describing its
//! named fields as little-endian bit ranges with a physical scale and offset.
//! Encoding starts from a caller-supplied base payload (the most recent stock
//! capture of the same frame), overwrites exactly the named fields, and then
//! computes the frame's checksum when the layout declares one. Fields the
//! caller does not name keep their captured bits, which is how passthrough
//! re-emission preserves the stock controller's untouched signals.
//!
//! Rolling counters are advanced by callers, never in here; the codec only
//! validates that the written value fits the counter field's bit width.

use cruise_bridge_core::BusFrame;
use thiserror::Error;

/// Frame types understood by the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Steering-status frame mirrored back to a separate-bus cruise radar.
    SteeringStatus,
    /// Cruise-status frame carrying main mode, gap and displayed set-speed.
    CruiseStatus,
    /// Acceleration-command frame consumed by the longitudinal actuator.
    AccelCommand,
    /// Extended jerk/comfort-band frame carried by some variants.
    ComfortBand,
    /// Static accessory-options frame emitted once per activation.
    AccessoryOptions,
    /// Cruise-stalk button frame used for emulated presses.
    CruiseButtons,
}

impl FrameKind {
    /// Static layout describing the frame's fields, checksum and counter.
    #[must_use]
    pub const fn layout(self) -> &'static FrameLayout {
        match self {
            Self::SteeringStatus => &STEERING_STATUS_LAYOUT,
            Self::CruiseStatus => &CRUISE_STATUS_LAYOUT,
            Self::AccelCommand => &ACCEL_COMMAND_LAYOUT,
            Self::ComfortBand => &COMFORT_BAND_LAYOUT,
            Self::AccessoryOptions => &ACCESSORY_OPTIONS_LAYOUT,
            Self::CruiseButtons => &CRUISE_BUTTONS_LAYOUT,
        }
    }

    /// Bus identifier the frame is addressed with.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.layout().id
    }

    /// Number of payload bytes the frame carries.
    #[must_use]
    pub const fn dlc(self) -> u8 {
        self.layout().dlc
    }
}

/// Rolling-counter modulus of the steering-status frame.
pub const STEERING_STATUS_COUNTER_MODULUS: u16 = 256;
/// Rolling-counter modulus of the cruise-status frame.
pub const CRUISE_STATUS_COUNTER_MODULUS: u16 = 16;

/// Little-endian bit range of one named frame field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    name: &'static str,
    start_bit: u16,
    width: u8,
    scale: f64,
    offset: f64,
    required: bool,
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        start_bit: u16,
        width: u8,
        scale: f64,
        offset: f64,
        required: bool,
    ) -> Self {
        Self {
            name,
            start_bit,
            width,
            scale,
            offset,
            required,
        }
    }

    /// Name callers use to address the field.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// First payload bit of the field, counting LSB-first per byte.
    #[must_use]
    pub const fn start_bit(&self) -> u16 {
        self.start_bit
    }

    /// Width of the field in bits.
    #[must_use]
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// Physical value represented by one raw count.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Physical value of raw zero.
    #[must_use]
    pub const fn offset(&self) -> f64 {
        self.offset
    }

    /// Whether every encode of the frame must supply the field.
    #[must_use]
    pub const fn required(&self) -> bool {
        self.required
    }
}

/// Checksum algorithm a frame layout declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumSpec {
    /// Arithmetic sum of all payload bytes mod 256, written into the named
    /// whole-byte field after that byte is zeroed.
    ByteSum(&'static str),
    /// `16 − (Σ of every byte's high and low nibble mod 16)`, masked to the
    /// named nibble-aligned 4-bit field. The finished payload's nibble sum is
    /// a multiple of sixteen.
    NibbleSum(&'static str),
}

/// Static description of one frame type's wire layout.
#[derive(Debug)]
pub struct FrameLayout {
    id: u32,
    dlc: u8,
    fields: &'static [FieldSpec],
    checksum: Option<ChecksumSpec>,
    counter_field: Option<&'static str>,
}

impl FrameLayout {
    /// Bus identifier the frame is addressed with.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Number of payload bytes the frame carries.
    #[must_use]
    pub const fn dlc(&self) -> u8 {
        self.dlc
    }

    /// All named fields of the frame.
    #[must_use]
    pub const fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Checksum declaration, if the frame carries one.
    #[must_use]
    pub const fn checksum(&self) -> Option<ChecksumSpec> {
        self.checksum
    }

    /// Name of the frame's rolling-counter field, if any.
    #[must_use]
    pub const fn counter_field(&self) -> Option<&'static str> {
        self.counter_field
    }

    fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

const STEERING_STATUS_LAYOUT: FrameLayout = FrameLayout {
    id: 0x251,
    dlc: 8,
    fields: &[
        FieldSpec::new("toi_active", 46, 1, 1.0, 0.0, true),
        FieldSpec::new("toi_unavail", 47, 1, 1.0, 0.0, true),
        FieldSpec::new("msg_count", 48, 8, 1.0, 0.0, true),
        FieldSpec::new("checksum", 56, 8, 1.0, 0.0, false),
    ],
    checksum: Some(ChecksumSpec::ByteSum("checksum")),
    counter_field: Some("msg_count"),
};

const CRUISE_STATUS_LAYOUT: FrameLayout = FrameLayout {
    id: 0x420,
    dlc: 8,
    fields: &[
        FieldSpec::new("main_mode", 0, 1, 1.0, 0.0, true),
        FieldSpec::new("tau_gap", 1, 3, 1.0, 0.0, true),
        FieldSpec::new("alive_counter", 4, 4, 1.0, 0.0, true),
        FieldSpec::new("vset_dis", 8, 8, 1.0, 0.0, true),
        FieldSpec::new("obj_valid", 16, 1, 1.0, 0.0, true),
        FieldSpec::new("driver_alert", 17, 2, 1.0, 0.0, false),
        FieldSpec::new("camera_act", 24, 2, 1.0, 0.0, false),
        FieldSpec::new("camera_status", 26, 2, 1.0, 0.0, false),
    ],
    checksum: None,
    counter_field: Some("alive_counter"),
};

const ACCEL_COMMAND_LAYOUT: FrameLayout = FrameLayout {
    id: 0x421,
    dlc: 8,
    fields: &[
        FieldSpec::new("acc_mode", 0, 2, 1.0, 0.0, true),
        FieldSpec::new("stop_req", 2, 1, 1.0, 0.0, true),
        FieldSpec::new("areq_raw", 16, 11, 0.01, -10.23, true),
        FieldSpec::new("areq_value", 32, 11, 0.01, -10.23, true),
        FieldSpec::new("alive_counter", 56, 4, 1.0, 0.0, true),
        FieldSpec::new("checksum", 60, 4, 1.0, 0.0, false),
    ],
    checksum: Some(ChecksumSpec::NibbleSum("checksum")),
    counter_field: Some("alive_counter"),
};

const COMFORT_BAND_LAYOUT: FrameLayout = FrameLayout {
    id: 0x389,
    dlc: 8,
    fields: &[
        FieldSpec::new("comfort_band_upper", 0, 8, 0.25, 0.0, false),
        FieldSpec::new("comfort_band_lower", 8, 8, 0.25, 0.0, false),
        FieldSpec::new("jerk_upper_limit", 16, 8, 0.25, 0.0, false),
        FieldSpec::new("jerk_lower_limit", 24, 8, 0.25, 0.0, false),
        FieldSpec::new("acc_mode", 32, 2, 1.0, 0.0, false),
        FieldSpec::new("obj_gap", 34, 3, 1.0, 0.0, false),
    ],
    checksum: None,
    counter_field: None,
};

const ACCESSORY_OPTIONS_LAYOUT: FrameLayout = FrameLayout {
    id: 0x50A,
    dlc: 8,
    fields: &[
        FieldSpec::new("drv_mode", 0, 3, 1.0, 0.0, false),
        FieldSpec::new("equip", 3, 1, 1.0, 0.0, false),
        FieldSpec::new("lead_depart_alert", 6, 2, 1.0, 0.0, false),
    ],
    checksum: None,
    counter_field: None,
};

const CRUISE_BUTTONS_LAYOUT: FrameLayout = FrameLayout {
    id: 0x4F1,
    dlc: 4,
    fields: &[
        FieldSpec::new("sw_state", 0, 3, 1.0, 0.0, true),
        FieldSpec::new("sw_main", 3, 1, 1.0, 0.0, false),
        FieldSpec::new("alive_count", 24, 8, 1.0, 0.0, true),
    ],
    checksum: None,
    counter_field: Some("alive_count"),
};

/// Contract violations raised by [`encode`] and [`read_field`].
///
/// Every variant is a programming defect in the caller, never a runtime
/// condition to recover from; persistent failures should halt actuation
/// output rather than let a malformed frame reach the bus.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EncodeError {
    /// The named field does not exist in the frame's layout.
    #[error("frame {frame:?} has no field named {name:?}")]
    UnknownField {
        /// Frame whose layout was consulted.
        frame: FrameKind,
        /// Field name supplied by the caller.
        name: String,
    },
    /// A field the layout marks required was not supplied.
    #[error("frame {frame:?} is missing required field {name:?}")]
    MissingField {
        /// Frame whose layout was consulted.
        frame: FrameKind,
        /// Name of the absent field.
        name: String,
    },
    /// The supplied value does not fit the field's declared bit width.
    #[error("value {value} does not fit field {name:?} of frame {frame:?}")]
    ValueOutOfRange {
        /// Frame whose layout was consulted.
        frame: FrameKind,
        /// Name of the overflowing field.
        name: String,
        /// Physical value supplied by the caller.
        value: f64,
    },
}

/// Encodes one frame over a captured base payload.
///
/// Copies `base`, truncates it to the layout's length, overwrites every
/// `(name, physical value)` pair, verifies all required fields were supplied,
/// and finally computes the declared checksum. Raw counts are produced as
/// `round((value − offset) / scale)` and must land inside the field's bit
/// width.
pub fn encode(
    kind: FrameKind,
    bus: u8,
    base: [u8; 8],
    fields: &[(&str, f64)],
) -> Result<BusFrame, EncodeError> {
    let layout = kind.layout();
    let mut payload = base;
    for byte in payload.iter_mut().skip(usize::from(layout.dlc)) {
        *byte = 0;
    }

    for (name, value) in fields {
        let spec = layout.field(name).ok_or_else(|| EncodeError::UnknownField {
            frame: kind,
            name: (*name).to_owned(),
        })?;
        let raw = physical_to_raw(kind, spec, *value)?;
        write_bits(&mut payload, spec.start_bit, spec.width, raw);
    }

    for spec in layout.fields {
        if spec.required && !fields.iter().any(|(name, _)| *name == spec.name) {
            return Err(EncodeError::MissingField {
                frame: kind,
                name: spec.name.to_owned(),
            });
        }
    }

    if let Some(checksum) = layout.checksum {
        apply_checksum(kind, layout, checksum, &mut payload)?;
    }

    Ok(BusFrame::new(layout.id, bus, layout.dlc, payload))
}

/// Reads one named field out of a raw payload, returning its physical value.
pub fn read_field(kind: FrameKind, payload: &[u8; 8], name: &str) -> Result<f64, EncodeError> {
    let layout = kind.layout();
    let spec = layout.field(name).ok_or_else(|| EncodeError::UnknownField {
        frame: kind,
        name: name.to_owned(),
    })?;
    let raw = read_bits(payload, spec.start_bit, spec.width);
    Ok(raw as f64 * spec.scale + spec.offset)
}

fn physical_to_raw(kind: FrameKind, spec: &FieldSpec, value: f64) -> Result<u64, EncodeError> {
    let raw = ((value - spec.offset) / spec.scale).round();
    let max = ((1u64 << spec.width) - 1) as f64;
    if !raw.is_finite() || raw < 0.0 || raw > max {
        return Err(EncodeError::ValueOutOfRange {
            frame: kind,
            name: spec.name.to_owned(),
            value,
        });
    }
    Ok(raw as u64)
}

fn apply_checksum(
    kind: FrameKind,
    layout: &FrameLayout,
    checksum: ChecksumSpec,
    payload: &mut [u8; 8],
) -> Result<(), EncodeError> {
    let (field_name, value) = match checksum {
        ChecksumSpec::ByteSum(name) => {
            zero_field(kind, layout, name, payload)?;
            let sum: u32 = payload[..usize::from(layout.dlc)]
                .iter()
                .map(|byte| u32::from(*byte))
                .sum();
            (name, sum % 256)
        }
        ChecksumSpec::NibbleSum(name) => {
            zero_field(kind, layout, name, payload)?;
            let sum: u32 = payload[..usize::from(layout.dlc)]
                .iter()
                .map(|byte| u32::from(byte >> 4) + u32::from(byte & 0x0F))
                .sum();
            (name, (16 - sum % 16) & 0x0F)
        }
    };
    let spec = layout
        .field(field_name)
        .ok_or_else(|| EncodeError::UnknownField {
            frame: kind,
            name: field_name.to_owned(),
        })?;
    write_bits(payload, spec.start_bit, spec.width, u64::from(value));
    Ok(())
}

fn zero_field(
    kind: FrameKind,
    layout: &FrameLayout,
    name: &'static str,
    payload: &mut [u8; 8],
) -> Result<(), EncodeError> {
    let spec = layout.field(name).ok_or_else(|| EncodeError::UnknownField {
        frame: kind,
        name: name.to_owned(),
    })?;
    write_bits(payload, spec.start_bit, spec.width, 0);
    Ok(())
}

fn write_bits(payload: &mut [u8; 8], start_bit: u16, width: u8, raw: u64) {
    for offset in 0..u16::from(width) {
        let position = start_bit + offset;
        let byte = usize::from(position / 8);
        let bit = position % 8;
        let mask = 1u8 << bit;
        if (raw >> offset) & 1 == 1 {
            payload[byte] |= mask;
        } else {
            payload[byte] &= !mask;
        }
    }
}

fn read_bits(payload: &[u8; 8], start_bit: u16, width: u8) -> u64 {
    let mut raw = 0u64;
    for offset in 0..u16::from(width) {
        let position = start_bit + offset;
        let byte = usize::from(position / 8);
        let bit = position % 8;
        if payload[byte] & (1 << bit) != 0 {
            raw |= 1 << offset;
        }
    }
    raw
}

/// Modular frame counter advanced once per emitted frame.
///
/// Wraps at its modulus without ever skipping a value; the arbiter owns one
/// per periodic frame so parallel instances never share counter state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollingCounter {
    value: u16,
    modulus: u16,
}

impl RollingCounter {
    /// Creates a counter starting at zero. A zero modulus is treated as one.
    #[must_use]
    pub fn new(modulus: u16) -> Self {
        Self {
            value: 0,
            modulus: modulus.max(1),
        }
    }

    /// Current counter value, always below the modulus.
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.value
    }

    /// Modulus the counter wraps at.
    #[must_use]
    pub const fn modulus(&self) -> u16 {
        self.modulus
    }

    /// Advances the counter by one step, wrapping at the modulus.
    pub fn advance(&mut self) {
        self.value = (self.value + 1) % self.modulus;
    }
}
