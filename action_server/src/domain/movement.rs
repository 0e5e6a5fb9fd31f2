// Movement input validation: the trust boundary between client packets and the simulation.
//
// Everything here is pure. A payload either becomes a normalized `MoveInstruction` or a
// classified `MoveRejection`; nothing panics and no unchecked number reaches arithmetic.

use super::payload::PayloadValue;
use std::fmt;

pub const WORLD_MIN: i32 = -10_000;
pub const WORLD_MAX: i32 = 10_000;
pub const MAX_TILE_DISTANCE_PER_REQUEST: i32 = 200;

/// Integer tile coordinate on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tile {
    pub x: i32,
    pub z: i32,
}

impl Tile {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Diagonal steps cost the same as orthogonal ones.
    pub fn chebyshev_distance(self, other: Tile) -> i64 {
        let dx = (i64::from(self.x) - i64::from(other.x)).abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).abs();
        dx.max(dz)
    }
}

/// A sanitized movement request, safe to hand to the action queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveInstruction {
    pub target_tile: Tile,
    pub run_mode: bool,
    pub cancel: bool,
}

/// How suspicious a rejected payload is. Callers decide what to do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Malformed top-level shape; most likely a client bug.
    Minor,
    /// Wrong field types or missing fields.
    Moderate,
    /// Bounds or anti-teleport violation.
    Major,
    /// NaN/Infinity injection.
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Minor => "MINOR",
            Severity::Moderate => "MODERATE",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRejection {
    pub severity: Severity,
    pub reason: String,
}

impl fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.severity)
    }
}

pub type ValidationResult = Result<MoveInstruction, MoveRejection>;

/// World bounds and per-request travel budget used by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementLimits {
    pub world_min: i32,
    pub world_max: i32,
    pub max_tile_distance: i32,
}

impl Default for MovementLimits {
    fn default() -> Self {
        Self {
            world_min: WORLD_MIN,
            world_max: WORLD_MAX,
            max_tile_distance: MAX_TILE_DISTANCE_PER_REQUEST,
        }
    }
}

pub fn validate_move_request(payload: &PayloadValue, current_tile: Tile) -> ValidationResult {
    validate_move_request_with(payload, current_tile, &MovementLimits::default())
}

/// Validates an untrusted movement payload against the player's last authoritative tile.
///
/// Accepted shapes, in precedence order: `cancel: true`, `targetTile: {x, z}`,
/// `target: [x, y, z]`, and a bare `runMode` toggle. `null` fields count as absent.
pub fn validate_move_request_with(
    payload: &PayloadValue,
    current_tile: Tile,
    limits: &MovementLimits,
) -> ValidationResult {
    if !payload.is_object() {
        return reject(Severity::Minor, "payload must be an object");
    }

    if field(payload, "cancel").and_then(PayloadValue::as_bool) == Some(true) {
        return Ok(MoveInstruction {
            target_tile: current_tile,
            run_mode: false,
            cancel: true,
        });
    }

    let run_mode_field = field(payload, "runMode");

    let (raw_x, raw_z) = if let Some(tile) = field(payload, "targetTile") {
        target_tile_coords(tile)?
    } else if let Some(target) = field(payload, "target") {
        target_array_coords(target)?
    } else if let Some(value) = run_mode_field {
        // Run toggle only; the current walk target is left alone.
        return Ok(MoveInstruction {
            target_tile: current_tile,
            run_mode: run_mode_flag(value)?,
            cancel: false,
        });
    } else {
        return reject(Severity::Minor, "no target specified");
    };

    if !raw_x.is_finite() || !raw_z.is_finite() {
        return reject(Severity::Critical, "non-finite coordinates");
    }

    // Compare as floats first so out-of-range values never saturate an i32 cast.
    let (x, z) = (raw_x.floor(), raw_z.floor());
    let (min, max) = (f64::from(limits.world_min), f64::from(limits.world_max));
    if x < min || x > max || z < min || z > max {
        return Err(MoveRejection {
            severity: Severity::Major,
            reason: format!(
                "out of world bounds: ({x}, {z}) not within [{}, {}]",
                limits.world_min, limits.world_max
            ),
        });
    }

    let target_tile = Tile::new(x as i32, z as i32);
    let distance = target_tile.chebyshev_distance(current_tile);
    if distance > i64::from(limits.max_tile_distance) {
        return Err(MoveRejection {
            severity: Severity::Major,
            reason: format!(
                "target too far: {distance} tiles (max {})",
                limits.max_tile_distance
            ),
        });
    }

    // Coordinate faults outrank a malformed flag, so a NaN target still reads as CRITICAL.
    let run_mode = match run_mode_field {
        Some(value) => run_mode_flag(value)?,
        None => false,
    };

    Ok(MoveInstruction {
        target_tile,
        run_mode,
        cancel: false,
    })
}

fn run_mode_flag(value: &PayloadValue) -> Result<bool, MoveRejection> {
    match value.as_bool() {
        Some(run) => Ok(run),
        None => reject(Severity::Moderate, "invalid runMode: expected a boolean"),
    }
}

fn field<'a>(payload: &'a PayloadValue, key: &str) -> Option<&'a PayloadValue> {
    payload.get(key).filter(|value| !value.is_null())
}

fn target_tile_coords(tile: &PayloadValue) -> Result<(f64, f64), MoveRejection> {
    if !tile.is_object() {
        return reject(Severity::Moderate, "invalid targetTile: expected an object");
    }
    let x = tile.get("x").and_then(PayloadValue::as_f64);
    let z = tile.get("z").and_then(PayloadValue::as_f64);
    match (x, z) {
        (Some(x), Some(z)) => Ok((x, z)),
        _ => reject(Severity::Moderate, "invalid targetTile: x and z must be numbers"),
    }
}

fn target_array_coords(target: &PayloadValue) -> Result<(f64, f64), MoveRejection> {
    let Some(items) = target.as_array() else {
        return reject(Severity::Moderate, "invalid target: expected an array");
    };
    if items.len() < 3 {
        return reject(Severity::Moderate, "invalid target: expected [x, y, z]");
    }
    // y is height and carries no tile information, but it still has to be a number.
    match (items[0].as_f64(), items[1].as_f64(), items[2].as_f64()) {
        (Some(x), Some(_), Some(z)) => Ok((x, z)),
        _ => reject(Severity::Moderate, "invalid target: elements must be numbers"),
    }
}

fn reject<T>(severity: Severity, reason: &str) -> Result<T, MoveRejection> {
    Err(MoveRejection {
        severity,
        reason: reason.to_string(),
    })
}
