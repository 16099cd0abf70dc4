//! Disk sizing policy
//!
//! The disk is sized from the container image: twice its declared size
//! (headroom for in-place updates), never below 10 GiB, never below a user
//! override, and rounded up to 4 KiB because loop devices need at least
//! 512-byte alignment.

use crate::error::{BootdiskError, BootdiskResult};

/// Multiplier applied to the container image size
pub const CONTAINER_SIZE_TO_DISK_SIZE_MULTIPLIER: u64 = 2;

/// Smallest disk ever created (10 GiB)
pub const DISK_SIZE_MINIMUM: u64 = 10 * 1024 * 1024 * 1024;

/// Alignment of the final disk size
pub const DISK_SIZE_ALIGNMENT: u64 = 4096;

/// Compute the disk size for an image of `image_size` bytes
pub fn compute_size(
    image_size: u64,
    override_spec: Option<&str>,
    minimum: u64,
    alignment: u64,
) -> BootdiskResult<u64> {
    let mut size = image_size
        .saturating_mul(CONTAINER_SIZE_TO_DISK_SIZE_MULTIPLIER)
        .max(minimum);

    if let Some(spec) = override_spec {
        size = size.max(parse_size(spec)?);
    }

    Ok(align_up(size, alignment))
}

/// [`compute_size`] with the default minimum and alignment
pub fn disk_size_for(image_size: u64, override_spec: Option<&str>) -> BootdiskResult<u64> {
    compute_size(
        image_size,
        override_spec,
        DISK_SIZE_MINIMUM,
        DISK_SIZE_ALIGNMENT,
    )
}

/// Round `size` up to the next multiple of `alignment`
pub fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return size;
    }
    match size % alignment {
        0 => size,
        rem => size.saturating_add(alignment - rem),
    }
}

/// Parse a human readable size such as `20GB`, `1.5G`, `512` or `10 MB`.
///
/// Units are decimal (`1k = 1000`). An `i` before the optional `b` is
/// accepted but does not switch to binary units.
pub fn parse_size(spec: &str) -> BootdiskResult<u64> {
    let invalid = |reason: &str| BootdiskError::InvalidSizeSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = spec.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if !number.starts_with(|c: char| c.is_ascii_digit()) || number.ends_with('.') {
        return Err(invalid("expected a number"));
    }
    let value: f64 = number.parse().map_err(|_| invalid("expected a number"))?;

    let unit = unit.strip_prefix(' ').unwrap_or(unit).to_ascii_lowercase();
    let mut chars = unit.chars().peekable();
    let multiplier = match chars.peek() {
        Some('k') => Some(1e3),
        Some('m') => Some(1e6),
        Some('g') => Some(1e9),
        Some('t') => Some(1e12),
        Some('p') => Some(1e15),
        _ => None,
    };
    if multiplier.is_some() {
        chars.next();
    }
    let multiplier = multiplier.unwrap_or(1.0);
    if chars.peek() == Some(&'i') {
        chars.next();
    }
    if chars.peek() == Some(&'b') {
        chars.next();
    }
    if chars.next().is_some() {
        return Err(invalid("unknown unit"));
    }

    let bytes = value * multiplier;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(invalid("size out of range"));
    }
    Ok(bytes as u64)
}

/// Format bytes as human-readable size (e.g., "1.5 GiB")
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    const TIB: u64 = GIB * 1024;

    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
