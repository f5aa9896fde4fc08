//! Space accounting.
//!
//! Converts between the logical size of an image, the physical space a
//! volume reports as available, and the fraction reserved for filesystem
//! overhead. All results are aligned to [`DEFAULT_ALIGN_BLOCK_SIZE`]:
//! - `usable_space` rounds down ("how much can I safely write")
//! - `required_space` rounds up ("how much must I reserve")

mod probe;

pub use probe::{HostSpaceProbe, SpaceProbe};
pub use volimport_shared::constants::space::DEFAULT_ALIGN_BLOCK_SIZE;

/// Round `number` down to the nearest multiple of `multiple`.
pub fn round_down(number: u64, multiple: u64) -> u64 {
    number / multiple * multiple
}

/// Round `number` up to the nearest multiple of `multiple`.
pub fn round_up(number: u64, multiple: u64) -> u64 {
    number.div_ceil(multiple).saturating_mul(multiple)
}

/// Payload bytes that fit in `available` physical bytes once `overhead` is reserved.
///
/// Rounded down to the alignment block: qemu-img rounds sizes up, which would
/// otherwise push the image past the budget and fail validation later.
pub fn usable_space(overhead: f64, available: u64) -> u64 {
    debug_assert!(overhead >= 0.0, "filesystem overhead must be non-negative");
    let without_overhead = (available as f64 / (1.0 + overhead)).ceil() as u64;
    round_down(without_overhead.min(available), DEFAULT_ALIGN_BLOCK_SIZE)
}

/// Physical bytes to reserve so a payload of `requested` logical bytes fits.
///
/// The image is aligned first, then overhead is counted as a fraction of the
/// aligned size.
pub fn required_space(overhead: f64, requested: u64) -> u64 {
    debug_assert!(overhead >= 0.0, "filesystem overhead must be non-negative");
    let aligned = round_up(requested, DEFAULT_ALIGN_BLOCK_SIZE);
    (aligned as f64 * (1.0 + overhead)).ceil() as u64
}
