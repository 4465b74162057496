//! Scheduling-option validation and normalization
//!
//! Callers may attach an option block steering how the transition worker
//! is created (stack placement, stack size, priority, attribute bits).
//! The block is validated for structural consistency before any other
//! per-module work happens; absent options normalize to inherit-platform
//! defaults.

use crate::{LifecycleError, Result};
use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Required value of [`TransitionOptions::size`]
///
/// The option block crosses the user/kernel boundary as a fixed ABI
/// layout; a caller compiled against a different revision is rejected
/// instead of being reinterpreted.
pub const TRANSITION_OPTIONS_SIZE: u32 = 20;

const_assert_eq!(core::mem::size_of::<TransitionOptions>(), TRANSITION_OPTIONS_SIZE as usize);

bitflags! {
    /// Attribute bits accepted on a transition worker
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WorkerAttributes: u32 {
        /// Place the worker stack at the low end of its partition
        const STACK_LOW   = 0x0000_0001;
        /// Place the worker stack at the high end of its partition
        const STACK_HIGH  = 0x0000_0002;
        /// Do not fill the worker stack on creation
        const NO_FILL_STACK = 0x0010_0000;
        /// Clear the worker stack on exit
        const CLEAR_STACK = 0x0020_0000;
    }
}

/// Caller-supplied option block for a lifecycle request
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOptions {
    /// Declared size of this block; must equal [`TRANSITION_OPTIONS_SIZE`]
    pub size: u32,

    /// Memory partition to carve the worker stack from (0 = default)
    pub stack_partition: u32,

    /// Worker stack size in bytes (0 = platform default)
    pub stack_size: u32,

    /// Worker priority (0 = inherit default)
    pub priority: u32,

    /// Raw attribute word; validated against [`WorkerAttributes`]
    pub attributes: u32,
}

impl TransitionOptions {
    /// Build an option block with the correct size field and defaults
    pub const fn new() -> Self {
        Self {
            size: TRANSITION_OPTIONS_SIZE,
            stack_partition: 0,
            stack_size: 0,
            priority: 0,
            attributes: 0,
        }
    }
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized scheduling record embedded in every descriptor
///
/// Always fully populated: either copied verbatim from a validated option
/// block or set to the inherit-default values below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulingOptions {
    pub stack_partition: u32,
    pub stack_size: u32,
    pub priority: u32,
    pub attributes: u32,
}

/// Consolidated option-consistency check
///
/// Covers the declared block size and mutually exclusive attribute flags.
/// No options at all is always acceptable.
///
/// # Errors
/// Returns `InvalidOption` if the block is structurally inconsistent.
pub(crate) fn check_options(options: Option<&TransitionOptions>) -> Result<()> {
    let Some(opt) = options else {
        return Ok(());
    };

    if opt.size != TRANSITION_OPTIONS_SIZE {
        return Err(LifecycleError::InvalidOption);
    }

    // Unknown attribute bits are rejected rather than ignored
    let attrs = WorkerAttributes::from_bits(opt.attributes).ok_or(LifecycleError::InvalidOption)?;

    // A stack cannot sit at both ends of its partition
    if attrs.contains(WorkerAttributes::STACK_LOW | WorkerAttributes::STACK_HIGH) {
        return Err(LifecycleError::InvalidOption);
    }

    Ok(())
}

/// Produce the scheduling record for a (possibly absent) option block
///
/// Assumes `check_options` has already passed; values are copied verbatim.
pub(crate) fn normalize(options: Option<&TransitionOptions>) -> SchedulingOptions {
    match options {
        Some(opt) => SchedulingOptions {
            stack_partition: opt.stack_partition,
            stack_size: opt.stack_size,
            priority: opt.priority,
            attributes: opt.attributes,
        },
        None => SchedulingOptions::default(),
    }
}
