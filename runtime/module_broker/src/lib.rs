//! Module Broker - Lifecycle coordination for loadable kernel modules
//!
//! # Purpose
//! The Module Broker validates start/stop/unload requests, packages them
//! into operation descriptors, and dispatches each accepted request to an
//! isolated worker context that performs the actual state transition. It
//! also implements the self-termination protocol that lets a module stop
//! and unload *itself* without unmapping the code it is executing.
//!
//! # Integration Points
//! - Depends on: module registry, worker scheduler, memory policy
//!   (injected collaborator traits, see [`platform`])
//! - Provides to: syscall-marshalling layer / kernel-internal callers
//!
//! # Architecture
//! A public operation runs the access validator, normalizes the caller's
//! scheduling options, builds a complete [`OperationDescriptor`], and hands
//! it to the transition dispatcher. The dispatcher creates exactly one
//! worker per accepted request and returns the worker-creation outcome;
//! the module-transition outcome travels through the caller's result slot,
//! written by the worker. Self stop/unload additionally resolves the true
//! caller address, dispatches a combined STOP+UNLOAD descriptor, and only
//! then terminates the calling context.
//!
//! # Testing Strategy
//! - Unit tests: option normalization, access checks, descriptor shapes
//! - Integration tests: full operation flows against the `kernel-mock`
//!   collaborator crate

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod access;
pub mod descriptor;
pub mod dispatch;
pub mod options;
pub mod platform;

mod broker;

pub use access::CallerContext;
pub use broker::ModuleBroker;
pub use descriptor::{ArgRegion, OperationDescriptor, TransitionCommand};
pub use options::{SchedulingOptions, TransitionOptions, WorkerAttributes, TRANSITION_OPTIONS_SIZE};
pub use platform::{MemoryPolicy, ModuleRegistry, ModuleState, SpawnError, WorkerId, WorkerScheduler};

use bitflags::bitflags;
use thiserror::Error;

/// Registry-assigned module identifier
pub type ModuleId = u32;

/// Transition result written into a caller's result slot on success
pub const STATUS_OK: i32 = 0;

bitflags! {
    /// Capability flags carried by a loaded module
    ///
    /// Only `CANT_STOP` is interpreted by the broker; the remaining bits
    /// belong to the loader and are passed through untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModuleFlags: u16 {
        /// Module refuses stop requests (system-critical residents)
        const CANT_STOP = 0x0001;
        /// Module stays loaded after its start entry returns
        const RESIDENT  = 0x0002;
        /// Module executes in the privileged domain
        const KERNEL    = 0x1000;
    }
}

/// Opaque handle to a loaded module, as returned by registry lookups
///
/// The registry owns module state; the broker only reads identity and
/// capability flags from the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHandle {
    /// Unique module identifier
    pub id: ModuleId,

    /// Capability flags
    pub flags: ModuleFlags,
}

/// Error types for lifecycle operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("lifecycle operations cannot be called from interrupt context")]
    InterruptContext,

    #[error("address {addr:#x} is not accessible to the caller")]
    IllegalAddress { addr: usize },

    #[error("malformed transition options")]
    InvalidOption,

    #[error("module cannot be stopped")]
    ModuleCannotStop,

    #[error("failed to create transition worker: {0}")]
    Dispatch(#[from] SpawnError),
}

pub type Result<T> = core::result::Result<T, LifecycleError>;
