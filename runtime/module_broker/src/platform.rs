//! Collaborator traits consumed by the module broker
//!
//! The broker never touches module state, worker creation, or raw memory
//! itself; it goes through these three seams. A kernel wires in its real
//! registry/scheduler/MMU services, while tests substitute the
//! `kernel-mock` crate (or hand-rolled stubs) to script failures and
//! record every call.

use crate::descriptor::OperationDescriptor;
use crate::{ModuleHandle, ModuleId};
use thiserror::Error;

/// Identifier of a created transition worker
pub type WorkerId = usize;

/// Worker-creation failures reported by the scheduler
///
/// These are the only errors the dispatcher can see: once a worker exists,
/// transition failures travel through the descriptor's result slot instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    #[error("out of worker resources")]
    ResourceExhausted,

    #[error("scheduler rejected the worker scheduling options")]
    BadSchedulingOptions,
}

/// Externally observable module states
///
/// The registry drives this machine; the broker only requests transitions.
/// `LOADED -> STARTING -> STARTED` on START, `STARTED -> STOPPING ->
/// STOPPED` on STOP, and `STOPPED/LOADED -> UNLOADING -> UNLOADED` on
/// UNLOAD. A combined STOP+UNLOAD descriptor traverses both legs inside a
/// single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Loaded,
    Starting,
    Started,
    Stopping,
    Stopped,
    Unloading,
    Unloaded,
}

/// Module registry / loader interface
///
/// Owns the module directory and the authoritative transition state
/// machine. `perform_transition` runs on the worker context, never on the
/// requesting caller.
pub trait ModuleRegistry {
    /// Resolve the module whose code contains `addr`
    fn module_by_address(&self, addr: usize) -> Option<ModuleHandle>;

    /// Resolve a module by its identifier
    fn module_by_id(&self, id: ModuleId) -> Option<ModuleHandle>;

    /// Execute the descriptor's start/finish command pair
    ///
    /// Returns the integer transition result (negative on failure). This
    /// includes the authoritative cannot-stop check; the broker's
    /// pre-dispatch rejection is only a fast path.
    fn perform_transition(&self, descriptor: &OperationDescriptor) -> i32;
}

/// Execution-context primitive used to run transitions in isolation
pub trait WorkerScheduler {
    /// Create a worker that will perform the descriptor's transition
    ///
    /// The worker invokes [`ModuleRegistry::perform_transition`] and writes
    /// the result into the descriptor's result slot (if any). Creation is
    /// synchronous; execution is not — the caller must not assume the
    /// result slot is populated when this returns.
    ///
    /// # Errors
    /// Returns a [`SpawnError`] if no worker could be created; in that case
    /// no transition has been attempted and module state is unchanged.
    fn spawn_transition(&self, descriptor: OperationDescriptor) -> core::result::Result<WorkerId, SpawnError>;

    /// Terminate the calling execution context with `exit_status`
    ///
    /// On a real kernel this does not return. Test backends record the
    /// status and return, which is what lets tests observe the
    /// dispatch-before-terminate ordering of the self-stop protocol.
    fn terminate_current(&self, exit_status: i32);
}

/// Memory-protection and execution-context queries
///
/// Backs the access validator. All checks are against the *requesting
/// caller's* privilege domain, which the kernel tracks per context.
pub trait MemoryPolicy {
    /// True while servicing an interrupt (non-schedulable context)
    fn in_interrupt_context(&self) -> bool;

    /// True if `[addr, addr + len)` is entirely caller-readable
    fn readable_range(&self, addr: usize, len: usize) -> bool;

    /// True if `addr` is a caller-writable result-slot location
    fn writable_slot(&self, addr: usize) -> bool;

    /// Return address of the syscall that entered the kernel
    ///
    /// Privileged accessor used for user-mode callers, whose in-frame
    /// return address cannot be trusted.
    fn syscall_return_address(&self) -> usize;
}
