//! Transition dispatcher
//!
//! Hands a finished descriptor to the scheduler, which creates an isolated
//! worker context sized and prioritized by the descriptor's scheduling
//! options. The worker invokes the registry's transition primitive and
//! writes the outcome into the descriptor's result slot; the dispatcher
//! itself only reports whether the worker could be created.
//!
//! The indirection is load-bearing: a module cannot stop or unmap its own
//! code while the instruction pointer is still inside it. Running the
//! transition on a fresh context lets the requesting call stack unwind
//! independently of module teardown.
//!
//! One accepted request produces exactly one worker. Nothing here
//! deduplicates or serializes concurrent requests for the same module;
//! mutual exclusion across transitions is the registry's responsibility.

use crate::descriptor::OperationDescriptor;
use crate::platform::{WorkerId, WorkerScheduler};
use crate::Result;

/// Dispatch a descriptor to a fresh transition worker
///
/// # Returns
/// The created worker's identifier. This is the worker-creation outcome
/// only; the module-transition outcome arrives later through the result
/// slot.
///
/// # Errors
/// Returns `Dispatch` if the scheduler could not create the worker. No
/// transition has been attempted in that case and module state is
/// unchanged.
pub(crate) fn dispatch<S: WorkerScheduler>(
    scheduler: &S,
    descriptor: OperationDescriptor,
) -> Result<WorkerId> {
    log::trace!(
        "dispatching {:?}->{:?} for module {}",
        descriptor.mode_start,
        descriptor.mode_finish,
        descriptor.target
    );

    match scheduler.spawn_transition(descriptor) {
        Ok(worker) => {
            log::debug!("transition worker {worker} created for module {}", descriptor.target);
            Ok(worker)
        }
        Err(err) => {
            log::warn!(
                "worker creation failed for module {}: {err}",
                descriptor.target
            );
            Err(err.into())
        }
    }
}
