//! Public lifecycle operations
//!
//! `ModuleBroker` owns the three injected collaborators and exposes the
//! five lifecycle entry points. Each operation validates access, runs the
//! consolidated option check, builds one descriptor, and dispatches it;
//! the self-stop entries additionally resolve the acting module from its
//! true return address and terminate the calling context once (and only
//! once) the replacement worker exists.

use crate::access::{AccessValidator, CallerContext};
use crate::descriptor::{ArgRegion, OperationDescriptor};
use crate::dispatch::dispatch;
use crate::options::{check_options, normalize, TransitionOptions};
use crate::platform::{MemoryPolicy, ModuleRegistry, WorkerId, WorkerScheduler};
use crate::{LifecycleError, ModuleFlags, ModuleId, Result, STATUS_OK};

/// Module lifecycle coordinator
///
/// Generic over its collaborators so tests can substitute stubs for any
/// of the registry, the scheduler, or the memory policy independently.
pub struct ModuleBroker<R, S, M> {
    registry: R,
    scheduler: S,
    memory: M,
}

impl<R, S, M> ModuleBroker<R, S, M>
where
    R: ModuleRegistry,
    S: WorkerScheduler,
    M: MemoryPolicy,
{
    pub fn new(registry: R, scheduler: S, memory: M) -> Self {
        Self {
            registry,
            scheduler,
            memory,
        }
    }

    /// Start a loaded module
    ///
    /// Asynchronous: returns once the transition worker exists. The
    /// module's own start result arrives through `result_slot`, written
    /// by the worker.
    ///
    /// # Errors
    /// `InterruptContext`, `IllegalAddress`, `InvalidOption`, `Dispatch`.
    pub fn start(
        &self,
        target: ModuleId,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: Option<&TransitionOptions>,
    ) -> Result<WorkerId> {
        let access = AccessValidator::new(&self.memory);
        access.ensure_schedulable()?;
        access.check_arg_region(args)?;
        access.check_result_slot(result_slot)?;
        check_options(options)?;

        let descriptor = OperationDescriptor::start(target, args, result_slot, normalize(options));
        dispatch(&self.scheduler, descriptor)
    }

    /// Stop a started module
    ///
    /// The requester is identified by mapping `ctx.return_address` to its
    /// owning module; stop requests from code the registry does not know
    /// are refused. If the resolved caller — or the target, when it
    /// resolves — carries [`ModuleFlags::CANT_STOP`], the request is
    /// rejected before any worker is created. The registry repeats that
    /// check authoritatively inside the worker.
    ///
    /// # Errors
    /// As [`Self::start`], plus `ModuleCannotStop`.
    pub fn stop(
        &self,
        ctx: &CallerContext,
        target: ModuleId,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: Option<&TransitionOptions>,
    ) -> Result<WorkerId> {
        let access = AccessValidator::new(&self.memory);
        access.ensure_schedulable()?;
        access.check_arg_region(args)?;
        access.check_result_slot(result_slot)?;
        check_options(options)?;

        let caller = self
            .registry
            .module_by_address(ctx.return_address)
            .ok_or(LifecycleError::ModuleCannotStop)?;

        // Pre-dispatch fast reject; the worker performs the authoritative
        // check again
        if caller.flags.contains(ModuleFlags::CANT_STOP) {
            return Err(LifecycleError::ModuleCannotStop);
        }
        if let Some(module) = self.registry.module_by_id(target) {
            if module.flags.contains(ModuleFlags::CANT_STOP) {
                return Err(LifecycleError::ModuleCannotStop);
            }
        }

        let descriptor =
            OperationDescriptor::stop(target, caller.id, args, result_slot, normalize(options));
        dispatch(&self.scheduler, descriptor)
    }

    /// Unload a module that is not currently started
    ///
    /// # Errors
    /// `InterruptContext`, `Dispatch`.
    pub fn unload(&self, target: ModuleId) -> Result<WorkerId> {
        AccessValidator::new(&self.memory).ensure_schedulable()?;

        dispatch(&self.scheduler, OperationDescriptor::unload(target))
    }

    /// Stop and unload the calling module, exiting with `exit_status`
    ///
    /// On success the calling execution context is terminated and, on a
    /// real kernel, this never returns; the returned worker id is only
    /// observable through recording test backends. On any failure the
    /// calling context is left running and the error is returned normally
    /// — the context must never terminate itself on a path that did not
    /// create the replacement worker, or the module's code would become
    /// unreachable while still loaded.
    ///
    /// # Errors
    /// `InterruptContext`, `IllegalAddress`, `InvalidOption`,
    /// `ModuleCannotStop`, `Dispatch`.
    pub fn stop_unload_self_with_status(
        &self,
        ctx: &CallerContext,
        exit_status: i32,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: Option<&TransitionOptions>,
    ) -> Result<WorkerId> {
        let access = AccessValidator::new(&self.memory);
        access.ensure_schedulable()?;
        access.check_arg_region(args)?;
        access.check_result_slot(result_slot)?;
        check_options(options)?;

        let code_addr = access.resolve_return_address(ctx)?;

        self.self_stop_unload(exit_status, code_addr, args, result_slot, options)
    }

    /// Stop and unload the calling module with the default success status
    ///
    /// Identical to [`Self::stop_unload_self_with_status`] with
    /// [`STATUS_OK`](crate::STATUS_OK) as the exit status.
    pub fn stop_unload_self(
        &self,
        ctx: &CallerContext,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: Option<&TransitionOptions>,
    ) -> Result<WorkerId> {
        self.stop_unload_self_with_status(ctx, STATUS_OK, args, result_slot, options)
    }

    /// Common tail of the self-termination protocol
    ///
    /// Resolves the acting module from `code_addr`, dispatches a combined
    /// STOP+UNLOAD descriptor, and terminates the calling context only
    /// after the dispatcher reports successful worker creation. That
    /// ordering is the central correctness property of the subsystem.
    fn self_stop_unload(
        &self,
        exit_status: i32,
        code_addr: usize,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: Option<&TransitionOptions>,
    ) -> Result<WorkerId> {
        let module = self
            .registry
            .module_by_address(code_addr)
            .ok_or(LifecycleError::ModuleCannotStop)?;
        if module.flags.contains(ModuleFlags::CANT_STOP) {
            return Err(LifecycleError::ModuleCannotStop);
        }

        let descriptor =
            OperationDescriptor::self_stop_unload(module.id, args, result_slot, normalize(options));
        let worker = dispatch(&self.scheduler, descriptor)?;

        log::debug!(
            "module {} teardown dispatched, terminating caller with status {exit_status}",
            module.id
        );
        self.scheduler.terminate_current(exit_status);

        // Reached only on recording backends whose terminate_current returns
        Ok(worker)
    }
}
