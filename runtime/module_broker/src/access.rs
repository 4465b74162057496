//! Access validation for lifecycle requests
//!
//! Every public operation runs these checks before any descriptor is
//! built: the caller must be in a schedulable context, supplied buffers
//! must lie inside the caller's accessible range, and for self-stop the
//! acting module is identified by a return address that cannot be forged
//! across the privilege boundary.
//!
//! Pure validation; nothing here mutates state.

use crate::descriptor::ArgRegion;
use crate::platform::MemoryPolicy;
use crate::{LifecycleError, Result};

/// Identity of the execution context issuing a request
///
/// Filled in by the syscall-marshalling layer. `return_address` is the
/// in-frame return address, which is only trustworthy for privileged
/// callers; user-mode callers are resolved through the privileged
/// syscall-return accessor instead.
#[derive(Debug, Clone, Copy)]
pub struct CallerContext {
    /// Return address recorded at the call site
    pub return_address: usize,

    /// True if the caller executes in the unprivileged domain
    pub user_mode: bool,
}

impl CallerContext {
    pub const fn new(return_address: usize, user_mode: bool) -> Self {
        Self {
            return_address,
            user_mode,
        }
    }
}

/// Validator over an injected memory policy
pub struct AccessValidator<'a, M: MemoryPolicy> {
    memory: &'a M,
}

impl<'a, M: MemoryPolicy> AccessValidator<'a, M> {
    pub fn new(memory: &'a M) -> Self {
        Self { memory }
    }

    /// Reject requests made while servicing an interrupt
    ///
    /// # Errors
    /// Returns `InterruptContext`; transitions need a schedulable context
    /// to create their worker from.
    pub fn ensure_schedulable(&self) -> Result<()> {
        if self.memory.in_interrupt_context() {
            return Err(LifecycleError::InterruptContext);
        }
        Ok(())
    }

    /// Check a caller-supplied argument region for readability
    ///
    /// Absent regions are always permitted.
    ///
    /// # Errors
    /// Returns `IllegalAddress` if any byte of the region falls outside
    /// the caller-readable range.
    pub fn check_arg_region(&self, args: Option<ArgRegion>) -> Result<()> {
        if let Some(region) = args {
            if !self.memory.readable_range(region.addr, region.len) {
                return Err(LifecycleError::IllegalAddress { addr: region.addr });
            }
        }
        Ok(())
    }

    /// Check an optional result-slot address for writability
    ///
    /// # Errors
    /// Returns `IllegalAddress` if the slot is not caller-writable.
    pub fn check_result_slot(&self, slot: Option<usize>) -> Result<()> {
        if let Some(addr) = slot {
            if !self.memory.writable_slot(addr) {
                return Err(LifecycleError::IllegalAddress { addr });
            }
        }
        Ok(())
    }

    /// Determine the legitimate return address of a self-stop caller
    ///
    /// User-mode callers get their address from the privileged
    /// syscall-return accessor; the in-frame value is only trusted for
    /// privileged callers. The resolved address must itself be in an
    /// accessible code region.
    ///
    /// # Errors
    /// Returns `IllegalAddress` if the resolved address is inaccessible.
    pub fn resolve_return_address(&self, ctx: &CallerContext) -> Result<usize> {
        let addr = if ctx.user_mode {
            self.memory.syscall_return_address()
        } else {
            ctx.return_address
        };

        if !self.memory.readable_range(addr, 1) {
            return Err(LifecycleError::IllegalAddress { addr });
        }

        Ok(addr)
    }
}
