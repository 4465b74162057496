//! Mock kernel collaborators for module-broker development and testing
//!
//! # WARNING: This is not a real kernel backend!
//!
//! `MockKernel` implements all three collaborator seams of the broker —
//! module registry, worker scheduler, and memory policy — over plain
//! shared state, so the full lifecycle paths can be exercised on any
//! host without a kernel underneath.
//!
//! # Behavior
//! - Permissive by default: no interrupt context, all memory readable
//!   and writable, spawns succeed. Each can be restricted per test.
//! - Records everything: dispatched descriptors, context terminations,
//!   result-slot writes, and the per-module state trace.
//! - Runs each dispatched transition inline at spawn time by default;
//!   call [`MockKernel::defer_execution`] to queue workers instead and
//!   release them later with [`MockKernel::run_pending`].
//!
//! Cloning a `MockKernel` yields another handle to the same kernel, so a
//! test can hand clones to the broker and keep one for assertions.

#![no_std]

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use module_broker::{
    ModuleFlags, ModuleHandle, ModuleId, ModuleRegistry, ModuleState, OperationDescriptor,
    SpawnError, TransitionCommand, WorkerId, WorkerScheduler,
};

/// Transition result codes produced by the mock registry
///
/// The broker treats these as opaque integers; only the sign matters to
/// callers. Real registries define their own taxonomy.
pub mod status {
    pub const OK: i32 = 0;
    pub const ERR_UNKNOWN_MODULE: i32 = -101;
    pub const ERR_ALREADY_STARTED: i32 = -102;
    pub const ERR_NOT_STARTED: i32 = -103;
    pub const ERR_STILL_STARTED: i32 = -104;
    pub const ERR_CANNOT_STOP: i32 = -105;
}

/// One module known to the mock registry
struct ModuleEntry {
    id: ModuleId,
    flags: ModuleFlags,
    state: ModuleState,
    code_base: usize,
    code_size: usize,
}

struct Inner {
    // Memory policy knobs
    interrupt_context: bool,
    readable: Option<Vec<(usize, usize)>>,
    writable: Option<Vec<usize>>,
    syscall_ra: usize,

    // Registry
    modules: Vec<ModuleEntry>,

    // Scheduler behavior
    run_inline: bool,
    fail_spawn: Option<SpawnError>,
    pending: Vec<OperationDescriptor>,
    next_worker: WorkerId,

    // Records
    dispatched: Vec<OperationDescriptor>,
    terminations: Vec<i32>,
    results: BTreeMap<usize, i32>,
    state_log: Vec<(ModuleId, ModuleState)>,
    transitions: usize,
}

/// Shared-state mock of the broker's kernel collaborators
#[derive(Clone)]
pub struct MockKernel {
    inner: Rc<RefCell<Inner>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                interrupt_context: false,
                readable: None,
                writable: None,
                syscall_ra: 0,
                modules: Vec::new(),
                run_inline: true,
                fail_spawn: None,
                pending: Vec::new(),
                next_worker: 1,
                dispatched: Vec::new(),
                terminations: Vec::new(),
                results: BTreeMap::new(),
                state_log: Vec::new(),
                transitions: 0,
            })),
        }
    }

    // ---- configuration ----

    /// Register a loaded module owning `[code_base, code_base + code_size)`
    pub fn add_module(&self, id: ModuleId, flags: ModuleFlags, code_base: usize, code_size: usize) {
        self.inner.borrow_mut().modules.push(ModuleEntry {
            id,
            flags,
            state: ModuleState::Loaded,
            code_base,
            code_size,
        });
    }

    /// Force a module into a specific state (test setup shortcut)
    pub fn set_module_state(&self, id: ModuleId, state: ModuleState) {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.modules.iter_mut().find(|m| m.id == id) {
            entry.state = state;
        }
    }

    /// Mark the current context as interrupt service
    pub fn set_interrupt_context(&self, value: bool) {
        self.inner.borrow_mut().interrupt_context = value;
    }

    /// Switch to strict read checking and allow one readable window
    ///
    /// Until the first call, every address is readable.
    pub fn allow_read(&self, addr: usize, len: usize) {
        self.inner
            .borrow_mut()
            .readable
            .get_or_insert_with(Vec::new)
            .push((addr, len));
    }

    /// Switch to strict write checking and allow one result-slot address
    ///
    /// Until the first call, every address is writable.
    pub fn allow_write_slot(&self, addr: usize) {
        self.inner
            .borrow_mut()
            .writable
            .get_or_insert_with(Vec::new)
            .push(addr);
    }

    /// Set the address the privileged syscall-return accessor reports
    pub fn set_syscall_return_address(&self, addr: usize) {
        self.inner.borrow_mut().syscall_ra = addr;
    }

    /// Make the next spawn attempt fail with `err`
    pub fn fail_next_spawn(&self, err: SpawnError) {
        self.inner.borrow_mut().fail_spawn = Some(err);
    }

    /// Queue dispatched workers instead of running them at spawn time
    pub fn defer_execution(&self) {
        self.inner.borrow_mut().run_inline = false;
    }

    /// Run all queued workers in dispatch order (deferred mode)
    pub fn run_pending(&self) {
        let jobs = core::mem::take(&mut self.inner.borrow_mut().pending);
        for descriptor in &jobs {
            self.execute(descriptor);
        }
    }

    // ---- observation ----

    /// Every descriptor handed to the scheduler, in dispatch order
    pub fn dispatched(&self) -> Vec<OperationDescriptor> {
        self.inner.borrow().dispatched.clone()
    }

    /// Number of workers created so far
    pub fn worker_count(&self) -> usize {
        self.inner.borrow().dispatched.len()
    }

    /// Exit statuses of every terminated context, in order
    pub fn terminations(&self) -> Vec<i32> {
        self.inner.borrow().terminations.clone()
    }

    /// Value written into the result slot at `addr`, if any
    pub fn result_at(&self, addr: usize) -> Option<i32> {
        self.inner.borrow().results.get(&addr).copied()
    }

    /// Current state of a registered module
    pub fn module_state(&self, id: ModuleId) -> Option<ModuleState> {
        self.inner
            .borrow()
            .modules
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.state)
    }

    /// Every state a module passed through, including transients
    pub fn state_trace(&self, id: ModuleId) -> Vec<ModuleState> {
        self.inner
            .borrow()
            .state_log
            .iter()
            .filter(|(module, _)| *module == id)
            .map(|(_, state)| *state)
            .collect()
    }

    /// Number of `perform_transition` invocations
    pub fn transitions_performed(&self) -> usize {
        self.inner.borrow().transitions
    }

    // ---- worker body ----

    /// Run one transition the way a worker context would
    fn execute(&self, descriptor: &OperationDescriptor) {
        let result = self.perform_transition(descriptor);
        if let Some(slot) = descriptor.result_slot {
            self.inner.borrow_mut().results.insert(slot, result);
        }
    }
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one command to a module, logging transient states
fn apply_command(
    entry: &mut ModuleEntry,
    command: TransitionCommand,
    log: &mut Vec<(ModuleId, ModuleState)>,
) -> i32 {
    let mut step = |entry: &mut ModuleEntry, state| {
        entry.state = state;
        log.push((entry.id, state));
    };

    match command {
        TransitionCommand::Start => {
            if entry.state != ModuleState::Loaded {
                return status::ERR_ALREADY_STARTED;
            }
            step(entry, ModuleState::Starting);
            step(entry, ModuleState::Started);
            status::OK
        }
        TransitionCommand::Stop => {
            // Authoritative cannot-stop check; the broker's earlier
            // rejection is only an optimization
            if entry.flags.contains(ModuleFlags::CANT_STOP) {
                return status::ERR_CANNOT_STOP;
            }
            if entry.state != ModuleState::Started {
                return status::ERR_NOT_STARTED;
            }
            step(entry, ModuleState::Stopping);
            step(entry, ModuleState::Stopped);
            status::OK
        }
        TransitionCommand::Unload => {
            if matches!(
                entry.state,
                ModuleState::Starting | ModuleState::Started | ModuleState::Stopping
            ) {
                return status::ERR_STILL_STARTED;
            }
            step(entry, ModuleState::Unloading);
            step(entry, ModuleState::Unloaded);
            status::OK
        }
    }
}

impl ModuleRegistry for MockKernel {
    fn module_by_address(&self, addr: usize) -> Option<ModuleHandle> {
        self.inner
            .borrow()
            .modules
            .iter()
            .find(|m| addr >= m.code_base && addr < m.code_base + m.code_size)
            .map(|m| ModuleHandle {
                id: m.id,
                flags: m.flags,
            })
    }

    fn module_by_id(&self, id: ModuleId) -> Option<ModuleHandle> {
        self.inner
            .borrow()
            .modules
            .iter()
            .find(|m| m.id == id)
            .map(|m| ModuleHandle {
                id: m.id,
                flags: m.flags,
            })
    }

    fn perform_transition(&self, descriptor: &OperationDescriptor) -> i32 {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner.transitions += 1;

        let Some(entry) = inner.modules.iter_mut().find(|m| m.id == descriptor.target) else {
            return status::ERR_UNKNOWN_MODULE;
        };

        let mut result = apply_command(entry, descriptor.mode_start, &mut inner.state_log);
        if result == status::OK && descriptor.is_combined() {
            result = apply_command(entry, descriptor.mode_finish, &mut inner.state_log);
        }

        log::trace!(
            "mock transition {:?}->{:?} on module {}: {result}",
            descriptor.mode_start,
            descriptor.mode_finish,
            descriptor.target
        );
        result
    }
}

impl WorkerScheduler for MockKernel {
    fn spawn_transition(&self, descriptor: OperationDescriptor) -> Result<WorkerId, SpawnError> {
        let run_inline;
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(err) = inner.fail_spawn.take() {
                return Err(err);
            }
            inner.dispatched.push(descriptor);
            run_inline = inner.run_inline;
            if !run_inline {
                inner.pending.push(descriptor);
            }
        }

        if run_inline {
            self.execute(&descriptor);
        }

        let mut inner = self.inner.borrow_mut();
        let worker = inner.next_worker;
        inner.next_worker += 1;
        Ok(worker)
    }

    fn terminate_current(&self, exit_status: i32) {
        self.inner.borrow_mut().terminations.push(exit_status);
    }
}

impl module_broker::MemoryPolicy for MockKernel {
    fn in_interrupt_context(&self) -> bool {
        self.inner.borrow().interrupt_context
    }

    fn readable_range(&self, addr: usize, len: usize) -> bool {
        match &self.inner.borrow().readable {
            None => true,
            Some(windows) => windows
                .iter()
                .any(|&(base, size)| addr >= base && addr + len <= base + size),
        }
    }

    fn writable_slot(&self, addr: usize) -> bool {
        match &self.inner.borrow().writable {
            None => true,
            Some(slots) => slots.contains(&addr),
        }
    }

    fn syscall_return_address(&self) -> usize {
        self.inner.borrow().syscall_ra
    }
}
