//! Operation descriptors
//!
//! A descriptor is the complete, self-contained record of one requested
//! transition: target and caller identity, the start/finish command pair,
//! forwarded argument bytes, the result slot, and normalized scheduling
//! options. It is built once per request after validation, consumed
//! exactly once by the dispatcher, and never outlives the call.

use crate::options::SchedulingOptions;
use crate::ModuleId;

/// State-machine commands a worker can run against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCommand {
    Start,
    Stop,
    Unload,
}

/// Caller-owned argument bytes forwarded to the module entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRegion {
    /// Start address of the region in the caller's space
    pub addr: usize,

    /// Length in bytes
    pub len: usize,
}

impl ArgRegion {
    pub const fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }
}

/// Fully populated description of one lifecycle transition
///
/// `mode_start`/`mode_finish` usually agree; they differ only for the
/// combined self stop+unload request, where the worker stops the module
/// and, if that succeeds, continues straight into unload without handing
/// control back to anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Module to transition
    pub target: ModuleId,

    /// Module that issued the request (stop paths only)
    pub caller: Option<ModuleId>,

    /// First command the worker runs
    pub mode_start: TransitionCommand,

    /// Command the worker must have completed when it exits
    pub mode_finish: TransitionCommand,

    /// Argument bytes forwarded to the module entry point
    pub args: Option<ArgRegion>,

    /// Caller-writable address receiving the transition result
    pub result_slot: Option<usize>,

    /// Normalized worker scheduling record
    pub options: SchedulingOptions,
}

impl OperationDescriptor {
    /// Descriptor for a plain start request
    pub fn start(
        target: ModuleId,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: SchedulingOptions,
    ) -> Self {
        Self {
            target,
            caller: None,
            mode_start: TransitionCommand::Start,
            mode_finish: TransitionCommand::Start,
            args,
            result_slot,
            options,
        }
    }

    /// Descriptor for a stop request issued by `caller`
    pub fn stop(
        target: ModuleId,
        caller: ModuleId,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: SchedulingOptions,
    ) -> Self {
        Self {
            target,
            caller: Some(caller),
            mode_start: TransitionCommand::Stop,
            mode_finish: TransitionCommand::Stop,
            args,
            result_slot,
            options,
        }
    }

    /// Descriptor for a plain unload request
    ///
    /// Unload forwards no arguments and reports through no result slot.
    pub fn unload(target: ModuleId) -> Self {
        Self {
            target,
            caller: None,
            mode_start: TransitionCommand::Unload,
            mode_finish: TransitionCommand::Unload,
            args: None,
            result_slot: None,
            options: SchedulingOptions::default(),
        }
    }

    /// Combined descriptor for a module stopping and unloading itself
    ///
    /// Caller and target are the same module by construction.
    pub fn self_stop_unload(
        module: ModuleId,
        args: Option<ArgRegion>,
        result_slot: Option<usize>,
        options: SchedulingOptions,
    ) -> Self {
        Self {
            target: module,
            caller: Some(module),
            mode_start: TransitionCommand::Stop,
            mode_finish: TransitionCommand::Unload,
            args,
            result_slot,
            options,
        }
    }

    /// True if the worker has a second command to run after the first
    pub fn is_combined(&self) -> bool {
        self.mode_start != self.mode_finish
    }
}
