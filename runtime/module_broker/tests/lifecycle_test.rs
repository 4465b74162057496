//! Integration tests for the module lifecycle broker
//!
//! These tests run the complete operation paths against the kernel-mock
//! collaborators: validation, descriptor construction, dispatch, the
//! worker-side state machine, and the self-termination protocol.

use kernel_mock::{status, MockKernel};
use module_broker::*;

const MOD_BASE: usize = 0x0040_0000;
const MOD_SIZE: usize = 0x1_0000;

/// Broker wired to three handles of the same mock kernel
fn broker_on(kernel: &MockKernel) -> ModuleBroker<MockKernel, MockKernel, MockKernel> {
    ModuleBroker::new(kernel.clone(), kernel.clone(), kernel.clone())
}

/// A kernel with one started module owning MOD_BASE..MOD_BASE+MOD_SIZE
fn kernel_with_started_module(id: ModuleId) -> MockKernel {
    let kernel = MockKernel::new();
    kernel.add_module(id, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.set_module_state(id, ModuleState::Started);
    kernel
}

fn ctx_inside_module() -> CallerContext {
    CallerContext::new(MOD_BASE + 0x100, false)
}

#[test]
fn test_start_creates_one_worker_and_starts_module() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    let broker = broker_on(&kernel);

    let worker = broker
        .start(7, Some(ArgRegion::new(0x8000, 16)), Some(0x9000), None)
        .expect("start should dispatch");

    assert!(worker >= 1);
    assert_eq!(kernel.worker_count(), 1);
    assert_eq!(kernel.module_state(7), Some(ModuleState::Started));
    assert_eq!(kernel.result_at(0x9000), Some(status::OK));
}

#[test]
fn test_interrupt_context_rejects_every_operation() {
    let kernel = kernel_with_started_module(7);
    kernel.set_interrupt_context(true);
    let broker = broker_on(&kernel);
    let ctx = ctx_inside_module();

    assert_eq!(broker.start(7, None, None, None), Err(LifecycleError::InterruptContext));
    assert_eq!(
        broker.stop(&ctx, 7, None, None, None),
        Err(LifecycleError::InterruptContext)
    );
    assert_eq!(broker.unload(7), Err(LifecycleError::InterruptContext));
    assert_eq!(
        broker.stop_unload_self_with_status(&ctx, 0, None, None, None),
        Err(LifecycleError::InterruptContext)
    );
    assert_eq!(
        broker.stop_unload_self(&ctx, None, None, None),
        Err(LifecycleError::InterruptContext)
    );

    // No worker was created and no module moved
    assert_eq!(kernel.worker_count(), 0);
    assert_eq!(kernel.module_state(7), Some(ModuleState::Started));
    assert!(kernel.terminations().is_empty());
}

#[test]
fn test_unreadable_arg_buffer_rejected_before_dispatch() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.allow_read(0x8000, 0x100);
    let broker = broker_on(&kernel);

    // Region extends past the caller-readable window
    let result = broker.start(7, Some(ArgRegion::new(0x8080, 0x100)), None, None);
    assert_eq!(result, Err(LifecycleError::IllegalAddress { addr: 0x8080 }));
    assert_eq!(kernel.worker_count(), 0);
}

#[test]
fn test_unwritable_result_slot_rejected() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.allow_write_slot(0x9000);
    let broker = broker_on(&kernel);

    let result = broker.start(7, None, Some(0x9004), None);
    assert_eq!(result, Err(LifecycleError::IllegalAddress { addr: 0x9004 }));
    assert_eq!(kernel.worker_count(), 0);
}

#[test]
fn test_malformed_options_rejected() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    let broker = broker_on(&kernel);

    let bad = TransitionOptions {
        size: 0,
        ..TransitionOptions::new()
    };
    assert_eq!(
        broker.start(7, None, None, Some(&bad)),
        Err(LifecycleError::InvalidOption)
    );
    assert_eq!(kernel.worker_count(), 0);
}

#[test]
fn test_default_scheduling_options_round_trip() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    let broker = broker_on(&kernel);

    broker
        .start(7, Some(ArgRegion::new(0x8000, 1)), None, None)
        .unwrap();

    let descriptor = kernel.dispatched()[0];
    assert_eq!(descriptor.options, SchedulingOptions::default());
    assert_eq!(descriptor.options.stack_partition, 0);
    assert_eq!(descriptor.options.stack_size, 0);
    assert_eq!(descriptor.options.priority, 0);
    assert_eq!(descriptor.options.attributes, 0);
}

#[test]
fn test_supplied_options_forwarded_verbatim() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    let broker = broker_on(&kernel);

    let opt = TransitionOptions {
        stack_partition: 2,
        stack_size: 0x4000,
        priority: 64,
        attributes: WorkerAttributes::STACK_LOW.bits(),
        ..TransitionOptions::new()
    };
    broker.start(7, None, None, Some(&opt)).unwrap();

    let descriptor = kernel.dispatched()[0];
    assert_eq!(descriptor.options.stack_partition, 2);
    assert_eq!(descriptor.options.stack_size, 0x4000);
    assert_eq!(descriptor.options.priority, 64);
    assert_eq!(descriptor.options.attributes, WorkerAttributes::STACK_LOW.bits());
}

#[test]
fn test_stop_records_caller_identity() {
    let kernel = kernel_with_started_module(7);
    // A second module issues the stop
    kernel.add_module(3, ModuleFlags::empty(), 0x0050_0000, 0x1000);
    let broker = broker_on(&kernel);

    let ctx = CallerContext::new(0x0050_0080, false);
    broker.stop(&ctx, 7, None, None, None).unwrap();

    let descriptor = kernel.dispatched()[0];
    assert_eq!(descriptor.target, 7);
    assert_eq!(descriptor.caller, Some(3));
    assert_eq!(descriptor.mode_start, TransitionCommand::Stop);
    assert_eq!(descriptor.mode_finish, TransitionCommand::Stop);
    assert_eq!(kernel.module_state(7), Some(ModuleState::Stopped));
}

#[test]
fn test_stop_from_unknown_code_refused() {
    let kernel = kernel_with_started_module(7);
    let broker = broker_on(&kernel);

    // Return address maps to no registered module
    let ctx = CallerContext::new(0x0099_0000, false);
    assert_eq!(
        broker.stop(&ctx, 7, None, None, None),
        Err(LifecycleError::ModuleCannotStop)
    );
    assert_eq!(kernel.worker_count(), 0);
}

#[test]
fn test_stop_fast_rejects_protected_target_without_spawning() {
    let kernel = MockKernel::new();
    kernel.add_module(3, ModuleFlags::empty(), 0x0050_0000, 0x1000);
    kernel.add_module(7, ModuleFlags::CANT_STOP, MOD_BASE, MOD_SIZE);
    kernel.set_module_state(7, ModuleState::Started);

    // Scheduler stub that must never be reached
    struct NoSpawn;
    impl WorkerScheduler for NoSpawn {
        fn spawn_transition(&self, _: OperationDescriptor) -> std::result::Result<WorkerId, SpawnError> {
            panic!("fast-rejected stop must not create a worker");
        }
        fn terminate_current(&self, _: i32) {
            panic!("fast-rejected stop must not terminate the caller");
        }
    }

    let broker = ModuleBroker::new(kernel.clone(), NoSpawn, kernel.clone());
    let ctx = CallerContext::new(0x0050_0080, false);
    assert_eq!(
        broker.stop(&ctx, 7, None, None, None),
        Err(LifecycleError::ModuleCannotStop)
    );

    // The registry's transition primitive was never invoked either
    assert_eq!(kernel.transitions_performed(), 0);
}

#[test]
fn test_stop_fast_rejects_protected_caller() {
    let kernel = kernel_with_started_module(7);
    kernel.add_module(3, ModuleFlags::CANT_STOP, 0x0050_0000, 0x1000);
    let broker = broker_on(&kernel);

    let ctx = CallerContext::new(0x0050_0080, false);
    assert_eq!(
        broker.stop(&ctx, 7, None, None, None),
        Err(LifecycleError::ModuleCannotStop)
    );
    assert_eq!(kernel.worker_count(), 0);
}

#[test]
fn test_unload_allowed_from_stopped_state() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.set_module_state(7, ModuleState::Stopped);
    let broker = broker_on(&kernel);

    broker.unload(7).unwrap();
    assert_eq!(kernel.module_state(7), Some(ModuleState::Unloaded));
}

#[test]
fn test_repeated_unload_creates_one_worker_per_call() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.set_module_state(7, ModuleState::Unloaded);
    let broker = broker_on(&kernel);

    // The broker does not deduplicate; each accepted call gets a worker
    broker.unload(7).unwrap();
    broker.unload(7).unwrap();

    assert_eq!(kernel.worker_count(), 2);
    assert_eq!(kernel.transitions_performed(), 2);
}

#[test]
fn test_self_stop_unload_terminates_caller_with_status() {
    let kernel = kernel_with_started_module(9);
    let broker = broker_on(&kernel);
    let ctx = ctx_inside_module();

    broker
        .stop_unload_self_with_status(&ctx, -7, None, None, None)
        .expect("self teardown should dispatch");

    // One combined descriptor: STOP first, then UNLOAD, self-addressed
    let descriptor = kernel.dispatched()[0];
    assert_eq!(descriptor.mode_start, TransitionCommand::Stop);
    assert_eq!(descriptor.mode_finish, TransitionCommand::Unload);
    assert_eq!(descriptor.target, 9);
    assert_eq!(descriptor.caller, Some(9));

    // Caller context terminated with the exact status supplied
    assert_eq!(kernel.terminations(), vec![-7]);

    // The worker took the module all the way down
    assert_eq!(kernel.module_state(9), Some(ModuleState::Unloaded));
}

#[test]
fn test_self_stop_unload_default_status_is_success() {
    let kernel = kernel_with_started_module(9);
    let broker = broker_on(&kernel);

    broker
        .stop_unload_self(&ctx_inside_module(), None, None, None)
        .unwrap();

    assert_eq!(kernel.terminations(), vec![STATUS_OK]);
}

#[test]
fn test_self_stop_unload_survives_failed_dispatch() {
    let kernel = kernel_with_started_module(9);
    kernel.fail_next_spawn(SpawnError::ResourceExhausted);
    let broker = broker_on(&kernel);

    let result = broker.stop_unload_self_with_status(&ctx_inside_module(), -7, None, None, None);
    assert_eq!(
        result,
        Err(LifecycleError::Dispatch(SpawnError::ResourceExhausted))
    );

    // The calling context must still be alive and the module untouched
    assert!(kernel.terminations().is_empty());
    assert_eq!(kernel.module_state(9), Some(ModuleState::Started));
}

#[test]
fn test_self_stop_from_protected_module_refused() {
    let kernel = MockKernel::new();
    kernel.add_module(9, ModuleFlags::CANT_STOP, MOD_BASE, MOD_SIZE);
    kernel.set_module_state(9, ModuleState::Started);
    let broker = broker_on(&kernel);

    let result = broker.stop_unload_self(&ctx_inside_module(), None, None, None);
    assert_eq!(result, Err(LifecycleError::ModuleCannotStop));
    assert!(kernel.terminations().is_empty());
    assert_eq!(kernel.worker_count(), 0);
}

#[test]
fn test_user_mode_self_stop_ignores_forged_return_address() {
    let kernel = kernel_with_started_module(9);
    // Another module the forger pretends to be
    kernel.add_module(3, ModuleFlags::empty(), 0x0050_0000, 0x1000);
    kernel.set_syscall_return_address(MOD_BASE + 0x200);
    let broker = broker_on(&kernel);

    // In-frame address points into module 3, but the syscall entered from 9
    let ctx = CallerContext::new(0x0050_0080, true);
    broker.stop_unload_self(&ctx, None, None, None).unwrap();

    let descriptor = kernel.dispatched()[0];
    assert_eq!(descriptor.target, 9);
    assert_eq!(kernel.module_state(9), Some(ModuleState::Unloaded));
    assert_eq!(kernel.module_state(3), Some(ModuleState::Loaded));
}

#[test]
fn test_self_stop_with_inaccessible_return_address() {
    let kernel = kernel_with_started_module(9);
    // Strict memory: only the module's own code window is readable
    kernel.allow_read(MOD_BASE, MOD_SIZE);
    kernel.set_syscall_return_address(0x00f0_0000);
    let broker = broker_on(&kernel);

    let ctx = CallerContext::new(MOD_BASE + 0x100, true);
    let result = broker.stop_unload_self(&ctx, None, None, None);
    assert_eq!(
        result,
        Err(LifecycleError::IllegalAddress { addr: 0x00f0_0000 })
    );
    assert_eq!(kernel.worker_count(), 0);
    assert!(kernel.terminations().is_empty());
}

#[test]
fn test_result_slot_not_written_until_worker_runs() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.defer_execution();
    let broker = broker_on(&kernel);

    broker.start(7, None, Some(0x9000), None).unwrap();

    // Dispatch returned, but the transition outcome is not visible yet
    assert_eq!(kernel.worker_count(), 1);
    assert_eq!(kernel.result_at(0x9000), None);
    assert_eq!(kernel.module_state(7), Some(ModuleState::Loaded));

    kernel.run_pending();
    assert_eq!(kernel.result_at(0x9000), Some(status::OK));
    assert_eq!(kernel.module_state(7), Some(ModuleState::Started));
}

#[test]
fn test_worker_reports_registry_failure_through_result_slot() {
    let kernel = MockKernel::new();
    kernel.add_module(7, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    let broker = broker_on(&kernel);

    // Starting twice: the second dispatch succeeds, the transition fails
    broker.start(7, None, Some(0x9000), None).unwrap();
    let second = broker.start(7, None, Some(0x9004), None);

    assert!(second.is_ok());
    assert_eq!(kernel.result_at(0x9004), Some(status::ERR_ALREADY_STARTED));
    assert_eq!(kernel.module_state(7), Some(ModuleState::Started));
}

#[test]
fn test_full_module_lifecycle() {
    let kernel = MockKernel::new();
    kernel.add_module(5, ModuleFlags::empty(), MOD_BASE, MOD_SIZE);
    kernel.add_module(1, ModuleFlags::empty(), 0x0060_0000, 0x1000);
    let broker = broker_on(&kernel);

    broker.start(5, Some(ArgRegion::new(0x8000, 4)), Some(0x9000), None).unwrap();
    assert_eq!(kernel.module_state(5), Some(ModuleState::Started));

    let ctx = CallerContext::new(0x0060_0010, false);
    broker.stop(&ctx, 5, None, Some(0x9004), None).unwrap();
    assert_eq!(kernel.module_state(5), Some(ModuleState::Stopped));

    broker.unload(5).unwrap();
    assert_eq!(kernel.module_state(5), Some(ModuleState::Unloaded));

    assert_eq!(kernel.worker_count(), 3);
    assert_eq!(kernel.result_at(0x9000), Some(status::OK));
    assert_eq!(kernel.result_at(0x9004), Some(status::OK));
}
