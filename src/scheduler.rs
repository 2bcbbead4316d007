//! The interleaving engine: registry of operations/resources, scheduling
//! point serialisation, wait/signal semantics, deadlock and termination
//! detection.
//!
//! One lock guards one registry struct, with `log::debug!`/`log::trace!`
//! on every state transition. Host threads are serialised with a `Condvar`
//! per operation, each woken individually by id rather than through a
//! single broadcast condvar shared by everyone.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::ErrorCode;
use crate::operation::{Operation, OperationId, OperationStatus, WaitTarget};
use crate::resource::{Resource, ResourceId};
use crate::settings::Settings;
use crate::strategy::{Strategy, StrategyKind};

/// Reserved id of the operation created implicitly by `attach` and
/// completed implicitly by `detach`.
pub const MAIN_OPERATION_ID: OperationId = 0;

struct SchedulerState {
    operations: BTreeMap<OperationId, Operation>,
    resources: BTreeMap<ResourceId, Resource>,
    /// target operation id -> ids of operations parked in `join_operation(s)`.
    completion_waiters: BTreeMap<OperationId, BTreeSet<OperationId>>,
    condvars: BTreeMap<OperationId, Arc<Condvar>>,
    scheduled_op_id: Option<OperationId>,
    attached: bool,
    iteration_index: u64,
    strategy: StrategyKind,
    last_error: ErrorCode,
}

impl SchedulerState {
    fn new(settings: &Settings) -> Self {
        SchedulerState {
            operations: BTreeMap::new(),
            resources: BTreeMap::new(),
            completion_waiters: BTreeMap::new(),
            condvars: BTreeMap::new(),
            scheduled_op_id: None,
            attached: false,
            iteration_index: 0,
            strategy: StrategyKind::from_settings(settings),
            last_error: ErrorCode::Success,
        }
    }
}

/// The controlled concurrency scheduler. One instance is shared (typically
/// behind an `Arc`) by every host thread participating in an iteration.
pub struct Scheduler {
    settings: Settings,
    state: Mutex<SchedulerState>,
    /// Notified whenever `advance` runs, so a caller parked waiting for a
    /// not-yet-started operation can re-check the enabled set.
    advance_cv: Condvar,
}

impl Scheduler {
    pub fn new(settings: Settings) -> Self {
        let state = SchedulerState::new(&settings);
        Scheduler {
            settings,
            state: Mutex::new(state),
            advance_cv: Condvar::new(),
        }
    }

    /// Acquires the lock and performs the sticky-error / attached checks
    /// every entry point (other than `attach` and `detach`) begins with.
    fn begin(&self) -> (MutexGuard<'_, SchedulerState>, Option<ErrorCode>) {
        let guard = self.state.lock().unwrap();
        if !guard.attached {
            return (guard, Some(Self::misuse(ErrorCode::ClientNotAttached)));
        }
        if guard.last_error != ErrorCode::Success {
            let sticky = guard.last_error;
            return (guard, Some(sticky));
        }
        (guard, None)
    }

    /// Every misuse return funnels through here: state is left untouched,
    /// and the debug assertion keeps the classification in `ErrorCode`
    /// honest with how call sites actually use it.
    fn misuse(code: ErrorCode) -> ErrorCode {
        debug_assert!(code.is_misuse(), "{code:?} is not a misuse code");
        code
    }

    pub fn attach(&self) -> ErrorCode {
        let mut guard = self.state.lock().unwrap();
        if guard.attached {
            return Self::misuse(ErrorCode::ClientAttached);
        }

        guard.operations.clear();
        guard.resources.clear();
        guard.completion_waiters.clear();
        guard.condvars.clear();
        guard.last_error = ErrorCode::Success;
        guard.iteration_index += 1;
        guard.strategy = StrategyKind::from_settings(&self.settings);
        guard
            .strategy
            .prepare_for_iteration(self.settings.random_seed(), guard.iteration_index);

        let mut main_operation = Operation::new(MAIN_OPERATION_ID);
        main_operation.status = OperationStatus::Enabled;
        guard.operations.insert(MAIN_OPERATION_ID, main_operation);
        guard
            .condvars
            .insert(MAIN_OPERATION_ID, Arc::new(Condvar::new()));
        guard.scheduled_op_id = Some(MAIN_OPERATION_ID);
        guard.attached = true;

        log::debug!("attached, iteration {}", guard.iteration_index);
        ErrorCode::Success
    }

    pub fn detach(&self) -> ErrorCode {
        let mut guard = self.state.lock().unwrap();
        if !guard.attached {
            return Self::misuse(ErrorCode::ClientNotAttached);
        }

        let main_cv = guard
            .condvars
            .get(&MAIN_OPERATION_ID)
            .cloned()
            .expect("main operation's condvar exists while attached");

        guard = main_cv
            .wait_while(guard, |state| {
                !all_others_completed(state) && state.last_error == ErrorCode::Success
            })
            .unwrap();

        let result = if all_others_completed(&guard) {
            ErrorCode::Success
        } else {
            guard.last_error
        };

        log::debug!("detached, result={:?}", result);
        guard.attached = false;
        result
    }

    pub fn create_operation(&self, id: OperationId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        if id == MAIN_OPERATION_ID {
            return Self::misuse(ErrorCode::ExplicitMainOperationStart);
        }
        if guard.operations.contains_key(&id) {
            return Self::misuse(ErrorCode::DuplicateResource);
        }
        guard.operations.insert(id, Operation::new(id));
        guard.condvars.insert(id, Arc::new(Condvar::new()));
        log::trace!("operation {id} registered");
        ErrorCode::Success
    }

    pub fn start_operation(&self, id: OperationId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        if id == MAIN_OPERATION_ID {
            return Self::misuse(ErrorCode::ExplicitMainOperationStart);
        }
        let status = match guard.operations.get(&id) {
            Some(op) => op.status,
            None => return Self::misuse(ErrorCode::NotExistingResource),
        };
        if status != OperationStatus::None {
            return Self::misuse(ErrorCode::DuplicateOperationStart);
        }

        guard.operations.get_mut(&id).unwrap().status = OperationStatus::Enabled;
        log::trace!("operation {id} started, awaiting its turn");

        // Registering as Enabled is itself a scheduling event: without
        // this, a freshly-started operation would sit Enabled forever
        // with nobody ever electing it.
        let guard = self.advance(guard, id, false);
        guard.last_error
    }

    pub fn complete_operation(&self, id: OperationId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        if id == MAIN_OPERATION_ID {
            return Self::misuse(ErrorCode::ExplicitMainOperationComplete);
        }
        if !guard.operations.contains_key(&id) {
            return Self::misuse(ErrorCode::NotExistingResource);
        }

        guard.operations.get_mut(&id).unwrap().status = OperationStatus::Completed;
        log::debug!("operation {id} completed");
        wake_completion_waiters(&mut guard, id);

        let guard = self.advance(guard, id, true);
        guard.last_error
    }

    /// The scheduling point. Yields control to whichever operation the
    /// strategy elects next and blocks until control returns to the
    /// caller.
    pub fn schedule_next_operation(&self) -> ErrorCode {
        let (guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        let caller = guard
            .scheduled_op_id
            .expect("a scheduled operation always exists once attached");
        let guard = self.advance(guard, caller, false);
        guard.last_error
    }

    /// Alias kept for callers used to the shorter name.
    #[deprecated(note = "use schedule_next_operation")]
    pub fn schedule_next(&self) -> ErrorCode {
        self.schedule_next_operation()
    }

    pub fn create_resource(&self, rid: ResourceId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        if guard.resources.contains_key(&rid) {
            return Self::misuse(ErrorCode::DuplicateResource);
        }
        guard.resources.insert(rid, Resource::new(rid));
        log::trace!("resource {rid} created");
        ErrorCode::Success
    }

    pub fn delete_resource(&self, rid: ResourceId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        match guard.resources.get(&rid) {
            None => return Self::misuse(ErrorCode::NotExistingResource),
            Some(resource) if !resource.waiters.is_empty() => {
                // Deletion requires an empty waiter set. The taxonomy has
                // no dedicated "resource busy" code, so this misuse is
                // surfaced via the generic `Failure` without latching it:
                // like every other misuse it leaves state untouched,
                // including `last_error`, which is reserved for the
                // terminal deadlock/completion outcomes.
                return ErrorCode::Failure;
            }
            _ => {}
        }
        guard.resources.remove(&rid);
        log::trace!("resource {rid} deleted");
        ErrorCode::Success
    }

    pub fn wait_resource(&self, rid: ResourceId) -> ErrorCode {
        self.wait_resources(&[rid])
    }

    pub fn wait_resources(&self, rids: &[ResourceId]) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        if rids.is_empty() {
            let caller = guard.scheduled_op_id.unwrap();
            let guard = self.advance(guard, caller, false);
            return guard.last_error;
        }
        for &rid in rids {
            if !guard.resources.contains_key(&rid) {
                return Self::misuse(ErrorCode::NotExistingResource);
            }
        }

        let caller = guard
            .scheduled_op_id
            .expect("a scheduled operation always exists once attached");
        for &rid in rids {
            guard.resources.get_mut(&rid).unwrap().waiters.insert(caller);
        }
        let op = guard.operations.get_mut(&caller).unwrap();
        op.waited_resources
            .extend(rids.iter().map(|rid| WaitTarget::Resource(*rid)));
        op.status = OperationStatus::Waiting;
        log::trace!("operation {caller} waiting on resources {rids:?}");

        let guard = self.advance(guard, caller, false);
        guard.last_error
    }

    /// Broadcast-clear: every waiter of `rid` is re-enabled (once its
    /// other wait targets, if any, are also satisfied) and `rid`'s waiter
    /// set is cleared.
    pub fn signal_resource(&self, rid: ResourceId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        let waiters = match guard.resources.get_mut(&rid) {
            Some(resource) => std::mem::take(&mut resource.waiters),
            None => return Self::misuse(ErrorCode::NotExistingResource),
        };
        for waiter in waiters {
            if let Some(op) = guard.operations.get_mut(&waiter) {
                op.waited_resources.remove(&WaitTarget::Resource(rid));
                op.recompute_waiting_status();
            }
        }
        log::trace!("resource {rid} signalled (broadcast)");
        drop(guard);
        // A waiter just re-entered Enabled without going through `advance`:
        // wake anyone parked waiting on a not-yet-started operation so it
        // re-checks the enabled set.
        self.advance_cv.notify_all();
        ErrorCode::Success
    }

    /// Targeted: only `target_id` is re-enabled; every other waiter of
    /// `rid` remains parked.
    pub fn signal_resource_target(&self, rid: ResourceId, target_id: OperationId) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        match guard.resources.get_mut(&rid) {
            Some(resource) => {
                resource.waiters.remove(&target_id);
            }
            None => return Self::misuse(ErrorCode::NotExistingResource),
        }
        if let Some(op) = guard.operations.get_mut(&target_id) {
            op.waited_resources.remove(&WaitTarget::Resource(rid));
            op.recompute_waiting_status();
        }
        log::trace!("resource {rid} signalled (targeted at {target_id})");
        drop(guard);
        self.advance_cv.notify_all();
        ErrorCode::Success
    }

    pub fn join_operation(&self, id: OperationId) -> ErrorCode {
        self.join_operations(&[id])
    }

    pub fn join_operations(&self, ids: &[OperationId]) -> ErrorCode {
        let (mut guard, err) = self.begin();
        if let Some(e) = err {
            return e;
        }
        for &id in ids {
            if !guard.operations.contains_key(&id) {
                return Self::misuse(ErrorCode::NotExistingResource);
            }
        }

        let pending: Vec<OperationId> = ids
            .iter()
            .copied()
            .filter(|id| guard.operations[id].status != OperationStatus::Completed)
            .collect();
        if pending.is_empty() {
            return ErrorCode::Success;
        }

        let caller = guard
            .scheduled_op_id
            .expect("a scheduled operation always exists once attached");
        for &target in &pending {
            guard
                .completion_waiters
                .entry(target)
                .or_default()
                .insert(caller);
        }
        let op = guard.operations.get_mut(&caller).unwrap();
        op.waited_resources
            .extend(pending.iter().map(|id| WaitTarget::Completion(*id)));
        op.status = OperationStatus::Waiting;
        log::trace!("operation {caller} joining {pending:?}");

        let guard = self.advance(guard, caller, false);
        guard.last_error
    }

    pub fn next_integer(&self, bound: usize) -> usize {
        let mut guard = self.state.lock().unwrap();
        guard.strategy.next_integer(bound)
    }

    pub fn next_boolean(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        guard.strategy.next_boolean()
    }

    pub fn seed(&self) -> u64 {
        self.settings.random_seed()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.state.lock().unwrap().last_error
    }

    #[deprecated(note = "use error_code")]
    pub fn get_last_error_code(&self) -> ErrorCode {
        self.error_code()
    }

    /// Common core of every scheduling point:
    ///
    /// 1. Build the enabled set.
    /// 2. If it's empty and every other operation is `Completed`, the
    ///    iteration is over.
    /// 3. If it's empty, nothing else is `Completed`, but at least one
    ///    operation is still `None` (registered but its host thread hasn't
    ///    reached `start_operation` yet), nothing can be concluded: park
    ///    and re-evaluate once that changes, rather than declaring
    ///    deadlock on a program that merely hasn't finished starting up.
    /// 4. Otherwise (empty, nothing `None`, nothing completed) every live
    ///    operation is `Waiting` on something that will never resolve:
    ///    deadlock.
    /// 5. Elect the chosen operation, wake it, and park the caller until
    ///    control returns (unless the caller just completed, in which
    ///    case it never resumes).
    fn advance(
        &self,
        mut guard: MutexGuard<'_, SchedulerState>,
        caller: OperationId,
        caller_completed: bool,
    ) -> MutexGuard<'_, SchedulerState> {
        // Every call into `advance` follows a status change the caller just
        // made (started, completed, or began waiting); wake anyone parked
        // in the pending-start retry loop below so it can re-evaluate.
        self.advance_cv.notify_all();

        let next_id = loop {
            let enabled = enabled_operations(&guard);
            if !enabled.is_empty() {
                let current = guard.scheduled_op_id;
                let choice = guard.strategy.next(&enabled, current);
                log::trace!("strategy elected operation {choice}");
                break choice;
            }

            if all_others_completed(&guard) {
                guard.last_error = ErrorCode::CompletedAllOperations;
                log::debug!("all operations completed");
                break MAIN_OPERATION_ID;
            }

            if has_pending_start(&guard) {
                if caller_completed {
                    // Nothing left for the completing caller to do; the
                    // outcome is decided later, by whichever call empties
                    // the enabled set once every operation has started.
                    return guard;
                }
                log::trace!(
                    "operation {caller} waiting for a not-yet-started operation to register"
                );
                guard = self
                    .advance_cv
                    .wait_while(guard, |state| {
                        enabled_operations(state).is_empty()
                            && !all_others_completed(state)
                            && has_pending_start(state)
                    })
                    .unwrap();
                continue;
            }

            guard.last_error = ErrorCode::Failure;
            log::debug!("no enabled operations remain and none are pending start: deadlock");
            break MAIN_OPERATION_ID;
        };

        guard.scheduled_op_id = Some(next_id);

        if next_id != caller {
            if let Some(cv) = guard.condvars.get(&next_id).cloned() {
                cv.notify_all();
            }
        }

        if caller_completed || next_id == caller {
            return guard;
        }

        let caller_cv = guard
            .condvars
            .get(&caller)
            .cloned()
            .expect("condvar registered for every live operation");
        caller_cv
            .wait_while(guard, |state| {
                state.scheduled_op_id != Some(caller)
                    && state.operations.get(&caller).map(|op| op.status)
                        != Some(OperationStatus::Completed)
            })
            .unwrap()
    }
}

/// The main operation is bookkeeping for `detach`'s own wait, not a
/// scheduling participant: it is never started or completed explicitly,
/// so it is excluded here and from [`all_others_completed`].
fn enabled_operations(state: &SchedulerState) -> Vec<OperationId> {
    state
        .operations
        .iter()
        .filter(|(id, op)| **id != MAIN_OPERATION_ID && op.status == OperationStatus::Enabled)
        .map(|(id, _)| *id)
        .collect()
}

/// Whether some non-main operation is registered but hasn't been started
/// yet, i.e. its host thread hasn't called `start_operation`.
fn has_pending_start(state: &SchedulerState) -> bool {
    state
        .operations
        .iter()
        .any(|(id, op)| *id != MAIN_OPERATION_ID && op.status == OperationStatus::None)
}

fn wake_completion_waiters(guard: &mut SchedulerState, completed: OperationId) {
    if let Some(waiters) = guard.completion_waiters.remove(&completed) {
        for waiter in waiters {
            if let Some(op) = guard.operations.get_mut(&waiter) {
                op.waited_resources.remove(&WaitTarget::Completion(completed));
                op.recompute_waiting_status();
            }
        }
    }
}

fn all_others_completed(state: &SchedulerState) -> bool {
    state
        .operations
        .iter()
        .filter(|(id, _)| **id != MAIN_OPERATION_ID)
        .all(|(_, op)| op.status == OperationStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    fn scheduler_with(seed: u64, probability: usize) -> StdArc<Scheduler> {
        let mut settings = Settings::new();
        settings.use_random_strategy_with_probability(seed, probability);
        StdArc::new(Scheduler::new(settings))
    }

    #[test]
    fn misuse_calls_return_without_mutating_state() {
        let scheduler = scheduler_with(1, 100);
        assert_eq!(scheduler.start_operation(7), ErrorCode::ClientNotAttached);
        assert_eq!(scheduler.attach(), ErrorCode::Success);
        assert_eq!(scheduler.attach(), ErrorCode::ClientAttached);
        assert_eq!(scheduler.start_operation(0), ErrorCode::ExplicitMainOperationStart);
        assert_eq!(
            scheduler.complete_operation(0),
            ErrorCode::ExplicitMainOperationComplete
        );
        assert_eq!(scheduler.create_operation(5), ErrorCode::Success);
        assert_eq!(scheduler.create_operation(5), ErrorCode::DuplicateResource);
        assert_eq!(scheduler.start_operation(7), ErrorCode::NotExistingResource);
    }

    #[test]
    fn two_operations_alternate_under_lock_without_racing() {
        let scheduler = scheduler_with(42, 100);
        assert_eq!(scheduler.attach(), ErrorCode::Success);
        assert_eq!(scheduler.create_resource(1), ErrorCode::Success);
        assert_eq!(scheduler.create_operation(1), ErrorCode::Success);
        assert_eq!(scheduler.create_operation(2), ErrorCode::Success);

        let shared = StdArc::new(Mutex::new(0));
        let lock_held = StdArc::new(Mutex::new(false));

        let spawn_worker = |id: OperationId,
                             scheduler: StdArc<Scheduler>,
                             shared: StdArc<Mutex<i32>>,
                             lock_held: StdArc<Mutex<bool>>| {
            thread::spawn(move || {
                scheduler.start_operation(id);
                loop {
                    scheduler.schedule_next_operation();
                    let mut held = lock_held.lock().unwrap();
                    if !*held {
                        *held = true;
                        break;
                    }
                    drop(held);
                    scheduler.wait_resource(1);
                }
                *shared.lock().unwrap() = id as i32;
                scheduler.schedule_next_operation();
                assert_eq!(*shared.lock().unwrap(), id as i32);
                *lock_held.lock().unwrap() = false;
                scheduler.signal_resource(1);
                scheduler.complete_operation(id);
            })
        };

        let t1 = spawn_worker(1, scheduler.clone(), shared.clone(), lock_held.clone());
        let t2 = spawn_worker(2, scheduler.clone(), shared.clone(), lock_held.clone());

        assert_eq!(scheduler.detach(), ErrorCode::Success);
        assert_eq!(scheduler.error_code(), ErrorCode::CompletedAllOperations);

        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    fn join_operation_returns_immediately_for_completed_target() {
        let scheduler = scheduler_with(3, 100);
        assert_eq!(scheduler.attach(), ErrorCode::Success);
        assert_eq!(scheduler.create_operation(1), ErrorCode::Success);

        let worker = {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                scheduler.start_operation(1);
                scheduler.complete_operation(1);
            })
        };

        assert_eq!(scheduler.detach(), ErrorCode::Success);
        worker.join().unwrap();
    }

    #[test]
    fn delete_resource_with_waiters_is_refused() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::mpsc;
        use std::time::Duration;

        let scheduler = scheduler_with(1, 100);
        assert_eq!(scheduler.attach(), ErrorCode::Success);
        assert_eq!(scheduler.create_resource(9), ErrorCode::Success);
        assert_eq!(scheduler.create_operation(1), ErrorCode::Success);
        assert_eq!(scheduler.create_operation(2), ErrorCode::Success);

        let stop = StdArc::new(AtomicBool::new(false));
        let (about_to_wait_tx, about_to_wait_rx) = mpsc::channel();

        // Operation 2 just keeps the enabled set non-empty so operation 1
        // waiting on resource 9 is a live wait, not a declared deadlock,
        // giving `delete_resource` a real waiter to refuse against.
        let keepalive = {
            let scheduler = scheduler.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                scheduler.start_operation(2);
                while !stop.load(Ordering::SeqCst) {
                    scheduler.schedule_next_operation();
                }
                scheduler.complete_operation(2);
            })
        };

        let waiter = {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                scheduler.start_operation(1);
                about_to_wait_tx.send(()).unwrap();
                scheduler.wait_resource(9);
                scheduler.complete_operation(1);
            })
        };

        about_to_wait_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));

        // Best-effort: usually observes operation 1 already parked on
        // resource 9 and refused with `Failure`; on the rare race where
        // operation 1 hasn't registered yet, deletion succeeds instead.
        // Either is a legitimate outcome, so only the non-panicking
        // contract is asserted here.
        let _ = scheduler.delete_resource(9);
        scheduler.signal_resource(9);

        stop.store(true, Ordering::SeqCst);
        assert_eq!(scheduler.detach(), ErrorCode::Success);
        waiter.join().unwrap();
        keepalive.join().unwrap();
    }
}
