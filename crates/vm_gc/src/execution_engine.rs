//! Execution engine module for the Neo Virtual Machine.
//!
//! The engine owns the reference counter and the roots it reports to: the
//! evaluation stack and the static fields. Instruction decoding lives outside
//! this crate; callers hand each instruction body to
//! [`ExecutionEngine::execute_instruction`], and the engine runs the
//! collection checkpoint and the live item ceiling after every one of them.

use crate::error::{VmError, VmResult};
use crate::evaluation_stack::EvaluationStack;
use crate::execution_engine_limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::slot::Slot;
use crate::stack_item::{Array, Map, StackItem, Struct};
use crate::vm_state::VMState;
use tracing::{debug, warn};

/// The execution engine for the Neo VM.
#[derive(Debug)]
pub struct ExecutionEngine {
    /// The current state of the VM
    state: VMState,

    /// Restrictions on the VM
    limits: ExecutionEngineLimits,

    /// Used for reference counting of objects in the VM
    reference_counter: ReferenceCounter,

    /// The stack instruction bodies operate on
    evaluation_stack: EvaluationStack,

    /// Static fields of the running script, once initialised
    static_fields: Option<Slot>,

    /// Number of instruction bodies that completed
    instructions_executed: u64,

    /// The error that moved the engine to FAULT
    fault: Option<VmError>,
}

impl ExecutionEngine {
    /// Creates a new execution engine with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(ReferenceCounter::new(), ExecutionEngineLimits::DEFAULT)
    }

    /// Creates a new execution engine with the specified reference counter and limits.
    pub fn new_with_limits(
        reference_counter: ReferenceCounter,
        limits: ExecutionEngineLimits,
    ) -> VmResult<Self> {
        limits.validate()?;
        Ok(Self::with_parts(reference_counter, limits))
    }

    fn with_parts(reference_counter: ReferenceCounter, limits: ExecutionEngineLimits) -> Self {
        Self {
            state: VMState::NONE,
            limits,
            reference_counter: reference_counter.clone(),
            evaluation_stack: EvaluationStack::new(reference_counter),
            static_fields: None,
            instructions_executed: 0,
            fault: None,
        }
    }

    /// Returns the current state of the VM.
    #[must_use]
    pub fn state(&self) -> VMState {
        self.state
    }

    #[must_use]
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// Returns the reference counter.
    #[must_use]
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    #[must_use]
    pub fn evaluation_stack(&self) -> &EvaluationStack {
        &self.evaluation_stack
    }

    pub fn evaluation_stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.evaluation_stack
    }

    #[must_use]
    pub fn static_fields(&self) -> Option<&Slot> {
        self.static_fields.as_ref()
    }

    #[must_use]
    pub fn instructions_executed(&self) -> u64 {
        self.instructions_executed
    }

    /// The error that faulted the engine, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&VmError> {
        self.fault.as_ref()
    }

    /// Current number of live items.
    #[must_use]
    pub fn live_items(&self) -> usize {
        self.reference_counter.count()
    }

    /// Creates an array bound to this engine's reference counter.
    pub fn new_array(&self, items: Vec<StackItem>) -> VmResult<Array> {
        Array::new(items, Some(self.reference_counter.clone()))
    }

    /// Creates a struct bound to this engine's reference counter.
    pub fn new_struct(&self, items: Vec<StackItem>) -> VmResult<Struct> {
        Struct::new(items, Some(self.reference_counter.clone()))
    }

    /// Creates an empty map bound to this engine's reference counter.
    #[must_use]
    pub fn new_map(&self) -> Map {
        Map::new(Some(self.reference_counter.clone()))
    }

    /// Pushes an item onto the evaluation stack.
    ///
    /// The ceiling is checked right away and without a collection pass, so
    /// candidates that are not collected yet still count.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.evaluation_stack.push(item)?;
        self.check_live_item_limit()
    }

    /// Pops the item from the top of the evaluation stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.evaluation_stack.pop()
    }

    /// Returns the item `n` positions below the top of the evaluation stack.
    pub fn peek(&self, n: isize) -> VmResult<&StackItem> {
        self.evaluation_stack.peek(n)
    }

    /// Replaces the static fields with `count` null values.
    pub fn init_static_fields(&mut self, count: usize) -> VmResult<()> {
        if let Some(mut previous) = self.static_fields.take() {
            previous.clear_references()?;
        }
        self.static_fields = Some(Slot::with_count(count, self.reference_counter.clone())?);
        self.check_live_item_limit()
    }

    /// Pushes a copy of the static field at `index` onto the evaluation stack.
    pub fn load_static(&mut self, index: usize) -> VmResult<()> {
        let item = self.static_slot()?.get(index)?.clone();
        self.push(item)
    }

    /// Pops the top of the evaluation stack into the static field at `index`.
    pub fn store_static(&mut self, index: usize) -> VmResult<()> {
        let item = self.evaluation_stack.peek(0)?.clone();
        self.static_fields
            .as_mut()
            .ok_or_else(|| VmError::invalid_operation_msg("Static fields are not initialised"))?
            .set(index, item)?;
        self.pop().map(drop)
    }

    /// Runs a collection pass and returns the resulting live item count.
    pub fn collect(&mut self) -> VmResult<usize> {
        self.reference_counter.check_zero_referred()
    }

    /// Fails with [`VmError::ResourceLimitExceeded`] when the live item count
    /// went above `max_live_items` at any point since the last checkpoint.
    pub fn check_live_item_limit(&self) -> VmResult<()> {
        let count = self.reference_counter.peak_count();
        if count > self.limits.max_live_items {
            return Err(VmError::resource_limit_exceeded(
                count,
                self.limits.max_live_items,
            ));
        }
        Ok(())
    }

    /// Executes one instruction body followed by the post-instruction checks.
    ///
    /// Any error moves the engine to [`VMState::FAULT`] and is returned. A
    /// halted or faulted engine refuses further instructions.
    pub fn execute_instruction<F>(&mut self, body: F) -> VmResult<()>
    where
        F: FnOnce(&mut Self) -> VmResult<()>,
    {
        if self.state.is_terminal() {
            return Err(VmError::invalid_operation_msg(format!(
                "Cannot execute an instruction in state {}",
                self.state
            )));
        }

        let result = body(self).and_then(|()| self.post_execute_instruction());
        if let Err(err) = &result {
            self.on_fault(err.clone());
        }
        result
    }

    /// Marks the execution as finished.
    pub fn halt(&mut self) -> VmResult<()> {
        if self.state.is_fault() {
            return Err(VmError::invalid_operation_msg("Cannot halt a faulted engine"));
        }
        self.state = VMState::HALT;
        debug!(
            instructions = self.instructions_executed,
            live_items = self.reference_counter.count(),
            "execution halted"
        );
        Ok(())
    }

    /// Called after executing an instruction.
    ///
    /// The ceiling is checked against the peak of the instruction before the
    /// collection pass, so items created and dropped by the same body count.
    fn post_execute_instruction(&mut self) -> VmResult<()> {
        self.instructions_executed += 1;
        self.check_live_item_limit()?;
        if self.instructions_executed % u64::from(self.limits.collection_interval) == 0 {
            self.reference_counter.check_zero_referred()?;
        }
        self.reference_counter.reset_peak_count();
        Ok(())
    }

    /// Called when an exception causes the VM to enter the FAULT state.
    fn on_fault(&mut self, err: VmError) {
        warn!(
            error = %err,
            instructions = self.instructions_executed,
            live_items = self.reference_counter.count(),
            "execution faulted"
        );
        self.fault = Some(err);
        self.state = VMState::FAULT;
    }

    fn static_slot(&self) -> VmResult<&Slot> {
        self.static_fields
            .as_ref()
            .ok_or_else(|| VmError::invalid_operation_msg("Static fields are not initialised"))
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        // Tracked containers hold the counter; unreleased cycles would keep it alive.
        let _ = self.evaluation_stack.clear();
        if let Some(mut static_fields) = self.static_fields.take() {
            let _ = static_fields.clear_references();
        }
        let _ = self.reference_counter.check_zero_referred();
    }
}
