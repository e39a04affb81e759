// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Saga coordinator for one tracked file.
//!
//! A [`Transaction`] owns an ordered list of operations and executes them
//! with all-or-nothing effect on the filesystem. The state machine is
//!
//! ```text
//! Building -> Executing -> Committed
//!                       \-> RolledBack
//! ```
//!
//! Operations may only be added while building. Execution runs strictly in
//! insertion order; the first failing step stops the run, the failing step
//! and every step before it are rolled back in strict reverse order, and
//! the transaction reports the original failure together with any rollback
//! failures. Rollback failures never mask the original cause.
//!
//! Rollback is a consequence of failed execution, not a retry mechanism: a
//! committed transaction can only be undone through the explicit
//! [`Transaction::undo`], which applies the same reverse-order guarantee.

use crate::link::op::{OpError, Operation};

use tracing::{debug, instrument, warn};

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Accepting operations.
    #[default]
    Building,

    /// Mid-execution.
    Executing,

    /// Every operation executed; effects are live on the filesystem.
    Committed,

    /// Execution failed and completed steps were unwound.
    RolledBack,
}

/// Ordered sequence of operations executed with all-or-nothing semantics.
pub struct Transaction {
    owner: String,
    operations: Vec<Box<dyn Operation>>,
    executed: usize,
    state: TxState,
}

impl Transaction {
    /// Construct an empty transaction for one tracked file.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            operations: Vec::new(),
            executed: 0,
            state: TxState::Building,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Name of the tracked file this transaction belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queue an operation.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::NotBuilding`] unless the transaction is
    ///   still in the building state.
    pub fn push(&mut self, operation: Box<dyn Operation>) -> Result<()> {
        if self.state != TxState::Building {
            return Err(TransactionError::NotBuilding { state: self.state });
        }

        self.operations.push(operation);
        Ok(())
    }

    /// Execute all queued operations in insertion order.
    ///
    /// On success the transaction commits. On the first failing step,
    /// execution stops, the failing step and all completed steps are
    /// rolled back in strict reverse order, and the transaction reports
    /// the failure.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::NotBuilding`] if already executed.
    /// - Return [`TransactionError::StepFailed`] naming the failing step,
    ///   its cause, and any rollback failures.
    #[instrument(skip(self), fields(owner = %self.owner), level = "debug")]
    pub fn execute(&mut self) -> Result<()> {
        if self.state != TxState::Building {
            return Err(TransactionError::NotBuilding { state: self.state });
        }
        self.state = TxState::Executing;

        for index in 0..self.operations.len() {
            debug!("step {index}: {}", self.operations[index].describe());
            if let Err(source) = self.operations[index].execute() {
                let step = self.operations[index].describe();
                warn!("step {index} ({step}) failed, rolling back");

                // INVARIANT: Unwind in strict reverse order, starting with
                // the failed step's own partial effects.
                let rollback_failures = self.unwind(index);
                self.state = TxState::RolledBack;

                return Err(TransactionError::StepFailed {
                    owner: self.owner.clone(),
                    index,
                    step,
                    source,
                    rollback_failures,
                });
            }
            self.executed = index + 1;
        }

        self.state = TxState::Committed;
        Ok(())
    }

    /// Undo a committed transaction, rolling back every operation in
    /// strict reverse order.
    ///
    /// # Errors
    ///
    /// - Return [`TransactionError::NotCommitted`] unless committed.
    /// - Return [`TransactionError::UndoFailed`] carrying every rollback
    ///   failure encountered.
    pub fn undo(&mut self) -> Result<()> {
        if self.state != TxState::Committed {
            return Err(TransactionError::NotCommitted { state: self.state });
        }

        let failures = if self.executed == 0 {
            Vec::new()
        } else {
            self.unwind(self.executed - 1)
        };
        self.state = TxState::RolledBack;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::UndoFailed {
                owner: self.owner.clone(),
                failures,
            })
        }
    }

    /// Roll back operations `from` down to 0, collecting failures instead
    /// of short-circuiting.
    fn unwind(&mut self, from: usize) -> Vec<OpError> {
        let mut failures = Vec::new();
        for index in (0..=from).rev() {
            debug!("rolling back step {index}: {}", self.operations[index].describe());
            if let Err(err) = self.operations[index].rollback() {
                warn!("rollback of step {index} failed: {err}");
                failures.push(err);
            }
        }

        failures
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Transaction")
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("operations", &self.operations.len())
            .field("executed", &self.executed)
            .finish()
    }
}

fn join_failures(failures: &[OpError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Transaction error types.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Operations can only be added or executed while building.
    #[error("transaction already ran (state {state:?})")]
    NotBuilding { state: TxState },

    /// Explicit undo requires a committed transaction.
    #[error("cannot undo a transaction that is not committed (state {state:?})")]
    NotCommitted { state: TxState },

    /// A step failed; completed steps were rolled back.
    ///
    /// Rollback failures ride along without masking the original cause.
    #[error(
        "step {index} ({step}) of '{owner}' failed{}",
        if rollback_failures.is_empty() {
            String::new()
        } else {
            format!("; rollback incomplete: {}", join_failures(rollback_failures))
        }
    )]
    StepFailed {
        owner: String,
        index: usize,
        step: String,
        #[source]
        source: OpError,
        rollback_failures: Vec<OpError>,
    },

    /// Explicit undo of a committed transaction hit failures.
    #[error("undo of '{owner}' incomplete: {}", join_failures(failures))]
    UndoFailed {
        owner: String,
        failures: Vec<OpError>,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TransactionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, rc::Rc};

    /// Records every execute/rollback call in a shared log so tests can
    /// assert exact invocation order across a whole transaction.
    struct ProbeOp {
        id: usize,
        fail_on_execute: bool,
        fail_on_rollback: bool,
        executed: bool,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ProbeOp {
        fn ok(id: usize, log: &Rc<RefCell<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                id,
                fail_on_execute: false,
                fail_on_rollback: false,
                executed: false,
                log: Rc::clone(log),
            })
        }

        fn failing(id: usize, log: &Rc<RefCell<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                id,
                fail_on_execute: true,
                fail_on_rollback: false,
                executed: false,
                log: Rc::clone(log),
            })
        }

        fn bad_rollback(id: usize, log: &Rc<RefCell<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                id,
                fail_on_execute: false,
                fail_on_rollback: true,
                executed: false,
                log: Rc::clone(log),
            })
        }

        fn boom(&self, action: &'static str) -> OpError {
            OpError::Io {
                action,
                source: std::io::Error::other("boom"),
                path: format!("probe-{}", self.id).into(),
            }
        }
    }

    impl Operation for ProbeOp {
        fn execute(&mut self) -> crate::link::op::Result<()> {
            self.log.borrow_mut().push(format!("execute {}", self.id));
            if self.fail_on_execute {
                return Err(self.boom("execute"));
            }
            self.executed = true;
            Ok(())
        }

        fn rollback(&mut self) -> crate::link::op::Result<()> {
            self.log.borrow_mut().push(format!("rollback {}", self.id));
            if self.fail_on_rollback {
                return Err(self.boom("rollback"));
            }
            self.executed = false;
            Ok(())
        }

        fn describe(&self) -> String {
            format!("probe {}", self.id)
        }

        fn owner(&self) -> &str {
            "probe"
        }
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn all_steps_commit_in_insertion_order() -> anyhow::Result<()> {
        let log = log();
        let mut tx = Transaction::new("probe");
        for id in 0..3 {
            tx.push(ProbeOp::ok(id, &log))?;
        }

        tx.execute()?;
        assert_eq!(tx.state(), TxState::Committed);
        assert_eq!(
            *log.borrow(),
            ["execute 0", "execute 1", "execute 2"]
        );
        Ok(())
    }

    #[test]
    fn failure_rolls_back_in_strict_reverse_order() -> anyhow::Result<()> {
        // Failing step k = 2 of 0..=3: steps 0 and 1 completed, step 3
        // must never run, rollback order is 2, 1, 0.
        let log = log();
        let mut tx = Transaction::new("probe");
        tx.push(ProbeOp::ok(0, &log))?;
        tx.push(ProbeOp::ok(1, &log))?;
        tx.push(ProbeOp::failing(2, &log))?;
        tx.push(ProbeOp::ok(3, &log))?;

        let err = tx.execute().unwrap_err();
        assert_eq!(tx.state(), TxState::RolledBack);
        assert_eq!(
            *log.borrow(),
            [
                "execute 0",
                "execute 1",
                "execute 2",
                "rollback 2",
                "rollback 1",
                "rollback 0",
            ]
        );
        assert!(matches!(
            err,
            TransactionError::StepFailed {
                index: 2,
                ref rollback_failures,
                ..
            } if rollback_failures.is_empty()
        ));
        Ok(())
    }

    #[test]
    fn first_step_failure_rolls_back_only_itself() -> anyhow::Result<()> {
        let log = log();
        let mut tx = Transaction::new("probe");
        tx.push(ProbeOp::failing(0, &log))?;
        tx.push(ProbeOp::ok(1, &log))?;

        let err = tx.execute().unwrap_err();
        assert_eq!(*log.borrow(), ["execute 0", "rollback 0"]);
        assert!(matches!(err, TransactionError::StepFailed { index: 0, .. }));
        Ok(())
    }

    #[test]
    fn rollback_failures_ride_along_without_masking_the_cause() -> anyhow::Result<()> {
        let log = log();
        let mut tx = Transaction::new("probe");
        tx.push(ProbeOp::bad_rollback(0, &log))?;
        tx.push(ProbeOp::failing(1, &log))?;

        let err = tx.execute().unwrap_err();
        let TransactionError::StepFailed {
            index,
            source,
            rollback_failures,
            ..
        } = err
        else {
            panic!("expected StepFailed");
        };

        assert_eq!(index, 1);
        assert!(source.to_string().contains("probe-1"));
        assert_eq!(rollback_failures.len(), 1);
        assert!(rollback_failures[0].to_string().contains("probe-0"));
        Ok(())
    }

    #[test]
    fn push_rejected_after_execution() -> anyhow::Result<()> {
        let log = log();
        let mut tx = Transaction::new("probe");
        tx.push(ProbeOp::ok(0, &log))?;
        tx.execute()?;

        let err = tx.push(ProbeOp::ok(1, &log)).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::NotBuilding {
                state: TxState::Committed
            }
        ));
        Ok(())
    }

    #[test]
    fn committed_transaction_cannot_execute_again() -> anyhow::Result<()> {
        let log = log();
        let mut tx = Transaction::new("probe");
        tx.push(ProbeOp::ok(0, &log))?;
        tx.execute()?;

        assert!(matches!(
            tx.execute(),
            Err(TransactionError::NotBuilding { .. })
        ));
        Ok(())
    }

    #[test]
    fn explicit_undo_unwinds_committed_transaction_in_reverse() -> anyhow::Result<()> {
        let log = log();
        let mut tx = Transaction::new("probe");
        for id in 0..3 {
            tx.push(ProbeOp::ok(id, &log))?;
        }
        tx.execute()?;
        tx.undo()?;

        assert_eq!(tx.state(), TxState::RolledBack);
        assert_eq!(
            log.borrow()[3..],
            ["rollback 2", "rollback 1", "rollback 0"]
        );
        Ok(())
    }

    #[test]
    fn undo_rejected_unless_committed() {
        let mut tx = Transaction::new("probe");
        assert!(matches!(
            tx.undo(),
            Err(TransactionError::NotCommitted {
                state: TxState::Building
            })
        ));
    }
}
