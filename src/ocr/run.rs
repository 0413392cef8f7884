//! Run identity and supersession.
//!
//! Each upload starts a new run. Starting a run cancels the previous one and
//! advances the generation, so results from a stale run can never be written
//! into the active run's matrix.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::imaging::RawImage;

/// Identifies one run: the digest of the triggering image plus a generation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RunId {
    pub digest: String,
    pub generation: u64,
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.digest, self.generation)
    }
}

/// Hands out runs. Shared by everything that can trigger a read.
pub struct RunRegistry {
    current_token: RwLock<CancellationToken>,
    active: RwLock<Option<RunId>>,
    generation: Arc<AtomicU64>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            active: RwLock::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancels the active run (if any) and starts a new one for `image`.
    pub fn begin(&self, image: &RawImage) -> RunGuard {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let token = CancellationToken::new();
        *token_guard = token.clone();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let id = RunId { digest: image.digest(), generation };
        *self.active.write() = Some(id.clone());

        RunGuard {
            id,
            generation: Arc::clone(&self.generation),
            token,
        }
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.active.read().clone()
    }

    pub fn is_active(&self, id: &RunId) -> bool {
        self.active.read().as_ref() == Some(id)
    }

    /// Cancels the active run without starting another.
    pub fn cancel_active(&self) {
        self.current_token.read().cancel();
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Checked by a run before every write. Stale once a newer run begins.
#[derive(Clone, Debug)]
pub struct RunGuard {
    id: RunId,
    generation: Arc<AtomicU64>,
    token: CancellationToken,
}

impl RunGuard {
    pub fn id(&self) -> &RunId {
        &self.id
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id.generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[inline]
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A write was attempted with a guard that does not own the matrix, or whose
/// run has been superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleWrite {
    pub from: RunId,
    pub owner: RunId,
}

/// Row-major result slots owned by one run.
pub struct ResultMatrix<T> {
    owner: RunId,
    columns: usize,
    slots: Vec<Option<T>>,
}

impl<T> ResultMatrix<T> {
    pub fn new(owner: RunId, rows: usize, columns: usize) -> Self {
        let mut slots = Vec::with_capacity(rows * columns);
        slots.resize_with(rows * columns, || None);
        Self { owner, columns, slots }
    }

    pub fn owner(&self) -> &RunId {
        &self.owner
    }

    /// Stores `value` at `(row, col)` if `guard` is this matrix's live run.
    pub fn write(&mut self, guard: &RunGuard, row: usize, col: usize, value: T) -> Result<(), StaleWrite> {
        if guard.id() != &self.owner || !guard.should_continue() {
            return Err(StaleWrite { from: guard.id().clone(), owner: self.owner.clone() });
        }
        if let Some(slot) = self.slots.get_mut(row * self.columns + col) {
            *slot = Some(value);
        }
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        self.slots.get(row * self.columns + col).and_then(Option::as_ref)
    }

    /// Rows of values, or `None` if any slot was never written.
    pub fn into_rows(self) -> Option<Vec<Vec<T>>> {
        let columns = self.columns.max(1);
        let values: Vec<T> = self.slots.into_iter().collect::<Option<Vec<T>>>()?;
        let mut rows = Vec::with_capacity(values.len() / columns);
        let mut iter = values.into_iter().peekable();
        while iter.peek().is_some() {
            rows.push(iter.by_ref().take(columns).collect());
        }
        Some(rows)
    }
}
