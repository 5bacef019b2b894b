//! Dense `(lineIndex, analyzerId) → CellResult` store with a subscribable
//! stream of terminal-write transitions (§4.8).

use std::sync::Mutex;

use crate::types::{AnalyzerId, CellResult};

/// A terminal-write notification: `(line_index, analyzer_index, cell)`.
/// The analyzer position is its index in plan order, stable for the life
/// of the matrix.
pub type Transition = (usize, usize, CellResult);

/// A listener invoked synchronously on every terminal write. Slow
/// listeners block the driver (§5 backpressure) — callers needing async
/// delivery should bridge through a bounded channel themselves.
pub trait Listener: Send {
    fn on_transition(&mut self, transition: &Transition);
}

impl<F: FnMut(&Transition) + Send> Listener for F {
    fn on_transition(&mut self, transition: &Transition) {
        self(transition)
    }
}

/// An immutable snapshot suitable for export (§6).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub analyzer_ids: Vec<AnalyzerId>,
    pub cells: Vec<Vec<CellResult>>,
}

pub struct ResultMatrix {
    analyzer_ids: Vec<AnalyzerId>,
    line_count: usize,
    cells: Mutex<Vec<Vec<CellResult>>>,
    listeners: Mutex<Vec<Box<dyn Listener>>>,
}

impl ResultMatrix {
    /// Allocates a dense matrix of shape `(line_count, analyzer_ids.len())`,
    /// every cell `Pending`.
    pub fn new(line_count: usize, analyzer_ids: Vec<AnalyzerId>) -> Self {
        let cells = vec![vec![CellResult::Pending; analyzer_ids.len()]; line_count];
        Self {
            analyzer_ids,
            line_count,
            cells: Mutex::new(cells),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn analyzer_count(&self) -> usize {
        self.analyzer_ids.len()
    }

    pub fn get(&self, line_index: usize, analyzer_index: usize) -> CellResult {
        self.cells.lock().unwrap()[line_index][analyzer_index].clone()
    }

    /// Terminal write. Panics if the prior state at `(line_index,
    /// analyzer_index)` is not `Pending` — terminal cells never change
    /// (§3 invariant).
    pub fn set(&self, line_index: usize, analyzer_index: usize, cell: CellResult) {
        {
            let mut cells = self.cells.lock().unwrap();
            let prior = &cells[line_index][analyzer_index];
            assert!(
                prior.is_pending(),
                "cell ({line_index}, {analyzer_index}) already terminal"
            );
            cells[line_index][analyzer_index] = cell.clone();
        }

        let transition = (line_index, analyzer_index, cell);
        for listener in self.listeners.lock().unwrap().iter_mut() {
            listener.on_transition(&transition);
        }
    }

    pub fn subscribe(&self, listener: impl Listener + 'static) {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// Iteration order is `(line ascending, analyzer in plan order)`.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            analyzer_ids: self.analyzer_ids.clone(),
            cells: self.cells.lock().unwrap().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellErrorKind;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn new_matrix_is_all_pending() {
        let matrix = ResultMatrix::new(2, vec!["a".to_string()]);
        assert!(matrix.get(0, 0).is_pending());
        assert!(matrix.get(1, 0).is_pending());
    }

    #[test]
    fn set_then_get_is_terminal() {
        let matrix = ResultMatrix::new(1, vec!["a".to_string()]);
        matrix.set(
            0,
            0,
            CellResult::Failed {
                analyzer_id: "a".to_string(),
                error_kind: CellErrorKind::Timeout,
                message: "boom".to_string(),
            },
        );
        assert!(matrix.get(0, 0).is_terminal());
    }

    #[test]
    #[should_panic(expected = "already terminal")]
    fn double_write_panics() {
        let matrix = ResultMatrix::new(1, vec!["a".to_string()]);
        let fail = || CellResult::Failed {
            analyzer_id: "a".to_string(),
            error_kind: CellErrorKind::Timeout,
            message: "boom".to_string(),
        };
        matrix.set(0, 0, fail());
        matrix.set(0, 0, fail());
    }

    #[test]
    fn subscriber_observes_every_transition() {
        let matrix = ResultMatrix::new(2, vec!["a".to_string()]);
        let seen: Arc<StdMutex<Vec<(usize, usize)>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        matrix.subscribe(move |(i, a, _): &Transition| {
            seen_clone.lock().unwrap().push((*i, *a));
        });

        matrix.set(
            0,
            0,
            CellResult::Failed {
                analyzer_id: "a".to_string(),
                error_kind: CellErrorKind::Timeout,
                message: "x".to_string(),
            },
        );
        matrix.set(
            1,
            0,
            CellResult::Failed {
                analyzer_id: "a".to_string(),
                error_kind: CellErrorKind::Timeout,
                message: "x".to_string(),
            },
        );

        assert_eq!(*seen.lock().unwrap(), vec![(0, 0), (1, 0)]);
    }
}
