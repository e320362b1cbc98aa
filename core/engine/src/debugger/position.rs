//! Per-unit index of breakable positions.

use super::{DebugError, DebugResult, ScriptUnit};
use crate::{Position, SourceId};
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// A loaded compilation unit and its breakable positions.
///
/// The position list is built from the unit the first time it is needed and
/// never changes afterwards.
pub struct ScriptInfo {
    source_id: SourceId,
    unit: Rc<dyn ScriptUnit>,
    positions: OnceCell<Vec<Position>>,
}

impl fmt::Debug for ScriptInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInfo")
            .field("source_id", &self.source_id)
            .field("positions", &self.positions.get())
            .finish_non_exhaustive()
    }
}

impl ScriptInfo {
    /// Wraps a parsed unit.
    #[must_use]
    pub fn new(unit: Rc<dyn ScriptUnit>) -> Self {
        Self {
            source_id: unit.source_id().clone(),
            unit,
            positions: OnceCell::new(),
        }
    }

    /// The unit's source id.
    #[must_use]
    pub const fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// Sorted, deduplicated breakable positions.
    pub fn breakable_positions(&self) -> &[Position] {
        self.positions.get_or_init(|| {
            let mut positions = self.unit.breakable_positions();
            positions.sort_unstable();
            positions.dedup();
            positions
        })
    }

    /// Returns `position` if it is breakable, otherwise the first breakable
    /// position after it.
    ///
    /// # Errors
    ///
    /// Fails if `position` is past the last breakable position.
    pub fn find_nearest_breakpoint_position(&self, position: Position) -> DebugResult<Position> {
        let positions = self.breakable_positions();
        let index = positions
            .binary_search(&position)
            .unwrap_or_else(|insertion| insertion);
        positions.get(index).copied().ok_or_else(|| {
            DebugError::invalid(format!(
                "no breakable position at or after {position} in {}",
                self.source_id
            ))
        })
    }

    /// Breakable positions `p` with `start <= p <= end`, ascending.
    pub fn find_positions_in_range(
        &self,
        start: Position,
        end: Position,
    ) -> impl Iterator<Item = Position> + '_ {
        let positions = self.breakable_positions();
        let first = positions
            .binary_search(&start)
            .unwrap_or_else(|insertion| insertion);
        positions[first..]
            .iter()
            .copied()
            .take_while(move |p| *p <= end)
    }
}
