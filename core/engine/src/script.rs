//! Parsed compilation units.

use crate::debugger::ScriptUnit;
use crate::parser::{Parser, ast::Program, visitor::BreakablePositions};
use crate::{Position, SourceId, TernResult};

/// A parsed script, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    source_id: SourceId,
    program: Program,
}

impl Script {
    /// Parses `source`.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the source does not parse.
    pub fn parse(source_id: SourceId, source: &str) -> TernResult<Self> {
        let program = Parser::parse_program(source)?;
        Ok(Self { source_id, program })
    }

    /// The script's source id.
    #[must_use]
    pub const fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// The syntax tree.
    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }
}

impl ScriptUnit for Script {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn breakable_positions(&self) -> Vec<Position> {
        BreakablePositions::collect(&self.program)
    }
}
