//! Collection of statement boundaries.

use super::ast::{Program, Statement, StatementKind};
use crate::Position;

/// Walks a program and records every position where execution can be suspended.
///
/// The positions come out in visit order; callers that need a search index
/// sort and deduplicate them.
#[derive(Debug, Default)]
pub struct BreakablePositions {
    positions: Vec<Position>,
}

impl BreakablePositions {
    /// Collects the breakable positions of `program`.
    #[must_use]
    pub fn collect(program: &Program) -> Vec<Position> {
        let mut visitor = Self::default();
        visitor.visit_statements(&program.body);
        visitor.positions
    }

    fn visit_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.visit_statement(statement);
        }
    }

    fn visit_statement(&mut self, statement: &Statement) {
        // Declarations are hoisted and never executed as a step.
        if let StatementKind::Function(function) = &statement.kind {
            self.visit_statements(&function.body);
            return;
        }

        self.positions.push(statement.position);
        match &statement.kind {
            StatementKind::If {
                consequent,
                alternate,
                ..
            } => {
                self.visit_statements(consequent);
                if let Some(alternate) = alternate {
                    self.visit_statements(alternate);
                }
            }
            StatementKind::While { body, .. } => self.visit_statements(body),
            _ => {}
        }
    }
}
