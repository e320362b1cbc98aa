//! Syntax tree.

use crate::{Position, Value};
use std::rc::Rc;

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level statements in source order.
    pub body: Vec<Statement>,
}

/// A statement with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Where the statement starts.
    pub position: Position,
    /// What the statement does.
    pub kind: StatementKind,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
#[allow(variant_size_differences)]
pub enum StatementKind {
    /// `let name = init;`
    Let {
        /// Binding name.
        name: String,
        /// Initializer, `undefined` when absent.
        init: Option<Expression>,
    },
    /// `name = value;`
    Assign {
        /// Target binding.
        name: String,
        /// New value.
        value: Expression,
    },
    /// An expression evaluated for its side effects.
    Expression(Expression),
    /// `print(a, b, ...);`
    Print(Vec<Expression>),
    /// `debugger;`
    Debugger,
    /// `if (test) { .. } else { .. }`
    If {
        /// Condition.
        test: Expression,
        /// Taken when the condition is truthy.
        consequent: Vec<Statement>,
        /// Taken otherwise.
        alternate: Option<Vec<Statement>>,
    },
    /// `while (test) { .. }`
    While {
        /// Loop condition.
        test: Expression,
        /// Loop body.
        body: Vec<Statement>,
    },
    /// `function name(params) { .. }`
    Function(Rc<FunctionDeclaration>),
    /// `return value;`
    Return(Option<Expression>),
    /// `throw value;`
    Throw(Expression),
}

/// A function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    /// Function name.
    pub name: String,
    /// Parameter names.
    pub params: Vec<String>,
    /// Function body.
    pub body: Vec<Statement>,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Literal(Value),
    /// A binding read.
    Identifier(String),
    /// `-x` or `!x`.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expression>,
    },
    /// `lhs op rhs`.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expression>,
        /// Right operand.
        rhs: Box<Expression>,
    },
    /// `callee(args)`.
    Call {
        /// Called function name.
        callee: String,
        /// Argument expressions.
        args: Vec<Expression>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==` and `===`
    Eq,
    /// `!=` and `!==`
    Ne,
    /// `&&`
    And,
    /// `||`
    Or,
}
