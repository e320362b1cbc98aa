//! The script execution context.

use crate::debugger::{DebugFrame, DebugHooks, DebugHost, HitContext, StepMode};
use crate::parser::Parser;
use crate::parser::ast::{BinaryOp, Expression, FunctionDeclaration, Statement, StatementKind, UnaryOp};
use crate::{Location, Position, Script, SourceId, TernError, TernResult, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Default limit on nested calls before a `RangeError` is raised.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 128;

type OutputSink = Box<dyn FnMut(&str)>;

#[derive(Debug, Default)]
struct CallFrame {
    locals: FxHashMap<String, Value>,
}

enum Completion {
    Normal,
    Return(Value),
}

/// Runs scripts.
///
/// A `Context` keeps its global bindings and functions between runs. It is
/// single-threaded; to debug a script from another thread, run it on an
/// [`EngineThread`](crate::debugger::EngineThread).
///
/// # Examples
///
/// ```
/// use tern_engine::{Context, Value};
///
/// let mut context = Context::default();
/// let value = context.eval("main.tern".into(), "let a = 20; a + 22;")?;
/// assert_eq!(value, Value::Number(42.0));
/// # Ok::<(), tern_engine::TernError>(())
/// ```
pub struct Context {
    globals: FxHashMap<String, Value>,
    functions: FxHashMap<String, Rc<FunctionDeclaration>>,
    frames: Vec<CallFrame>,
    max_call_depth: usize,
    output: OutputSink,

    hooks: Option<Rc<dyn DebugHooks>>,
    hooks_suppressed: bool,
    step: StepMode,
    step_origin: usize,
    source_id: SourceId,
    location: Location,
    completion: Value,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("globals", &self.globals)
            .field("functions", &self.functions.keys())
            .field("call_depth", &self.frames.len())
            .field("subscribed", &self.hooks.is_some())
            .field("step", &self.step)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Default for Context {
    fn default() -> Self {
        let source_id = SourceId::new("<anonymous>");
        Self {
            globals: FxHashMap::default(),
            functions: FxHashMap::default(),
            frames: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            output: Box::new(|line| log::info!(target: "tern::print", "{line}")),
            hooks: None,
            hooks_suppressed: false,
            step: StepMode::None,
            step_origin: 0,
            location: Location::new(source_id.clone(), Position::new(1, 1)),
            source_id,
            completion: Value::Undefined,
        }
    }
}

impl Context {
    /// Sends `print` output to `sink`, one call per line.
    pub fn set_output(&mut self, sink: impl FnMut(&str) + 'static) {
        self.output = Box::new(sink);
    }

    /// Sets how deeply calls may nest.
    pub const fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Reads a global binding.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Parses and runs `source`, returning the value of the last expression
    /// statement at top level.
    ///
    /// # Errors
    ///
    /// Returns the syntax error or the uncaught runtime error.
    pub fn eval(&mut self, source_id: SourceId, source: &str) -> TernResult<Value> {
        self.run_script(source_id, source, StepMode::None)
    }

    fn run_script(
        &mut self,
        source_id: SourceId,
        source: &str,
        initial_step: StepMode,
    ) -> TernResult<Value> {
        let script = Rc::new(Script::parse(source_id, source)?);
        if let Some(hooks) = self.hooks.clone() {
            hooks.before_evaluate(script.clone())?;
        }

        self.source_id = script.source_id().clone();
        self.step = initial_step;
        self.step_origin = 0;
        self.completion = Value::Undefined;
        self.frames.clear();

        let body = &script.program().body;
        self.hoist(body);
        let result = self.execute_block(body);
        self.step = StepMode::None;
        match result? {
            Completion::Normal => Ok(std::mem::take(&mut self.completion)),
            Completion::Return(_) => Err(TernError::syntax(
                "return outside of a function",
                self.location.position,
            )),
        }
    }

    fn hoist(&mut self, body: &[Statement]) {
        for statement in body {
            if let StatementKind::Function(function) = &statement.kind {
                self.functions
                    .insert(function.name.clone(), function.clone());
            }
        }
    }

    fn execute_block(&mut self, body: &[Statement]) -> TernResult<Completion> {
        for statement in body {
            if let Completion::Return(value) = self.execute_statement(statement)? {
                return Ok(Completion::Return(value));
            }
        }
        Ok(Completion::Normal)
    }

    fn execute_statement(&mut self, statement: &Statement) -> TernResult<Completion> {
        if let StatementKind::Function(function) = &statement.kind {
            self.functions
                .insert(function.name.clone(), function.clone());
            return Ok(Completion::Normal);
        }

        self.location = Location::new(self.source_id.clone(), statement.position);
        self.statement_boundary(matches!(statement.kind, StatementKind::Debugger))?;

        match &statement.kind {
            StatementKind::Let { name, init } => {
                let value = match init {
                    Some(init) => self.evaluate_expression(init)?,
                    None => Value::Undefined,
                };
                match self.frames.last_mut() {
                    Some(frame) => frame.locals.insert(name.clone(), value),
                    None => self.globals.insert(name.clone(), value),
                };
            }
            StatementKind::Assign { name, value } => {
                let value = self.evaluate_expression(value)?;
                self.assign(name, value)?;
            }
            StatementKind::Expression(expression) => {
                let value = self.evaluate_expression(expression)?;
                if self.frames.is_empty() {
                    self.completion = value;
                }
            }
            StatementKind::Print(arguments) => {
                let mut line = String::new();
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        line.push(' ');
                    }
                    line.push_str(&self.evaluate_expression(argument)?.to_string());
                }
                (self.output)(&line);
            }
            StatementKind::Debugger => {}
            StatementKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate_expression(test)?.to_boolean() {
                    return self.execute_block(consequent);
                } else if let Some(alternate) = alternate {
                    return self.execute_block(alternate);
                }
            }
            StatementKind::While { test, body } => {
                while self.evaluate_expression(test)?.to_boolean() {
                    if let Completion::Return(value) = self.execute_block(body)? {
                        return Ok(Completion::Return(value));
                    }
                }
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(value) => self.evaluate_expression(value)?,
                    None => Value::Undefined,
                };
                return Ok(Completion::Return(value));
            }
            StatementKind::Throw(value) => {
                return Err(TernError::Thrown(self.evaluate_expression(value)?));
            }
            StatementKind::Function(_) => {}
        }
        Ok(Completion::Normal)
    }

    /// Offers the subscribed hooks a chance to stop before the current statement.
    fn statement_boundary(&mut self, debugger_statement: bool) -> TernResult<()> {
        if self.hooks_suppressed {
            return Ok(());
        }
        let Some(hooks) = self.hooks.clone() else {
            return Ok(());
        };

        let depth = self.frames.len();
        let breakpoint = hooks.matches_breakpoint(self)?;
        let hit = HitContext::new(self.location.clone(), breakpoint, debugger_statement);

        let mode = if self.wants_step(depth) {
            hooks.on_step(self, hit)?
        } else if breakpoint || debugger_statement {
            match hooks.on_break(self, hit)? {
                Some(mode) => mode,
                None => return Ok(()),
            }
        } else {
            match hooks.on_skip(self, hit)? {
                StepMode::None => return Ok(()),
                requested => {
                    self.set_step(requested, depth);
                    let hit = HitContext::new(self.location.clone(), breakpoint, debugger_statement);
                    hooks.on_step(self, hit)?
                }
            }
        };
        self.set_step(mode, depth);
        Ok(())
    }

    const fn wants_step(&self, depth: usize) -> bool {
        match self.step {
            StepMode::None => false,
            StepMode::Into => true,
            StepMode::Over => depth <= self.step_origin,
            StepMode::Out => depth < self.step_origin,
        }
    }

    fn set_step(&mut self, mode: StepMode, depth: usize) {
        self.step = mode;
        self.step_origin = depth;
    }

    fn lookup(&self, name: &str) -> TernResult<Value> {
        self.frames
            .last()
            .and_then(|frame| frame.locals.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| TernError::Reference(format!("{name} is not defined")))
    }

    fn assign(&mut self, name: &str, value: Value) -> TernResult<()> {
        if let Some(slot) = self
            .frames
            .last_mut()
            .and_then(|frame| frame.locals.get_mut(name))
        {
            *slot = value;
            return Ok(());
        }
        match self.globals.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(TernError::Reference(format!("{name} is not defined"))),
        }
    }

    fn evaluate_expression(&mut self, expression: &Expression) -> TernResult<Value> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Identifier(name) => self.lookup(name),
            Expression::Unary { op, operand } => {
                let operand = self.evaluate_expression(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-operand.to_number()),
                    UnaryOp::Not => Value::Boolean(!operand.to_boolean()),
                })
            }
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.evaluate_expression(lhs)?;
                match op {
                    BinaryOp::And if !lhs.to_boolean() => return Ok(lhs),
                    BinaryOp::Or if lhs.to_boolean() => return Ok(lhs),
                    BinaryOp::And | BinaryOp::Or => return self.evaluate_expression(rhs),
                    _ => {}
                }
                let rhs = self.evaluate_expression(rhs)?;
                Ok(binary(*op, &lhs, &rhs))
            }
            Expression::Call { callee, args } => {
                let function = self
                    .functions
                    .get(callee)
                    .cloned()
                    .ok_or_else(|| TernError::Reference(format!("{callee} is not defined")))?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.evaluate_expression(arg)?);
                }
                self.call(&function, arguments)
            }
        }
    }

    fn call(&mut self, function: &FunctionDeclaration, arguments: Vec<Value>) -> TernResult<Value> {
        if self.frames.len() >= self.max_call_depth {
            return Err(TernError::Range("Maximum call stack size exceeded".into()));
        }

        let mut arguments = arguments.into_iter();
        let locals = function
            .params
            .iter()
            .map(|param| (param.clone(), arguments.next().unwrap_or_default()))
            .collect();
        self.frames.push(CallFrame { locals });
        self.hoist(&function.body);
        let result = self.execute_block(&function.body);
        self.frames.pop();

        Ok(match result? {
            Completion::Normal => Value::Undefined,
            Completion::Return(value) => value,
        })
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{lhs}{rhs}")),
            _ => Value::Number(lhs.to_number() + rhs.to_number()),
        },
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => lhs.to_number().partial_cmp(&rhs.to_number()),
            };
            Value::Boolean(ordering.is_some_and(|ordering| match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Eq => Value::Boolean(lhs.strict_equals(rhs)),
        BinaryOp::Ne => Value::Boolean(!lhs.strict_equals(rhs)),
        // Short-circuited by the caller.
        BinaryOp::And | BinaryOp::Or => Value::Undefined,
    }
}

impl DebugFrame for Context {
    fn location(&self) -> Location {
        self.location.clone()
    }

    fn call_depth(&self) -> usize {
        self.frames.len()
    }

    fn evaluate(&mut self, expression: &str) -> TernResult<Value> {
        let expression = Parser::parse_expression(expression)?;

        let suppressed = std::mem::replace(&mut self.hooks_suppressed, true);
        let location = self.location.clone();
        let result = self.evaluate_expression(&expression);
        self.location = location;
        self.hooks_suppressed = suppressed;
        result
    }
}

impl DebugHost for Context {
    fn subscribe(&mut self, hooks: Rc<dyn DebugHooks>) {
        self.hooks = Some(hooks);
    }

    fn unsubscribe(&mut self) {
        self.hooks = None;
    }

    fn run(
        &mut self,
        source_id: SourceId,
        source: &str,
        initial_step: StepMode,
    ) -> TernResult<Value> {
        self.run_script(source_id, source, initial_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::ScriptUnit;
    use indoc::indoc;
    use std::cell::RefCell;
    use test_case::test_case;

    fn eval(source: &str) -> TernResult<Value> {
        Context::default().eval("test.tern".into(), source)
    }

    #[test_case("1 + 2 * 3;", Value::Number(7.0) ; "precedence")]
    #[test_case("'a' + 1;", Value::from("a1") ; "string concatenation")]
    #[test_case("7 % 4 == 3;", Value::Boolean(true) ; "remainder")]
    #[test_case("0 || 'x';", Value::from("x") ; "or yields operand")]
    #[test_case("0 && missing;", Value::Number(0.0) ; "and short-circuits")]
    #[test_case("'b' > 'a';", Value::Boolean(true) ; "string comparison")]
    #[test_case("!undefined;", Value::Boolean(true) ; "not")]
    #[test_case("let x;", Value::Undefined ; "no completion value")]
    fn expressions(source: &str, expected: Value) {
        assert_eq!(eval(source).unwrap(), expected);
    }

    #[test]
    fn functions_loops_and_scopes() {
        let source = indoc! {"
            function fib(n) {
              if (n < 2) { return n; }
              return fib(n - 1) + fib(n - 2);
            }
            let total = 0;
            let i = 0;
            while (i < 10) {
              total = total + fib(i);
              i = i + 1;
            }
            total;
        "};
        assert_eq!(eval(source).unwrap(), Value::Number(88.0));
    }

    #[test]
    fn locals_shadow_globals() {
        let mut context = Context::default();
        let source = indoc! {"
            let x = 1;
            function f(x) { x = x + 10; return x; }
            f(5) + x;
        "};
        assert_eq!(
            context.eval("a.tern".into(), source).unwrap(),
            Value::Number(16.0)
        );
        assert_eq!(context.global("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn print_goes_to_the_sink() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let mut context = Context::default();
        context.set_output({
            let lines = lines.clone();
            move |line| lines.borrow_mut().push(line.to_owned())
        });
        context
            .eval("p.tern".into(), "print('a', 1 + 1); print();")
            .unwrap();
        assert_eq!(*lines.borrow(), ["a 2", ""]);
    }

    #[test_case("y = 1;" ; "assign to undeclared")]
    #[test_case("nope(1);" ; "call undeclared")]
    #[test_case("print(z);" ; "read undeclared")]
    fn reference_errors(source: &str) {
        assert!(matches!(eval(source), Err(TernError::Reference(_))));
    }

    #[test]
    fn thrown_values_and_limits() {
        assert_eq!(eval("throw 'boom';"), Err(TernError::Thrown(Value::from("boom"))));
        assert!(matches!(
            eval("function f() { return f(); } f();"),
            Err(TernError::Range(_))
        ));
        assert!(matches!(eval("let = 1;"), Err(TernError::Syntax { .. })));
    }

    #[test]
    fn evaluate_sees_current_scope() {
        let mut context = Context::default();
        context
            .eval("a.tern".into(), "let a = 2; function double(v) { return v * 2; }")
            .unwrap();
        assert_eq!(context.evaluate("double(a) + 1").unwrap(), Value::Number(5.0));
        assert_eq!(context.call_depth(), 0);
    }

    #[derive(Default)]
    struct Recorder {
        breakpoint_line: u32,
        calls: RefCell<Vec<(&'static str, u32)>>,
        skip_returns: RefCell<Vec<StepMode>>,
    }

    impl Recorder {
        fn record(&self, hook: &'static str, hit: &HitContext) {
            self.calls.borrow_mut().push((hook, hit.location.position.line));
        }
    }

    impl DebugHooks for Recorder {
        fn before_evaluate(&self, unit: Rc<dyn ScriptUnit>) -> TernResult<()> {
            assert!(!unit.breakable_positions().is_empty());
            self.calls.borrow_mut().push(("load", 0));
            Ok(())
        }

        fn matches_breakpoint(&self, frame: &mut dyn DebugFrame) -> TernResult<bool> {
            Ok(frame.location().position.line == self.breakpoint_line)
        }

        fn on_break(
            &self,
            _frame: &mut dyn DebugFrame,
            hit: HitContext,
        ) -> TernResult<Option<StepMode>> {
            self.record("break", &hit);
            Ok(Some(StepMode::Over))
        }

        fn on_step(&self, frame: &mut dyn DebugFrame, hit: HitContext) -> TernResult<StepMode> {
            self.record("step", &hit);
            // Stepping must not fire hooks recursively.
            frame.evaluate("inc(0)")?;
            Ok(StepMode::Over)
        }

        fn on_skip(&self, _frame: &mut dyn DebugFrame, hit: HitContext) -> TernResult<StepMode> {
            self.record("skip", &hit);
            Ok(self.skip_returns.borrow_mut().pop().unwrap_or_default())
        }
    }

    #[test]
    fn hook_dispatch_follows_step_mode() {
        let source = indoc! {"
            function inc(v) {
              return v + 1;
            }
            let a = inc(1);
            debugger;
            a = inc(a);
        "};
        let recorder = Rc::new(Recorder {
            breakpoint_line: 2,
            ..Recorder::default()
        });
        let mut context = Context::default();
        context.subscribe(recorder.clone());
        let value = DebugHost::run(&mut context, "s.tern".into(), source, StepMode::None).unwrap();
        assert_eq!(value, Value::Undefined);

        // Stepping over from inside `inc` lands back at top level, where the
        // next call still runs freely into the breakpoint.
        assert_eq!(
            *recorder.calls.borrow(),
            [
                ("load", 0),
                ("skip", 4),
                ("break", 2),
                ("step", 5),
                ("step", 6),
                ("break", 2),
            ]
        );
        assert_eq!(context.global("a"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn skip_can_start_a_step_at_the_same_statement() {
        let recorder = Rc::new(Recorder::default());
        recorder.skip_returns.borrow_mut().push(StepMode::Into);
        let mut context = Context::default();
        context.subscribe(recorder.clone());
        DebugHost::run(
            &mut context,
            "s.tern".into(),
            "function inc(v) { return v + 1; }\nlet a = 1;\n",
            StepMode::None,
        )
        .unwrap();
        assert_eq!(
            *recorder.calls.borrow(),
            [("load", 0), ("skip", 2), ("step", 2)]
        );
    }
}
