//! Breakpoints and their hit semantics.

use super::{DebugError, DebugResult, DebugFrame};
use crate::{Location, Position, SourceId, TernResult};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;

/// Client-supplied settings for a new breakpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointOptions {
    /// Expression that must be truthy for the breakpoint to match.
    pub condition: Option<String>,
    /// Hit-count predicate, e.g. `3`, `== 3`, `> 10` or `% 2`.
    pub hit_condition: Option<String>,
    /// Turns the breakpoint into a logpoint; `{expr}` segments are interpolated.
    pub log_message: Option<String>,
}

/// A predicate over a breakpoint's cumulative hit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCondition {
    /// `== n`
    Equal(u32),
    /// `!= n`
    NotEqual(u32),
    /// `> n`
    Greater(u32),
    /// `>= n`, and a bare `n`.
    AtLeast(u32),
    /// `< n`
    Less(u32),
    /// `<= n`
    AtMost(u32),
    /// `% n`: every n-th hit.
    Every(u32),
}

impl HitCondition {
    /// Parses the textual form used by debug clients.
    ///
    /// # Errors
    ///
    /// Fails on anything that is not an optional operator followed by an integer.
    pub fn parse(text: &str) -> DebugResult<Self> {
        let text = text.trim();
        let malformed = || DebugError::invalid(format!("malformed hit condition `{text}`"));

        let (constructor, rest): (fn(u32) -> Self, &str) =
            if let Some(rest) = text.strip_prefix("===").or_else(|| text.strip_prefix("==")) {
                (Self::Equal, rest)
            } else if let Some(rest) = text.strip_prefix("!==").or_else(|| text.strip_prefix("!=")) {
                (Self::NotEqual, rest)
            } else if let Some(rest) = text.strip_prefix(">=") {
                (Self::AtLeast, rest)
            } else if let Some(rest) = text.strip_prefix('>') {
                (Self::Greater, rest)
            } else if let Some(rest) = text.strip_prefix("<=") {
                (Self::AtMost, rest)
            } else if let Some(rest) = text.strip_prefix('<') {
                (Self::Less, rest)
            } else if let Some(rest) = text.strip_prefix('%') {
                (Self::Every, rest)
            } else {
                (Self::AtLeast, text)
            };

        let n: u32 = rest.trim().parse().map_err(|_| malformed())?;
        if matches!(constructor(n), Self::Every(0)) {
            return Err(malformed());
        }
        Ok(constructor(n))
    }

    /// Returns `true` if a breakpoint hit for the `hit_count`-th time is due.
    #[must_use]
    pub const fn is_met(self, hit_count: u32) -> bool {
        match self {
            Self::Equal(n) => hit_count == n,
            Self::NotEqual(n) => hit_count != n,
            Self::Greater(n) => hit_count > n,
            Self::AtLeast(n) => hit_count >= n,
            Self::Less(n) => hit_count < n,
            Self::AtMost(n) => hit_count <= n,
            Self::Every(n) => hit_count % n == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogFragment {
    Text(String),
    Expression(String),
}

/// A logpoint message, split into literal text and `{expression}` holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    fragments: Vec<LogFragment>,
}

impl LogMessage {
    /// Prepares a message template. `{{` and `}}` stand for literal braces.
    ///
    /// # Errors
    ///
    /// Fails on an unbalanced or empty `{}` hole.
    pub fn parse(template: &str) -> DebugResult<Self> {
        let mut fragments = Vec::new();
        let mut text = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut expression = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => expression.push(c),
                            None => {
                                return Err(DebugError::invalid(format!(
                                    "unterminated `{{` in log message `{template}`"
                                )));
                            }
                        }
                    }
                    if expression.trim().is_empty() {
                        return Err(DebugError::invalid(format!(
                            "empty `{{}}` in log message `{template}`"
                        )));
                    }
                    if !text.is_empty() {
                        fragments.push(LogFragment::Text(std::mem::take(&mut text)));
                    }
                    fragments.push(LogFragment::Expression(expression.trim().to_owned()));
                }
                '}' => {
                    return Err(DebugError::invalid(format!(
                        "unmatched `}}` in log message `{template}`"
                    )));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            fragments.push(LogFragment::Text(text));
        }
        Ok(Self { fragments })
    }

    /// Evaluates the holes in `frame` and concatenates the result.
    pub fn render(&self, frame: &mut dyn DebugFrame) -> TernResult<String> {
        let mut output = String::new();
        for fragment in &self.fragments {
            match fragment {
                LogFragment::Text(text) => output.push_str(text),
                LogFragment::Expression(expression) => {
                    output.push_str(&frame.evaluate(expression)?.to_string());
                }
            }
        }
        Ok(output)
    }
}

/// A breakpoint at a breakable position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    location: Location,
    condition: Option<String>,
    hit_condition: Option<HitCondition>,
    hit_count: u32,
    log_message: Option<LogMessage>,
}

/// What a breakpoint hit should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HitOutcome {
    /// Stop execution.
    Pause,
    /// Keep running.
    Suppress,
    /// Emit the message and keep running.
    Log(LogMessage),
}

impl Breakpoint {
    /// Builds a breakpoint at `location`, validating the options.
    ///
    /// # Errors
    ///
    /// Fails if the hit condition or log message is malformed.
    pub fn new(location: Location, options: BreakpointOptions) -> DebugResult<Self> {
        let hit_condition = options
            .hit_condition
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(HitCondition::parse)
            .transpose()?;
        let log_message = options
            .log_message
            .as_deref()
            .map(LogMessage::parse)
            .transpose()?;
        let condition = options.condition.filter(|c| !c.trim().is_empty());

        Ok(Self {
            location,
            condition,
            hit_condition,
            hit_count: 0,
            log_message,
        })
    }

    /// Where the breakpoint sits.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// The condition expression, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// How many times the breakpoint has been hit.
    #[must_use]
    pub const fn hit_count(&self) -> u32 {
        self.hit_count
    }

    /// Returns `true` for logpoints.
    #[must_use]
    pub const fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }

    /// Records a hit and decides what it should do.
    ///
    /// A hit condition gates everything: an unmet condition suppresses both
    /// the pause and the log message.
    pub(crate) fn register_hit(&mut self) -> HitOutcome {
        if let Some(hit_condition) = self.hit_condition {
            self.hit_count += 1;
            if !hit_condition.is_met(self.hit_count) {
                return HitOutcome::Suppress;
            }
        }
        match &self.log_message {
            Some(message) => HitOutcome::Log(message.clone()),
            None => HitOutcome::Pause,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "breakpoint at {}", self.location)?;
        if let Some(condition) = &self.condition {
            write!(f, " if {condition}")?;
        }
        Ok(())
    }
}

/// Active breakpoints, keyed by source id and position.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    by_source: FxHashMap<SourceId, BTreeMap<Position, Breakpoint>>,
}

impl BreakpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `breakpoint`, replacing one at the same location.
    pub fn set(&mut self, breakpoint: Breakpoint) {
        let Location {
            source_id,
            position,
        } = breakpoint.location.clone();
        self.by_source
            .entry(source_id)
            .or_default()
            .insert(position, breakpoint);
    }

    /// Removes the breakpoint at `location`, returning it.
    pub fn remove(&mut self, location: &Location) -> Option<Breakpoint> {
        let breakpoints = self.by_source.get_mut(&location.source_id)?;
        let removed = breakpoints.remove(&location.position);
        if breakpoints.is_empty() {
            self.by_source.remove(&location.source_id);
        }
        removed
    }

    /// Removes every breakpoint in `source_id`.
    pub fn clear_source(&mut self, source_id: &SourceId) {
        self.by_source.remove(source_id);
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.by_source.clear();
    }

    /// The breakpoint at `location`.
    #[must_use]
    pub fn get(&self, location: &Location) -> Option<&Breakpoint> {
        self.by_source
            .get(&location.source_id)?
            .get(&location.position)
    }

    /// The breakpoint at `location`, mutably.
    pub fn get_mut(&mut self, location: &Location) -> Option<&mut Breakpoint> {
        self.by_source
            .get_mut(&location.source_id)?
            .get_mut(&location.position)
    }

    /// Breakpoints in `source_id`, by position.
    pub fn in_source(&self, source_id: &SourceId) -> impl Iterator<Item = &Breakpoint> {
        self.by_source
            .get(source_id)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    /// Total number of breakpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_source.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if there are no breakpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}
