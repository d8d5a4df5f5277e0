//! Suppression pragmas.
//!
//! `# pragma: no cover` comments are found per physical line, then spread
//! over the statements they govern. The host tree has no node for an `else:`
//! header, so a pragma on that line is handed down to every statement of the
//! alternate branch.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::result::{InstrumentalError, InstrumentalResult};
use crate::syntax::{self, ExceptHandler, Module, ParseError, Stmt, StmtKind};

const PRAGMA_PATTERN: &str = r"# pragma:(.+)$";

/// Suppression kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pragma {
    /// Exclude the governed statements from coverage
    NoCover,
}

impl Pragma {
    /// Every pragma with the text that selects it
    pub const ALL: [(&'static str, Self); 1] = [("no cover", Self::NoCover)];
}

static NO_PRAGMAS: BTreeSet<Pragma> = BTreeSet::new();

/// Pragmas applicable to each source line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PragmaMap {
    lines: BTreeMap<u32, BTreeSet<Pragma>>,
}

impl PragmaMap {
    /// Create a map with an empty entry for each of `line_count` lines
    #[must_use]
    pub fn with_lines(line_count: u32) -> Self {
        Self {
            lines: (1..=line_count).map(|line| (line, BTreeSet::new())).collect(),
        }
    }

    /// Pragmas for a line (empty when none apply)
    #[must_use]
    pub fn get(&self, line: u32) -> &BTreeSet<Pragma> {
        self.lines.get(&line).unwrap_or(&NO_PRAGMAS)
    }

    /// Whether a pragma applies to a line
    #[must_use]
    pub fn has(&self, line: u32, pragma: Pragma) -> bool {
        self.get(line).contains(&pragma)
    }

    /// Whether `no cover` applies to a line
    #[must_use]
    pub fn is_excluded(&self, line: u32) -> bool {
        self.has(line, Pragma::NoCover)
    }

    /// Add pragmas to a line
    pub fn extend(&mut self, line: u32, pragmas: impl IntoIterator<Item = Pragma>) {
        self.lines.entry(line).or_default().extend(pragmas);
    }

    /// Number of lines with an entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the map has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Iterate over `(line, pragmas)`
    pub fn iter(&self) -> impl Iterator<Item = (u32, &BTreeSet<Pragma>)> + '_ {
        self.lines.iter().map(|(line, pragmas)| (*line, pragmas))
    }

    fn collect_range(&self, start: u32, end_exclusive: u32) -> BTreeSet<Pragma> {
        if start >= end_exclusive {
            return BTreeSet::new();
        }
        self.lines
            .range(start..end_exclusive)
            .flat_map(|(_, pragmas)| pragmas.iter().copied())
            .collect()
    }
}

/// Finds and propagates pragmas
#[derive(Debug, Clone)]
pub struct PragmaFinder {
    pattern: Regex,
}

impl PragmaFinder {
    /// Create a finder
    pub fn new() -> InstrumentalResult<Self> {
        let pattern = Regex::new(PRAGMA_PATTERN)
            .map_err(|e| InstrumentalError::config(format!("invalid pragma pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Find pragmas in source text and propagate them over its tree
    pub fn find(&self, source: &str) -> Result<PragmaMap, ParseError> {
        let module = syntax::parse(source)?;
        Ok(self.find_in(source, &module))
    }

    /// Same as [`find`](Self::find) for source that has already been parsed
    #[must_use]
    pub fn find_in(&self, source: &str, module: &Module) -> PragmaMap {
        let mut map = self.scan(source);
        resolve_continuations(&mut map, &module.body);
        propagate_block(&mut map, &module.body);
        map
    }

    /// Line-level pragmas without any propagation
    #[must_use]
    pub fn scan(&self, source: &str) -> PragmaMap {
        let line_count = u32::try_from(source.lines().count()).unwrap_or(u32::MAX);
        let mut map = PragmaMap::with_lines(line_count);
        for (index, text) in source.lines().enumerate() {
            let Some(captures) = self.pattern.captures(text) else {
                continue;
            };
            let Some(body) = captures.get(1) else {
                continue;
            };
            let found = Pragma::ALL
                .iter()
                .filter(|(label, _)| body.as_str().contains(label))
                .map(|(_, pragma)| *pragma);
            map.extend(index as u32 + 1, found);
        }
        map
    }
}

/// Move pragmas written on a statement's continuation lines to its first line.
fn resolve_continuations(map: &mut PragmaMap, body: &[Stmt]) {
    for stmt in body {
        let found: Vec<Pragma> = stmt
            .span
            .continuation_lines()
            .flat_map(|line| map.get(line).iter().copied().collect::<Vec<_>>())
            .collect();
        if !found.is_empty() {
            map.extend(stmt.line(), found);
        }
        for_each_suite(stmt, |suite| resolve_continuations(map, suite));
    }
}

fn for_each_suite(stmt: &Stmt, mut f: impl FnMut(&[Stmt])) {
    match &stmt.kind {
        StmtKind::If { body, orelse, .. }
        | StmtKind::While { body, orelse, .. }
        | StmtKind::For { body, orelse, .. } => {
            f(body);
            f(orelse);
        }
        StmtKind::FunctionDef { body, .. }
        | StmtKind::ClassDef { body, .. }
        | StmtKind::With { body, .. } => f(body),
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            f(body);
            for handler in handlers {
                f(&handler.body);
            }
            f(orelse);
            f(finalbody);
        }
        StmtKind::Expr(_)
        | StmtKind::Assign { .. }
        | StmtKind::AugAssign { .. }
        | StmtKind::Delete(_)
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Return(_)
        | StmtKind::Raise(_)
        | StmtKind::Assert { .. }
        | StmtKind::Global(_)
        | StmtKind::Import(_)
        | StmtKind::ImportFrom { .. } => {}
    }
}

fn apply_to(map: &mut PragmaMap, suite: &[Stmt], pragmas: &BTreeSet<Pragma>) {
    if pragmas.is_empty() {
        return;
    }
    for stmt in suite {
        map.extend(stmt.line(), pragmas.iter().copied());
    }
}

fn header_pragmas(map: &PragmaMap, line: u32, body: &[Stmt]) -> BTreeSet<Pragma> {
    match body.first() {
        Some(first) => map.collect_range(line, first.line()),
        None => BTreeSet::new(),
    }
}

/// Pragmas governing an alternate suite that starts after `after_line`.
fn alternate_pragmas(
    map: &PragmaMap,
    after_line: u32,
    alternate: &[Stmt],
    header: &BTreeSet<Pragma>,
) -> BTreeSet<Pragma> {
    let Some(first) = alternate.first() else {
        return BTreeSet::new();
    };
    let mut pragmas = map.collect_range(after_line + 1, first.line());
    pragmas.extend(header.iter().copied());
    pragmas
}

fn last_end(suite: &[Stmt]) -> Option<u32> {
    suite.last().map(|stmt| stmt.span.end)
}

fn propagate_block(map: &mut PragmaMap, body: &[Stmt]) {
    for stmt in body {
        propagate_stmt(map, stmt);
    }
}

fn propagate_handler(map: &mut PragmaMap, handler: &ExceptHandler) {
    let header = header_pragmas(map, handler.span.line, &handler.body);
    apply_to(map, &handler.body, &header);
    propagate_block(map, &handler.body);
}

fn propagate_stmt(map: &mut PragmaMap, stmt: &Stmt) {
    let line = stmt.line();
    match &stmt.kind {
        StmtKind::If { body, orelse, .. }
        | StmtKind::While { body, orelse, .. }
        | StmtKind::For { body, orelse, .. } => {
            let header = header_pragmas(map, line, body);
            apply_to(map, body, &header);
            if let Some(body_end) = last_end(body) {
                let alternate = alternate_pragmas(map, body_end, orelse, &header);
                apply_to(map, orelse, &alternate);
            }
            propagate_block(map, body);
            propagate_block(map, orelse);
        }
        StmtKind::FunctionDef { body, .. }
        | StmtKind::ClassDef { body, .. }
        | StmtKind::With { body, .. } => {
            let header = header_pragmas(map, line, body);
            apply_to(map, body, &header);
            propagate_block(map, body);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let header = header_pragmas(map, line, body);
            apply_to(map, body, &header);

            let handlers_end = handlers
                .last()
                .map(|handler| handler.span.end)
                .or_else(|| last_end(body));
            if let Some(after) = handlers_end {
                let alternate = alternate_pragmas(map, after, orelse, &header);
                apply_to(map, orelse, &alternate);
            }

            let before_finally = last_end(orelse).or(handlers_end);
            if let Some(after) = before_finally {
                let alternate = alternate_pragmas(map, after, finalbody, &header);
                apply_to(map, finalbody, &alternate);
            }

            propagate_block(map, body);
            for handler in handlers {
                propagate_handler(map, handler);
            }
            propagate_block(map, orelse);
            propagate_block(map, finalbody);
        }
        StmtKind::Expr(_)
        | StmtKind::Assign { .. }
        | StmtKind::AugAssign { .. }
        | StmtKind::Delete(_)
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Return(_)
        | StmtKind::Raise(_)
        | StmtKind::Assert { .. }
        | StmtKind::Global(_)
        | StmtKind::Import(_)
        | StmtKind::ImportFrom { .. } => {}
    }
}
