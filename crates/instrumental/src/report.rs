//! Text reports over a recorder.

use crate::recorder::ExecutionRecorder;

/// Per-module condition totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSummary {
    /// Module name
    pub modulename: String,
    /// Reachable outcomes across all constructs
    pub total: usize,
    /// Outcomes observed at least once
    pub hit: usize,
}

impl ModuleSummary {
    /// Share of outcomes hit
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.hit as f64 / self.total as f64 * 100.0
    }
}

/// Condition and statement reports
#[derive(Debug, Clone, Copy)]
pub struct ExecutionReport<'a> {
    recorder: &'a ExecutionRecorder,
}

impl<'a> ExecutionReport<'a> {
    /// Report over `recorder`
    #[must_use]
    pub const fn new(recorder: &'a ExecutionRecorder) -> Self {
        Self { recorder }
    }

    /// Result blocks of every construct with missed outcomes, or of all
    /// constructs when `show_all` is set
    #[must_use]
    pub fn report(&self, show_all: bool) -> String {
        let mut lines = vec![
            String::new(),
            "-----------------------------".to_string(),
            "Instrumental Coverage Summary".to_string(),
            "-----------------------------".to_string(),
            String::new(),
        ];
        for construct in self.recorder.constructs() {
            if show_all || construct.conditions_missed() > 0 {
                lines.push(construct.result());
                lines.push(String::new());
            }
        }
        lines.join("\n")
    }

    /// Condition totals per module that has constructs
    #[must_use]
    pub fn module_summaries(&self) -> Vec<ModuleSummary> {
        self.recorder
            .modules()
            .iter()
            .filter(|(_, module)| !module.constructs.is_empty())
            .map(|(name, module)| ModuleSummary {
                modulename: name.clone(),
                total: module
                    .constructs
                    .values()
                    .map(|c| c.number_of_conditions())
                    .sum(),
                hit: module
                    .constructs
                    .values()
                    .map(|c| c.number_of_conditions_hit())
                    .sum(),
            })
            .collect()
    }

    /// One `"<module>: <hit>/<total> hit (<pct>%)"` line per module
    #[must_use]
    pub fn summary(&self) -> String {
        self.module_summaries()
            .iter()
            .map(|s| format!("{}: {}/{} hit ({:.0}%)", s.modulename, s.hit, s.total, s.percent()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Executable line totals and missing lines per module
    #[must_use]
    pub fn statement_summary(&self) -> String {
        let mut lines = vec![
            String::new(),
            "Statement coverage report".to_string(),
            String::new(),
        ];
        for (name, module) in self.recorder.modules() {
            let missing: Vec<String> = module.missing_lines().map(|l| l.to_string()).collect();
            lines.push(name.clone());
            lines.push(format!("\tTotal: {}", module.statements.len()));
            lines.push(format!("\tMissing: [{}]", missing.join(", ")));
        }
        lines.join("\n")
    }
}
