//! Thinking trace classification
//!
//! The agent writes its trace as an append-only, newline-delimited log. The
//! renderer re-derives the step list from the full text on every update, so
//! the reducer only ever concatenates strings.

/// Prefixes that mark a failed step. Checked first.
const ERROR_PREFIXES: &[&str] = &[
    "Parse error:",
    "Validation failed:",
    "Execution error:",
    "Error:",
];

const SQL_PREFIX: &str = "SQL:";

/// Prefixes the agent uses for the actions it takes
const ACTION_PREFIXES: &[&str] = &[
    "Routing to:",
    "Introspecting",
    "Found ",
    "Generating SQL",
    "Validating",
    "Executing query",
    "Query returned",
    "Synthesizing",
    "Retrying",
    "Reasoning:",
];

/// Kind of trace line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCategory {
    Action,
    Error,
    Sql,
    Plain,
}

impl StepCategory {
    /// Categorise a single non-blank line. First match wins:
    /// error, then sql, then action, otherwise plain.
    pub fn of(line: &str) -> Self {
        if ERROR_PREFIXES.iter().any(|p| line.starts_with(p)) {
            StepCategory::Error
        } else if line.starts_with(SQL_PREFIX) {
            StepCategory::Sql
        } else if ACTION_PREFIXES.iter().any(|p| line.starts_with(p)) {
            StepCategory::Action
        } else {
            StepCategory::Plain
        }
    }
}

/// How a step should be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Pulsing indicator
    InProgress,
    /// Checkmark
    Done,
    /// Error glyph
    Failed,
}

/// One classified line of the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingStep {
    pub text: String,
    pub category: StepCategory,
    /// The step is still running. Only ever true for the last action step
    /// of a trace that is still streaming.
    pub is_terminal: bool,
}

impl ThinkingStep {
    pub fn status(&self) -> StepStatus {
        if self.is_terminal {
            StepStatus::InProgress
        } else if self.category == StepCategory::Error {
            StepStatus::Failed
        } else {
            StepStatus::Done
        }
    }
}

/// Split trace text into classified steps. Blank lines produce no step.
pub fn classify(thinking: &str, still_streaming: bool) -> Vec<ThinkingStep> {
    let mut steps: Vec<ThinkingStep> = thinking
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ThinkingStep {
            text: line.to_string(),
            category: StepCategory::of(line),
            is_terminal: false,
        })
        .collect();

    if still_streaming {
        if let Some(last) = steps.last_mut() {
            last.is_terminal = last.category == StepCategory::Action;
        }
    }

    steps
}

/// Memoised [`classify`] for a single message.
///
/// Trace text only ever grows while a message streams, so its length plus
/// the streaming flag identify the input. Use one cache per message.
#[derive(Debug, Default)]
pub struct StepCache {
    key: Option<(usize, bool)>,
    steps: Vec<ThinkingStep>,
}

impl StepCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify, reusing the previous result when the key is unchanged
    pub fn classify(&mut self, thinking: &str, still_streaming: bool) -> &[ThinkingStep] {
        let key = (thinking.len(), still_streaming);
        if self.key != Some(key) {
            self.steps = classify(thinking, still_streaming);
            self.key = Some(key);
        }
        &self.steps
    }

    /// Forget the cached result (e.g. when switching to another message)
    pub fn reset(&mut self) {
        self.key = None;
        self.steps.clear();
    }
}
