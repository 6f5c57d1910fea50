use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringState {
    #[default]
    Stopped,
    Running,
}

/// Foreground work that runs alongside (not instead of) the background cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BusyKind {
    AnalyzeOnce,
    GenerateNotes,
    ProcessLogs,
}

/// What the menu bar shows. Always derived from [`StatusFlags`], never stored
/// on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum DisplayState {
    #[default]
    Idle,
    Active,
    Analyzing,
    Generating,
    Processing,
    Error(String),
}

impl DisplayState {
    pub fn label(&self) -> String {
        match self {
            DisplayState::Idle => "📸".into(),
            DisplayState::Active => "👁️".into(),
            DisplayState::Analyzing => "📸 Analyzing...".into(),
            DisplayState::Generating => "📝 Generating...".into(),
            DisplayState::Processing => "🗂️ Processing...".into(),
            DisplayState::Error(message) => format!("⚠️ {message}"),
        }
    }
}

/// Everything the display is computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub state: MonitoringState,
    pub analyze_once: u32,
    pub generate_notes: u32,
    pub process_logs: u32,
    /// The background cycle is inside a capture sequence.
    pub cycle_busy: bool,
    /// Last one-off failure; cleared by the next state change or new work.
    pub flash_error: Option<String>,
}

impl StatusFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy_count(&self, kind: BusyKind) -> u32 {
        match kind {
            BusyKind::AnalyzeOnce => self.analyze_once,
            BusyKind::GenerateNotes => self.generate_notes,
            BusyKind::ProcessLogs => self.process_logs,
        }
    }

    fn busy_slot(&mut self, kind: BusyKind) -> &mut u32 {
        match kind {
            BusyKind::AnalyzeOnce => &mut self.analyze_once,
            BusyKind::GenerateNotes => &mut self.generate_notes,
            BusyKind::ProcessLogs => &mut self.process_logs,
        }
    }

    pub fn begin_busy(&mut self, kind: BusyKind) {
        self.flash_error = None;
        *self.busy_slot(kind) += 1;
    }

    pub fn end_busy(&mut self, kind: BusyKind) {
        let slot = self.busy_slot(kind);
        *slot = slot.saturating_sub(1);
    }

    pub fn busy_kinds(&self) -> Vec<BusyKind> {
        [BusyKind::AnalyzeOnce, BusyKind::GenerateNotes, BusyKind::ProcessLogs]
            .into_iter()
            .filter(|kind| self.busy_count(*kind) > 0)
            .collect()
    }

    pub fn display(&self) -> DisplayState {
        if let Some(message) = &self.flash_error {
            return DisplayState::Error(message.clone());
        }
        if self.generate_notes > 0 {
            return DisplayState::Generating;
        }
        if self.process_logs > 0 {
            return DisplayState::Processing;
        }
        if self.analyze_once > 0 || self.cycle_busy {
            return DisplayState::Analyzing;
        }
        match self.state {
            MonitoringState::Running => DisplayState::Active,
            MonitoringState::Stopped => DisplayState::Idle,
        }
    }
}
