use chrono::Local;
use std::time::{Duration, Instant};

use crate::input::Action;
use crate::model::{
    Alert, ClusterPayload, ClusterSnapshot, CostReport, LOG_CAP, LogEntry, NodeDetail, NodeRow,
    PodRow, ScanReport, Severity, Tab, alert_badge_count, node_rows, pod_rows, visible_indices,
};
use crate::session::{SessionEnvelope, SessionEvent, SessionManager, SessionState, TerminalChannel};

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

const TERMINAL_BUFFER_CAP: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Search,
    Terminal,
}

/// Side effects requested by `App::apply_action`, executed by the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    RefreshCluster,
    RunScan,
    OpenTerminal { pod: String },
    ShowNodeDetail { name: String },
}

/// Trailing-edge debouncer: every keystroke pushes the deadline out; only a
/// quiet window commits, and only the latest value.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<String>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn record(&mut self, value: String, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now + SEARCH_DEBOUNCE);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }
}

#[derive(Debug, Default)]
struct SearchState {
    /// Live input buffer shown in the search bar.
    input: String,
    /// Filter actually applied to rows; lags input by the debounce window.
    committed: String,
    debouncer: Debouncer,
}

pub struct App {
    running: bool,
    mode: InputMode,
    tabs: Vec<Tab>,
    active_tab_index: usize,
    snapshot: ClusterSnapshot,
    node_rows: Vec<NodeRow>,
    pod_rows: Vec<PodRow>,
    node_search: SearchState,
    pod_search: SearchState,
    node_selected: usize,
    pod_selected: usize,
    logs: Vec<LogEntry>,
    supplied_alert_count: Option<usize>,
    cost: Option<CostReport>,
    scan: Option<ScanReport>,
    scanning: bool,
    node_detail: Option<NodeDetail>,
    session: SessionManager,
    terminal_buffer: String,
    status: String,
    show_help: bool,
    server: String,
}

impl App {
    pub fn new(server: String) -> Self {
        Self {
            running: true,
            mode: InputMode::Normal,
            tabs: Tab::ALL.to_vec(),
            active_tab_index: 0,
            snapshot: ClusterSnapshot::default(),
            node_rows: Vec::new(),
            pod_rows: Vec::new(),
            node_search: SearchState::default(),
            pod_search: SearchState::default(),
            node_selected: 0,
            pod_selected: 0,
            logs: Vec::new(),
            supplied_alert_count: None,
            cost: None,
            scan: None,
            scanning: false,
            node_detail: None,
            session: SessionManager::new(),
            terminal_buffer: String::new(),
            status: "Connecting…".to_string(),
            show_help: false,
            server,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_tab(&self) -> Tab {
        self.tabs[self.active_tab_index]
    }

    pub fn snapshot(&self) -> &ClusterSnapshot {
        &self.snapshot
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn cost(&self) -> Option<&CostReport> {
        self.cost.as_ref()
    }

    pub fn scan(&self) -> Option<&ScanReport> {
        self.scan.as_ref()
    }

    pub fn scanning(&self) -> bool {
        self.scanning
    }

    pub fn node_detail(&self) -> Option<&NodeDetail> {
        self.node_detail.as_ref()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn terminal_buffer(&self) -> &str {
        &self.terminal_buffer
    }

    // --- polling results -------------------------------------------------

    /// A successful cluster poll: one-assignment replacement of the cluster
    /// fields, then row rebake so filter keys match the new snapshot.
    pub fn apply_cluster(&mut self, payload: ClusterPayload) {
        self.snapshot.apply_cluster(payload, Local::now());
        self.node_rows = node_rows(&self.snapshot.nodes);
        self.pod_rows = pod_rows(&self.snapshot.pods);
        self.clamp_selections();
        self.status = match self.snapshot.last_updated {
            Some(at) => format!("Last updated: {}", at.format("%H:%M:%S")),
            None => String::new(),
        };
    }

    /// A failed cluster cycle: snapshot untouched, exactly one log line.
    pub fn record_cluster_failure(&mut self, error: &str) {
        self.push_log(format!("Update failed: {error}"), Severity::Critical);
    }

    /// The alert-check task: replaces the alert list, recomputes the badge
    /// from the supplied list, appends one log line per alert.
    pub fn apply_alerts(&mut self, alerts: Vec<Alert>) {
        self.supplied_alert_count = Some(alert_badge_count(Some(&alerts), &self.snapshot.alerts));
        for alert in &alerts {
            self.push_log(
                format!("[{}] {}", alert.severity, alert.message),
                Severity::Critical,
            );
        }
        self.snapshot.set_alerts(alerts);
    }

    /// Badge value: last explicitly supplied count, else the cached list
    /// length, else zero. Zero hides the badge.
    pub fn alert_badge(&self) -> usize {
        match self.supplied_alert_count {
            Some(count) => count,
            None => alert_badge_count(None, &self.snapshot.alerts),
        }
    }

    pub fn set_cost(&mut self, cost: CostReport) {
        self.cost = Some(cost);
    }

    pub fn scan_finished(&mut self, report: ScanReport) {
        self.scanning = false;
        self.push_log("[SCAN] Security scan completed".to_string(), Severity::Info);
        self.scan = Some(report);
    }

    pub fn scan_failed(&mut self, error: &str) {
        self.scanning = false;
        self.push_log(format!("Scan failed: {error}"), Severity::Critical);
    }

    pub fn set_node_detail(&mut self, detail: NodeDetail) {
        self.node_detail = Some(detail);
    }

    pub fn push_log(&mut self, message: String, severity: Severity) {
        self.logs.insert(
            0,
            LogEntry {
                timestamp: Local::now(),
                message,
                severity,
            },
        );
        self.logs.truncate(LOG_CAP);
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    // --- search ----------------------------------------------------------

    pub fn search_input(&self, tab: Tab) -> &str {
        match tab {
            Tab::Nodes => &self.node_search.input,
            Tab::Pods => &self.pod_search.input,
            _ => "",
        }
    }

    pub fn committed_query(&self, tab: Tab) -> &str {
        match tab {
            Tab::Nodes => &self.node_search.committed,
            Tab::Pods => &self.pod_search.committed,
            _ => "",
        }
    }

    /// Earliest pending debounce deadline, for the run loop's timer arm.
    pub fn next_search_deadline(&self) -> Option<Instant> {
        match (
            self.node_search.debouncer.deadline(),
            self.pod_search.debouncer.deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Commit any due debounced query. Returns true if a filter changed.
    pub fn poll_search(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if let Some(query) = self.node_search.debouncer.take_due(now) {
            self.node_search.committed = query;
            self.node_selected = 0;
            changed = true;
        }
        if let Some(query) = self.pod_search.debouncer.take_due(now) {
            self.pod_search.committed = query;
            self.pod_selected = 0;
            changed = true;
        }
        changed
    }

    pub fn visible_node_rows(&self) -> Vec<&NodeRow> {
        visible_indices(
            self.node_rows.iter().map(|row| row.filter_key.as_str()),
            &self.node_search.committed,
        )
        .into_iter()
        .map(|index| &self.node_rows[index])
        .collect()
    }

    pub fn visible_pod_rows(&self) -> Vec<&PodRow> {
        visible_indices(
            self.pod_rows.iter().map(|row| row.filter_key.as_str()),
            &self.pod_search.committed,
        )
        .into_iter()
        .map(|index| &self.pod_rows[index])
        .collect()
    }

    pub fn selected_index(&self, tab: Tab) -> usize {
        match tab {
            Tab::Nodes => self.node_selected,
            Tab::Pods => self.pod_selected,
            _ => 0,
        }
    }

    fn clamp_selections(&mut self) {
        let nodes = self.visible_node_rows().len();
        let pods = self.visible_pod_rows().len();
        self.node_selected = self.node_selected.min(nodes.saturating_sub(1));
        self.pod_selected = self.pod_selected.min(pods.saturating_sub(1));
    }

    // --- terminal session -------------------------------------------------

    pub fn open_session(
        &mut self,
        pod: &str,
        connect: impl FnOnce(u64) -> Box<dyn TerminalChannel>,
    ) {
        self.terminal_buffer.clear();
        self.session.open(pod, connect);
        self.switch_tab(Tab::Terminal);
        self.mode = InputMode::Terminal;
        self.push_log(format!("Opening terminal to {pod}"), Severity::Info);
    }

    pub fn close_session(&mut self) {
        if self.session.state() != SessionState::Closed {
            let pod = self.session.pod().unwrap_or("pod").to_string();
            self.session.close();
            self.terminal_buffer.clear();
            self.push_log(format!("Terminal session closed for {pod}"), Severity::Info);
        }
        if self.mode == InputMode::Terminal {
            self.mode = InputMode::Normal;
        }
    }

    pub fn on_session_event(&mut self, envelope: SessionEnvelope) {
        let pod = self.session.pod().unwrap_or("pod").to_string();
        let Some(event) = self.session.handle(envelope) else {
            return;
        };
        match event {
            SessionEvent::Connected => {
                self.terminal_push(&format!("Connected to {pod}\r\n$ "));
            }
            SessionEvent::Output(text) => self.terminal_push(&text),
            SessionEvent::Error(reason) => {
                tracing::warn!("terminal channel error: {reason}");
                self.terminal_push("\r\nConnection error\r\n");
            }
            SessionEvent::Closed => {
                self.terminal_push("\r\n[session closed]\r\n");
                if self.mode == InputMode::Terminal {
                    self.mode = InputMode::Normal;
                }
            }
        }
    }

    fn terminal_push(&mut self, text: &str) {
        self.terminal_buffer.push_str(text);
        if self.terminal_buffer.len() > TERMINAL_BUFFER_CAP {
            let cut = self.terminal_buffer.len() - TERMINAL_BUFFER_CAP;
            let cut = self
                .terminal_buffer
                .char_indices()
                .map(|(index, _)| index)
                .find(|index| *index >= cut)
                .unwrap_or(0);
            self.terminal_buffer.drain(..cut);
        }
    }

    // --- actions ----------------------------------------------------------

    pub fn switch_tab(&mut self, tab: Tab) {
        // Idempotent: re-selecting the active tab changes nothing.
        if let Some(index) = self.tabs.iter().position(|candidate| *candidate == tab) {
            self.active_tab_index = index;
        }
        self.mode = if tab == Tab::Terminal && self.session.state() != SessionState::Closed {
            InputMode::Terminal
        } else {
            InputMode::Normal
        };
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Quit => {
                self.running = false;
            }
            Action::NextTab => {
                let next = (self.active_tab_index + 1) % self.tabs.len();
                self.switch_tab(self.tabs[next]);
            }
            Action::PrevTab => {
                let previous = (self.active_tab_index + self.tabs.len() - 1) % self.tabs.len();
                self.switch_tab(self.tabs[previous]);
            }
            Action::SwitchTab(index) => {
                if let Some(tab) = self.tabs.get(index as usize).copied() {
                    self.switch_tab(tab);
                }
            }
            Action::Down => self.move_selection(1),
            Action::Up => self.move_selection(-1),
            Action::StartSearch => {
                if self.active_tab().searchable() {
                    self.mode = InputMode::Search;
                }
            }
            Action::SearchChar(c) => {
                let now = Instant::now();
                let tab = self.active_tab();
                if let Some(search) = self.search_state_mut(tab) {
                    search.input.push(c);
                    let value = search.input.clone();
                    search.debouncer.record(value, now);
                }
            }
            Action::SearchBackspace => {
                let now = Instant::now();
                let tab = self.active_tab();
                if let Some(search) = self.search_state_mut(tab) {
                    search.input.pop();
                    let value = search.input.clone();
                    search.debouncer.record(value, now);
                }
            }
            Action::CancelSearch => {
                let tab = self.active_tab();
                if let Some(search) = self.search_state_mut(tab) {
                    search.input.clear();
                    search.committed.clear();
                    search.debouncer.cancel();
                }
                self.mode = InputMode::Normal;
            }
            Action::EndSearch => {
                self.mode = InputMode::Normal;
            }
            Action::Refresh => return AppCommand::RefreshCluster,
            Action::RunScan => {
                if !self.scanning {
                    self.scanning = true;
                    self.push_log("[SCAN] Security scan started".to_string(), Severity::Info);
                    return AppCommand::RunScan;
                }
            }
            Action::ClearLogs => self.clear_logs(),
            Action::EnterItem => match self.active_tab() {
                Tab::Pods => {
                    if let Some(row) = self.visible_pod_rows().get(self.pod_selected) {
                        return AppCommand::OpenTerminal {
                            pod: row.name.clone(),
                        };
                    }
                }
                Tab::Nodes => {
                    if let Some(row) = self.visible_node_rows().get(self.node_selected) {
                        return AppCommand::ShowNodeDetail {
                            name: row.name.clone(),
                        };
                    }
                }
                Tab::Terminal => {
                    if self.session.state() != SessionState::Closed {
                        self.mode = InputMode::Terminal;
                    }
                }
                Tab::Dashboard => {}
            },
            Action::CloseOverlay => {
                if self.show_help {
                    self.show_help = false;
                } else {
                    self.node_detail = None;
                }
            }
            Action::CloseSession => self.close_session(),
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::LeaveTerminal => self.mode = InputMode::Normal,
            Action::TerminalInput(data) => self.session.send(&data),
        }
        AppCommand::None
    }

    fn search_state_mut(&mut self, tab: Tab) -> Option<&mut SearchState> {
        match tab {
            Tab::Nodes => Some(&mut self.node_search),
            Tab::Pods => Some(&mut self.pod_search),
            _ => None,
        }
    }

    fn move_selection(&mut self, delta: i64) {
        let (len, selected) = match self.active_tab() {
            Tab::Nodes => (self.visible_node_rows().len(), &mut self.node_selected),
            Tab::Pods => (self.visible_pod_rows().len(), &mut self.pod_selected),
            _ => return,
        };
        if len == 0 {
            *selected = 0;
            return;
        }
        let next = (*selected as i64 + delta).clamp(0, len as i64 - 1);
        *selected = next as usize;
    }
}
