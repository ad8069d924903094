//! The UI collaborator boundary.
//!
//! The engine hands the presenter immutable snapshots and never touches
//! presentation state; hosts render them however they like. Every method has
//! a do-nothing default so presenters implement only what they show.

use std::path::PathBuf;

use ember_dap::types::{ExceptionBreakpointsFilter, Thread};

use crate::breakpoints::BreakpointView;
use crate::session::SessionState;
use crate::tree::TreeNode;

/// Where execution is currently paused, resolved enough to show.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLocation {
    pub frame_name: String,
    pub path: Option<PathBuf>,
    pub source_name: Option<String>,
    /// Text fetched via the `source` request for frames that only carry a
    /// source reference.
    pub source_content: Option<String>,
    pub line: u32,
    pub column: u32,
}

pub trait Presenter: Send + 'static {
    /// One-line user-visible notices: request failures, protocol anomalies,
    /// local no-ops.
    fn message(&mut self, _text: &str) {}

    /// Debuggee/adapter output (`output` events).
    fn output(&mut self, _category: Option<&str>, _text: &str) {}

    fn state_changed(&mut self, _state: SessionState) {}

    fn current_frame(&mut self, _frame: Option<&FrameLocation>) {}

    fn threads(&mut self, _threads: &[Thread], _tree: &[TreeNode]) {}

    fn variables(&mut self, _tree: &[TreeNode]) {}

    fn watches(&mut self, _tree: &[TreeNode]) {}

    fn breakpoints(&mut self, _breakpoints: &[BreakpointView]) {}

    /// Asked at most once per session, and only when the adapter declares
    /// filters. The default picks the adapter's own defaults.
    fn pick_exception_filters(&mut self, filters: &[ExceptionBreakpointsFilter]) -> Vec<String> {
        filters
            .iter()
            .filter(|filter| filter.default.unwrap_or(false))
            .map(|filter| filter.filter.clone())
            .collect()
    }
}

/// Presenter that renders nothing. Useful for headless hosts and tests that
/// only assert on engine state.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {}
