//! User breakpoints and their reconciliation with the adapter.
//!
//! The store is the source of truth for what the user asked for; the adapter
//! is the source of truth for what is actually verified. `sync_all` pushes the
//! enabled set and merges the adapter's verdict back without touching
//! enablement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ember_dap::types::{
    Breakpoint, BreakpointEventBody, Capabilities, FunctionBreakpointArg, SetBreakpointsArguments,
    SetBreakpointsResponseBody, SetExceptionBreakpointsArguments, SetFunctionBreakpointsArguments,
    Source, SourceBreakpoint,
};
use ember_dap::DapClient;

use crate::error::{decode_body, encode_args, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointState {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineBreakpoint {
    pub line: u32,
    pub state: BreakpointState,
    pub condition: Option<String>,
    /// Server-assigned id, present once the adapter has seen the breakpoint.
    pub id: Option<i64>,
    pub verified: bool,
    pub message: Option<String>,
    /// Line the adapter actually bound to, when it moved the breakpoint.
    pub adapter_line: Option<u32>,
}

impl LineBreakpoint {
    fn new(line: u32) -> Self {
        LineBreakpoint {
            line,
            state: BreakpointState::Enabled,
            condition: None,
            id: None,
            verified: false,
            message: None,
            adapter_line: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.state == BreakpointState::Enabled
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBreakpoint {
    pub name: String,
    pub state: BreakpointState,
    pub id: Option<i64>,
    pub verified: bool,
}

/// What `toggle` did at a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Disabled,
    Removed,
}

/// Flat presenter-facing view of one breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointView {
    pub path: Option<PathBuf>,
    pub function: Option<String>,
    pub line: Option<u32>,
    pub enabled: bool,
    pub verified: bool,
    pub id: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Default)]
pub struct BreakpointStore {
    files: BTreeMap<PathBuf, BTreeMap<u32, LineBreakpoint>>,
    functions: Vec<FunctionBreakpoint>,
    /// Exception filters the user picked; `None` until asked this session.
    exception_filters: Option<Vec<String>>,
    exception_filters_sent: bool,
    /// True while the adapter holds a non-empty function breakpoint set, so
    /// removing the last one still sends a clearing sync.
    functions_armed: bool,
}

impl BreakpointStore {
    pub fn new() -> Self {
        BreakpointStore::default()
    }

    /// Cycle the breakpoint at a line: absent → enabled → disabled → removed.
    pub fn toggle(&mut self, path: impl AsRef<Path>, line: u32) -> ToggleOutcome {
        let file = self.files.entry(path.as_ref().to_path_buf()).or_default();
        let outcome = match file.get_mut(&line) {
            None => {
                file.insert(line, LineBreakpoint::new(line));
                ToggleOutcome::Added
            }
            Some(bp) if bp.enabled() => {
                bp.state = BreakpointState::Disabled;
                ToggleOutcome::Disabled
            }
            Some(_) => {
                file.remove(&line);
                ToggleOutcome::Removed
            }
        };
        // An emptied file stays in the map until sync_all has pushed one
        // clearing (empty) setBreakpoints for it; dropping it here would
        // leave the adapter's last set armed.
        outcome
    }

    pub fn set_condition(&mut self, path: impl AsRef<Path>, line: u32, condition: Option<String>) {
        if let Some(bp) = self
            .files
            .get_mut(path.as_ref())
            .and_then(|file| file.get_mut(&line))
        {
            bp.condition = condition;
        }
    }

    pub fn add_function_breakpoint(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.functions.iter().any(|bp| bp.name == name) {
            return;
        }
        self.functions.push(FunctionBreakpoint {
            name,
            state: BreakpointState::Enabled,
            id: None,
            verified: false,
        });
    }

    pub fn remove_function_breakpoint(&mut self, name: &str) -> bool {
        let before = self.functions.len();
        self.functions.retain(|bp| bp.name != name);
        self.functions.len() != before
    }

    pub fn line_breakpoints(&self, path: impl AsRef<Path>) -> Vec<LineBreakpoint> {
        self.files
            .get(path.as_ref())
            .map(|file| file.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every breakpoint, line ones first (by path, then line), then functions.
    pub fn snapshot(&self) -> Vec<BreakpointView> {
        let mut views = Vec::new();
        for (path, file) in &self.files {
            for bp in file.values() {
                views.push(BreakpointView {
                    path: Some(path.clone()),
                    function: None,
                    line: Some(bp.adapter_line.unwrap_or(bp.line)),
                    enabled: bp.enabled(),
                    verified: bp.verified,
                    id: bp.id,
                    message: bp.message.clone(),
                });
            }
        }
        for bp in &self.functions {
            views.push(BreakpointView {
                path: None,
                function: Some(bp.name.clone()),
                line: None,
                enabled: bp.state == BreakpointState::Enabled,
                verified: bp.verified,
                id: bp.id,
                message: None,
            });
        }
        views
    }

    /// Record the user's exception-filter pick for this session.
    pub fn choose_exception_filters(&mut self, filters: Vec<String>) {
        self.exception_filters = Some(filters);
    }

    pub fn exception_filters_chosen(&self) -> bool {
        self.exception_filters.is_some()
    }

    /// Forget adapter-side state; user declarations survive into the next
    /// session.
    pub fn reset_session(&mut self) {
        self.files.retain(|_, file| !file.is_empty());
        for file in self.files.values_mut() {
            for bp in file.values_mut() {
                bp.id = None;
                bp.verified = false;
                bp.message = None;
                bp.adapter_line = None;
            }
        }
        for bp in &mut self.functions {
            bp.id = None;
            bp.verified = false;
        }
        self.exception_filters = None;
        self.exception_filters_sent = false;
        self.functions_armed = false;
    }

    /// Push the enabled breakpoint set to the adapter and merge its verdict.
    /// Idempotent: re-running with unchanged input reproduces the same
    /// verified snapshot.
    pub async fn sync_all(
        &mut self,
        client: &DapClient,
        capabilities: &Capabilities,
    ) -> EngineResult<()> {
        for (path, file) in &mut self.files {
            let sent: Vec<u32> = file
                .values()
                .filter(|bp| bp.enabled())
                .map(|bp| bp.line)
                .collect();
            let arguments = SetBreakpointsArguments {
                source: Source::from_path(path.clone()),
                breakpoints: file
                    .values()
                    .filter(|bp| bp.enabled())
                    .map(|bp| SourceBreakpoint {
                        line: bp.line,
                        condition: bp.condition.clone(),
                        hit_condition: None,
                        log_message: None,
                    })
                    .collect(),
                source_modified: None,
            };
            let body = client
                .request("setBreakpoints", Some(encode_args("setBreakpoints", &arguments)?))
                .await?;
            let body: SetBreakpointsResponseBody = decode_body("setBreakpoints", body)?;
            merge_response(file, &sent, &body.breakpoints);
        }
        // Files whose clearing (empty) set has now been pushed are done.
        self.files.retain(|_, file| !file.is_empty());

        if capabilities.function_breakpoints()
            && (!self.functions.is_empty() || self.functions_armed)
        {
            let breakpoints: Vec<FunctionBreakpointArg> = self
                .functions
                .iter()
                .filter(|bp| bp.state == BreakpointState::Enabled)
                .map(|bp| FunctionBreakpointArg {
                    name: bp.name.clone(),
                    condition: None,
                })
                .collect();
            let armed = !breakpoints.is_empty();
            let arguments = SetFunctionBreakpointsArguments { breakpoints };
            let body = client
                .request(
                    "setFunctionBreakpoints",
                    Some(encode_args("setFunctionBreakpoints", &arguments)?),
                )
                .await?;
            let body: SetBreakpointsResponseBody = decode_body("setFunctionBreakpoints", body)?;
            let mut returned = body.breakpoints.iter();
            for bp in self
                .functions
                .iter_mut()
                .filter(|bp| bp.state == BreakpointState::Enabled)
            {
                match returned.next() {
                    Some(result) => {
                        bp.id = result.id;
                        bp.verified = result.verified;
                    }
                    None => {
                        bp.id = None;
                        bp.verified = false;
                    }
                }
            }
            self.functions_armed = armed;
        }

        if let Some(filters) = &self.exception_filters {
            if !self.exception_filters_sent {
                let arguments = SetExceptionBreakpointsArguments {
                    filters: filters.clone(),
                };
                // The response body carries nothing we act on.
                client
                    .request(
                        "setExceptionBreakpoints",
                        Some(encode_args("setExceptionBreakpoints", &arguments)?),
                    )
                    .await?;
                self.exception_filters_sent = true;
            }
        }
        Ok(())
    }

    /// Apply an adapter-initiated `breakpoint` event. Unknown reasons are a
    /// reported protocol anomaly for the caller to surface.
    pub fn on_breakpoint_event(&mut self, body: &BreakpointEventBody) -> Result<(), String> {
        match body.reason.as_str() {
            "new" => {
                if self.update_by_id(&body.breakpoint) {
                    return Ok(());
                }
                let Some(path) = body.breakpoint.source.as_ref().and_then(|s| s.path.clone())
                else {
                    return Err("breakpoint event with no source path".to_string());
                };
                let line = body.breakpoint.line.unwrap_or(0);
                let file = self.files.entry(path).or_default();
                let bp = file.entry(line).or_insert_with(|| LineBreakpoint::new(line));
                bp.id = body.breakpoint.id;
                bp.verified = body.breakpoint.verified;
                bp.message = body.breakpoint.message.clone();
                Ok(())
            }
            "changed" => {
                if self.update_by_id(&body.breakpoint) {
                    Ok(())
                } else {
                    Err(format!(
                        "breakpoint changed event for unknown id {:?}",
                        body.breakpoint.id
                    ))
                }
            }
            "removed" => {
                let Some(id) = body.breakpoint.id else {
                    return Err("breakpoint removed event without an id".to_string());
                };
                for file in self.files.values_mut() {
                    file.retain(|_, bp| bp.id != Some(id));
                }
                self.files.retain(|_, file| !file.is_empty());
                self.functions.retain(|bp| bp.id != Some(id));
                Ok(())
            }
            other => Err(format!("unrecognized breakpoint event reason {other:?}")),
        }
    }

    fn update_by_id(&mut self, breakpoint: &Breakpoint) -> bool {
        let Some(id) = breakpoint.id else {
            return false;
        };
        for file in self.files.values_mut() {
            for bp in file.values_mut() {
                if bp.id == Some(id) {
                    bp.verified = breakpoint.verified;
                    bp.message = breakpoint.message.clone();
                    bp.adapter_line = breakpoint.line;
                    return true;
                }
            }
        }
        for bp in &mut self.functions {
            if bp.id == Some(id) {
                bp.verified = breakpoint.verified;
                return true;
            }
        }
        false
    }
}

/// Merge a `setBreakpoints` response into one file's breakpoints. The
/// response is positional over the lines that were sent; it is authoritative
/// for verification and ids but never for enablement. Breakpoints that were
/// not sent (disabled) lose any stale adapter metadata.
fn merge_response(
    file: &mut BTreeMap<u32, LineBreakpoint>,
    sent: &[u32],
    returned: &[Breakpoint],
) {
    for bp in file.values_mut() {
        if !bp.enabled() {
            bp.id = None;
            bp.verified = false;
            bp.message = None;
            bp.adapter_line = None;
        }
    }
    for (index, &line) in sent.iter().enumerate() {
        let Some(bp) = file.get_mut(&line) else {
            continue;
        };
        match returned.get(index) {
            Some(result) => {
                bp.id = result.id;
                bp.verified = result.verified;
                bp.message = result.message.clone();
                bp.adapter_line = result.line.filter(|&l| l != line);
            }
            None => {
                bp.id = None;
                bp.verified = false;
            }
        }
    }
}
