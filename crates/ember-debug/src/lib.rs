//! Editor-hosted debug session engine over the Debug Adapter Protocol.
//!
//! The engine owns the protocol choreography and the debug-state model; the
//! embedding host supplies the transport (a connected adapter process), the
//! resolved configuration, and a [`presenter::Presenter`] that renders the
//! snapshots the engine emits.

pub mod breakpoints;
pub mod config;
pub mod error;
pub mod presenter;
pub mod session;
pub mod tree;
pub mod variables;

pub use breakpoints::{BreakpointStore, BreakpointView, ToggleOutcome};
pub use config::{AdapterConfig, LaunchKind};
pub use error::{EngineError, EngineResult};
pub use presenter::{FrameLocation, NullPresenter, Presenter};
pub use session::{Session, SessionState, StepKind};
pub use tree::{TreeCache, TreeNode};
