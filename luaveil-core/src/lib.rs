//! LuaVeil: orchestration around an external Lua obfuscation engine.

pub mod bitmask;
pub mod config;
pub mod delivery;
pub mod encoding;
pub mod errors;
pub mod fetch;
pub mod invoker;
pub mod logger;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod toolchain;
pub mod validator;

// Re-exports
pub use bitmask::{active_keys, toggle, MethodSelection};
pub use config::{AppConfig, ConfigOverrides};
pub use delivery::TransportPayload;
pub use errors::{CoreError, Result};
pub use invoker::{IntensityPreset, InvokeOutcome, ObfuscationInvoker};
pub use metrics::Metrics;
pub use orchestrator::{
    ArtifactSink, DebugReport, DebugSink, EscalationChoice, EscalationPrompt, JobLimits,
    JobOutcome, JobState, MethodPrompt, Orchestrator, RejectReason, Submission,
};
pub use registry::{MethodRegistry, ObfuscationMethod};
pub use toolchain::Toolchain;
pub use validator::{SyntaxValidator, ValidationResult};
