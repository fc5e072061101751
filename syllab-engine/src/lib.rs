//! SYLLAB Engine - Build Orchestration
//!
//! Drives a queued build job through its phases (plan, modules, assessments,
//! schedule) against a [`syllab_store::BuildStore`], with checkpoint-based
//! resume, heartbeat liveness, bounded retries and per-module failure
//! isolation. Content generation goes through the `syllab-gen` trait seams;
//! the engine owns everything around those calls.

pub mod dispatch;
pub mod fallback;
pub mod lease;
pub mod pipeline;
pub mod retry;
pub mod scheduler;

pub use dispatch::Dispatcher;
pub use lease::{HeartbeatGuard, LeaseManager};
pub use pipeline::Pipeline;
pub use retry::{request_recovery, request_retry, RecoveryOutcome, RetryOutcome};
pub use syllab_core::EngineConfig;
