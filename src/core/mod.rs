//! Core orchestration: handler protocol, router, scheduler and the voice gate.

pub mod audit;
pub mod capability;
pub mod error;
pub mod gate;
pub mod handler;
pub mod router;
pub mod scheduler;

pub use audit::{
    build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, LifecycleAction,
    TracingAuditSink,
};
pub use capability::{
    Capability, CapabilitySet, Collaborators, HandlerContext, ListenOptions, ServerStatus,
    StatusSnapshot, VoiceInput, VoiceOutput,
};
pub use error::{AppResult, AssistantError, Result};
pub use gate::{ExclusiveResourceGate, ExclusiveTicket, GateGuard};
pub use handler::{
    ActiveHandler, FireAt, FiringContext, Liveness, Mailbox, ManagementMessage, Payload,
    ScheduledHandler,
};
pub use router::{split_utterance, CommandRouter, RouterSettings};
pub use scheduler::{
    EventScheduler, ScheduleRequest, ScheduledEventInfo, SchedulerHandle, Spawn,
};
