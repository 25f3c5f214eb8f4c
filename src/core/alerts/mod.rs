// Alert system module: task health classification and alert emails.
//
// Architecture:
// - model.rs: Alert kinds, severities, escalation and per-rule config
// - triggers.rs: Per-rule evaluation for one task on one day
// - engine.rs: Plans alert emails for a task list and dispatches them

pub mod engine;
pub mod model;
pub mod triggers;

pub use engine::{AlertEngine, AlertEngineConfig, AlertRecipients, DispatchReport};
pub use model::{Alert, AlertKind, AlertLevel, AlertReport, Escalation, Severity};
pub use triggers::derive_alerts;
