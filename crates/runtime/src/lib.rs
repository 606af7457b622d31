pub mod auto;
pub mod notify;
pub mod openai_tools;
pub mod reminders;
pub mod session_registry;
pub mod turn;

pub use auto::AutoScheduler;
pub use notify::{NotificationSink, TracingSink};
pub use openai_tools::specs_to_openai_tools;
pub use reminders::{due_reminders, mark_surfaced, ReminderRecord};
pub use session_registry::SessionRegistry;
pub use turn::{ProviderFailure, TerminationReason, TurnEngine, TurnOutcome, VoiceOutcome};
