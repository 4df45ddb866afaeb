//! Signal delivery
//!
//! Every signal handed to the dispatcher is first written to the local
//! journal, then pushed to the primary channel with retries, then to the
//! fallback channel. The bounded queue decouples delivery from evaluation.

pub mod backoff;
pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod journal;
pub mod queue;

pub use backoff::Backoff;
pub use channels::{EmailChannel, NotificationChannel, TelegramChannel};
pub use dispatcher::{DispatchOutcome, DispatchPolicy, DispatchReport, Dispatcher};
pub use error::DeliveryError;
pub use format::{email_subject, format_message};
pub use journal::SignalJournal;
pub use queue::{DispatchQueue, PushOutcome};
