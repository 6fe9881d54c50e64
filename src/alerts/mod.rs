//! Change detection and subscriber alerts.

pub mod detector;
pub mod notifier;
pub mod service;
pub mod snapshot_store;

pub use detector::{
    compare_dataset, keyword_matches, ChangeDetector, DatasetCheck, FieldChange, ThemeCheck,
    TrackedField,
};
pub use notifier::{AlertEvent, Notifier, NotifyReport, TelegramNotifier};
pub use service::{AlertRunSummary, AlertService, SubscriptionKind, SubscriptionSource};
pub use snapshot_store::{DatasetSnapshot, MemorySnapshotLog, SnapshotStore, ThemeSnapshot};
