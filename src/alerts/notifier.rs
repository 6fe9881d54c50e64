//! Alert payloads and their delivery to subscribers.

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::dataset_model::Dataset;

use super::detector::FieldChange;

/// New datasets listed in one theme notification
pub const MAX_NEW_LISTED: usize = 5;
/// Changed datasets listed in one theme notification
pub const MAX_CHANGED_LISTED: usize = 3;
/// Title length shown before truncation
const TITLE_PREVIEW_CHARS: usize = 50;

/// Something subscribers should hear about
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    /// Datasets appeared in a subscribed theme; `total_new` may exceed the
    /// number of datasets listed
    NewInTheme {
        theme: String,
        datasets: Vec<Dataset>,
        total_new: usize,
    },
    /// Known members of a subscribed theme changed
    ChangedInTheme { theme: String, datasets: Vec<Dataset> },
    /// A subscribed dataset changed
    DatasetChanged {
        dataset: Dataset,
        changes: Vec<FieldChange>,
    },
    /// Recently modified datasets mention a subscribed keyword
    KeywordMatches { keyword: String, datasets: Vec<Dataset> },
}

fn title_preview(title: &str) -> String {
    if title.chars().count() > TITLE_PREVIEW_CHARS {
        let head: String = title.chars().take(TITLE_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

fn push_dataset_lines(message: &mut String, dataset: &Dataset) {
    message.push_str(&format!("📄 {}\n", title_preview(&dataset.title)));
    message.push_str(&format!("🏢 {}\n", dataset.publisher));
    message.push_str(&format!("📅 {}\n\n", dataset.modified));
}

impl AlertEvent {
    /// Plain-text message sent to subscribers
    pub fn render(&self) -> String {
        match self {
            AlertEvent::NewInTheme {
                theme,
                datasets,
                total_new,
            } => {
                let mut message = format!("🆕 Nuevos datasets en {theme}\n\n");
                let listed = datasets.iter().take(MAX_NEW_LISTED);
                let shown = listed.len();
                listed.for_each(|dataset| push_dataset_lines(&mut message, dataset));
                if *total_new > shown {
                    message.push_str(&format!("... y {} más.\n\n", total_new - shown));
                }
                message.push_str("Usa /start para explorar los nuevos datasets.");
                message
            }
            AlertEvent::ChangedInTheme { theme, datasets } => {
                let mut message = format!("🔄 Datasets actualizados en {theme}\n\n");
                for dataset in datasets.iter().take(MAX_CHANGED_LISTED) {
                    push_dataset_lines(&mut message, dataset);
                }
                if datasets.len() > MAX_CHANGED_LISTED {
                    message.push_str(&format!(
                        "... y {} más.\n\n",
                        datasets.len() - MAX_CHANGED_LISTED
                    ));
                }
                message.push_str("Usa /start para ver los datasets actualizados.");
                message
            }
            AlertEvent::DatasetChanged { dataset, changes } => {
                let mut message = format!(
                    "🔄 Dataset actualizado\n\n📄 {}\n🏢 {}\n📅 Modificado: {}\n📊 Registros: {}\n",
                    title_preview(&dataset.title),
                    dataset.publisher,
                    dataset.modified,
                    dataset.records_count
                );
                for change in changes.iter().filter(|c| c.field.is_notifying()) {
                    message.push_str(&format!(
                        "• {}: {} → {}\n",
                        change.field, change.previous, change.current
                    ));
                }
                message.push_str("\nUsa /start para ver los detalles actualizados.");
                message
            }
            AlertEvent::KeywordMatches { keyword, datasets } => {
                let mut message = format!("🔎 Novedades para \"{keyword}\"\n\n");
                for dataset in datasets.iter().take(MAX_NEW_LISTED) {
                    push_dataset_lines(&mut message, dataset);
                }
                if datasets.len() > MAX_NEW_LISTED {
                    message.push_str(&format!("... y {} más.\n\n", datasets.len() - MAX_NEW_LISTED));
                }
                message.push_str("Usa /start para explorar los datasets.");
                message
            }
        }
    }
}

/// Delivery counts for one notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends a payload to a list of chats
///
/// Implementations log and count per-recipient failures instead of
/// returning them, so one blocked chat never stops the rest.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_ids: &[i64], payload: &str) -> NotifyReport;
}

/// Notifier over the Telegram Bot API
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, chat_ids: &[i64], payload: &str) -> NotifyReport {
        let mut report = NotifyReport::default();
        for &chat_id in chat_ids {
            match self.bot.send_message(ChatId(chat_id), payload).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    error!(chat_id, error = %e, "Error sending notification");
                    report.failed += 1;
                }
            }
        }
        info!(delivered = report.delivered, failed = report.failed, "Notification sent");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::detector::TrackedField;

    fn titled(id: &str, title: &str) -> Dataset {
        let mut dataset = Dataset::new(id);
        dataset.title = title.to_string();
        dataset.publisher = "Junta de Castilla y León".to_string();
        dataset
    }

    #[test]
    fn test_title_preview_truncates_on_chars() {
        let long = "á".repeat(60);
        let preview = title_preview(&long);
        assert_eq!(preview.chars().count(), TITLE_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
        assert_eq!(title_preview("Corto"), "Corto");
    }

    #[test]
    fn test_new_in_theme_mentions_remaining() {
        let event = AlertEvent::NewInTheme {
            theme: "Salud".to_string(),
            datasets: (0..5).map(|i| titled(&format!("d{i}"), &format!("Dataset {i}"))).collect(),
            total_new: 8,
        };
        let text = event.render();
        assert!(text.starts_with("🆕 Nuevos datasets en Salud"));
        assert!(text.contains("Dataset 4"));
        assert!(text.contains("... y 3 más."));
    }

    #[test]
    fn test_changed_in_theme_lists_three() {
        let event = AlertEvent::ChangedInTheme {
            theme: "Empleo".to_string(),
            datasets: (0..4).map(|i| titled(&format!("d{i}"), &format!("Dataset {i}"))).collect(),
        };
        let text = event.render();
        assert!(text.contains("Dataset 2"));
        assert!(!text.contains("Dataset 3"));
        assert!(text.contains("... y 1 más."));
    }

    #[test]
    fn test_dataset_changed_lists_notifying_fields() {
        let event = AlertEvent::DatasetChanged {
            dataset: titled("paro", "Paro registrado"),
            changes: vec![
                FieldChange {
                    field: TrackedField::RecordsCount,
                    previous: "100".to_string(),
                    current: "150".to_string(),
                },
                FieldChange {
                    field: TrackedField::MetadataProcessed,
                    previous: "a".to_string(),
                    current: "b".to_string(),
                },
            ],
        };
        let text = event.render();
        assert!(text.contains("records_count: 100 → 150"));
        assert!(!text.contains("metadata_processed"));
    }
}
