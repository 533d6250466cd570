//! Saved-result history and its delete action.

use log::{error, info};
use shared::ResultId;

use crate::api::EmotionApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCard {
    pub id: ResultId,
}

impl HistoryCard {
    pub fn new(id: ResultId) -> Self {
        Self { id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    /// The server answered `success: false`.
    Rejected(String),
    /// The request never produced a usable answer.
    Failed(String),
    Cancelled,
    NotFound,
}

#[derive(Debug, Default)]
pub struct HistoryPage {
    cards: Vec<HistoryCard>,
    pub notice: Option<String>,
}

impl HistoryPage {
    pub fn new(cards: Vec<HistoryCard>) -> Self {
        Self { cards, notice: None }
    }

    pub fn cards(&self) -> &[HistoryCard] {
        &self.cards
    }

    pub fn card(&self, id: ResultId) -> Option<&HistoryCard> {
        self.cards.iter().find(|card| card.id == id)
    }

    /// Deletes one saved result after `confirm` approves it. The card leaves
    /// the list only when the server reports success.
    pub async fn delete(
        &mut self,
        api: &dyn EmotionApi,
        id: ResultId,
        confirm: impl FnOnce(&HistoryCard) -> bool,
    ) -> DeleteOutcome {
        let Some(card) = self.card(id) else {
            return DeleteOutcome::NotFound;
        };
        if !confirm(card) {
            return DeleteOutcome::Cancelled;
        }

        match api.delete_result(id).await {
            Ok(response) if response.success => {
                self.cards.retain(|card| card.id != id);
                self.notice = None;
                info!("Deleted result {}", id);
                DeleteOutcome::Removed
            }
            Ok(response) => {
                let reason = response.error.unwrap_or_default();
                self.notice = Some(format!("Delete failed: {}", reason));
                DeleteOutcome::Rejected(reason)
            }
            Err(e) => {
                error!("Delete of result {} failed: {:#}", id, e);
                let reason = format!("{:#}", e);
                self.notice = Some(format!("Error: {}", reason));
                DeleteOutcome::Failed(reason)
            }
        }
    }
}
