use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use hirehub_core::change::ChangeEvent;
use hirehub_core::types::{Settings, SETTINGS_ID};

use crate::documents::{DocumentRepository, DocumentStoreError};

/// Singleton settings document; reads fall back to defaults until it is first saved.
#[derive(Clone)]
pub struct SettingsRepository {
    documents: DocumentRepository<Settings>,
}

impl SettingsRepository {
    pub(crate) fn new(documents: DocumentRepository<Settings>) -> Self {
        Self { documents }
    }

    pub async fn load(&self) -> Result<Settings, DocumentStoreError> {
        Ok(self.documents.find(SETTINGS_ID).await?.unwrap_or_default())
    }

    pub async fn load_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<Settings, DocumentStoreError> {
        Ok(self
            .documents
            .find_in(tx, SETTINGS_ID)
            .await?
            .unwrap_or_default())
    }

    /// Inserts the document on first save and replaces it afterwards.
    pub async fn save(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        settings: &Settings,
        at: DateTime<Utc>,
    ) -> Result<ChangeEvent, DocumentStoreError> {
        if self.documents.find_in(tx, SETTINGS_ID).await?.is_some() {
            self.documents.replace(tx, settings, at).await
        } else {
            self.documents.insert(tx, settings, at).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;
    use hirehub_core::change::ChangeOp;

    #[tokio::test]
    async fn load_returns_defaults_until_saved() {
        let (db, _dir) = setup_db().await;
        let repo = db.settings();
        assert_eq!(repo.load().await.expect("load"), Settings::default());

        let updated = Settings {
            timezone: "Asia/Kolkata".to_string(),
            updated_at: Some(Utc::now()),
            ..Settings::default()
        };
        let mut tx = db.begin().await.expect("begin");
        let first = repo.save(&mut tx, &updated, Utc::now()).await.expect("save");
        let second = repo.save(&mut tx, &updated, Utc::now()).await.expect("save again");
        tx.commit().await.expect("commit");

        assert_eq!(first.op, ChangeOp::Created);
        assert_eq!(second.op, ChangeOp::Updated);
        assert_eq!(repo.load().await.expect("load").timezone, "Asia/Kolkata");
    }
}
