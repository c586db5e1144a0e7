use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::application::notify::{NotificationKind, Notifier};
use crate::application::repos::{PreferenceStore, RepoError};
use crate::domain::error::DomainError;
use crate::domain::settings::{AppSettings, SettingsPatch};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "application::settings";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Operator preferences: loaded once, edited in memory, persisted on save.
pub struct SettingsService {
    store: Arc<dyn PreferenceStore>,
    notifier: Arc<dyn Notifier>,
    current: RwLock<AppSettings>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn PreferenceStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            current: RwLock::new(AppSettings::default()),
        }
    }

    /// Read the stored blob and merge it over the defaults.
    ///
    /// A missing blob yields defaults. So does an unreadable one, after a warning.
    pub fn load(&self) -> Result<AppSettings, SettingsError> {
        let loaded = match self.store.load()? {
            None => AppSettings::default(),
            Some(blob) => match serde_json::from_str::<AppSettings>(&blob) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(
                        target_module = SOURCE,
                        error = %err,
                        "Stored settings are unreadable; using defaults"
                    );
                    AppSettings::default()
                }
            },
        };
        *rw_write(&self.current, SOURCE, "load") = loaded.clone();
        Ok(loaded)
    }

    pub fn current(&self) -> AppSettings {
        rw_read(&self.current, SOURCE, "current").clone()
    }

    /// Merge `patch` into the in-memory settings without persisting.
    pub fn update(&self, patch: &SettingsPatch) -> Result<AppSettings, SettingsError> {
        let mut current = rw_write(&self.current, SOURCE, "update");
        let merged = current.merged(patch);
        merged.validate()?;
        *current = merged.clone();
        Ok(merged)
    }

    /// Persist the in-memory settings and report the outcome as a toast.
    pub fn save(&self) -> Result<AppSettings, SettingsError> {
        let settings = self.current();
        let result = serde_json::to_string(&settings)
            .map_err(SettingsError::from)
            .and_then(|blob| self.store.store(&blob).map_err(SettingsError::from));

        match result {
            Ok(()) => {
                info!(target_module = SOURCE, "Settings saved");
                self.notifier
                    .notify("Settings saved", NotificationKind::Success);
                Ok(settings)
            }
            Err(err) => {
                warn!(target_module = SOURCE, error = %err, "Failed to save settings");
                self.notifier
                    .notify("Failed to save settings", NotificationKind::Error);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::types::ThemeMode;

    #[derive(Default)]
    struct MemoryStore {
        blob: Mutex<Option<String>>,
        fail_writes: bool,
    }

    impl PreferenceStore for MemoryStore {
        fn load(&self) -> Result<Option<String>, RepoError> {
            Ok(self.blob.lock().expect("store lock").clone())
        }

        fn store(&self, blob: &str) -> Result<(), RepoError> {
            if self.fail_writes {
                return Err(RepoError::from_persistence("disk full"));
            }
            *self.blob.lock().expect("store lock") = Some(blob.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(String, NotificationKind)>>);

    impl Notifier for Recorded {
        fn notify(&self, message: &str, kind: NotificationKind) {
            self.0
                .lock()
                .expect("notifier lock")
                .push((message.to_string(), kind));
        }
    }

    #[test]
    fn corrupt_blob_falls_back_to_defaults() {
        let store = Arc::new(MemoryStore {
            blob: Mutex::new(Some("{not json".to_string())),
            ..Default::default()
        });
        let service = SettingsService::new(store, Arc::new(Recorded::default()));

        assert_eq!(service.load().expect("load succeeds"), AppSettings::default());
    }

    #[test]
    fn update_then_save_persists_and_notifies() {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(Recorded::default());
        let service = SettingsService::new(store.clone(), notifier.clone());

        service
            .update(&SettingsPatch {
                theme: Some(ThemeMode::Dark),
                items_per_page: Some(5),
                ..Default::default()
            })
            .expect("valid patch");
        service.save().expect("save succeeds");

        let reloaded = SettingsService::new(store, Arc::new(Recorded::default()));
        let settings = reloaded.load().expect("load succeeds");
        assert_eq!(settings.theme, ThemeMode::Dark);
        assert_eq!(settings.items_per_page, 5);
        assert_eq!(
            *notifier.0.lock().expect("notifier lock"),
            vec![("Settings saved".to_string(), NotificationKind::Success)]
        );
    }

    #[test]
    fn invalid_update_keeps_previous_settings() {
        let service = SettingsService::new(
            Arc::new(MemoryStore::default()),
            Arc::new(Recorded::default()),
        );

        let result = service.update(&SettingsPatch {
            items_per_page: Some(0),
            ..Default::default()
        });

        assert!(matches!(result, Err(SettingsError::Validation(_))));
        assert_eq!(service.current().items_per_page, 10);
    }

    #[test]
    fn failed_save_emits_error_toast() {
        let notifier = Arc::new(Recorded::default());
        let service = SettingsService::new(
            Arc::new(MemoryStore {
                fail_writes: true,
                ..Default::default()
            }),
            notifier.clone(),
        );

        assert!(matches!(service.save(), Err(SettingsError::Repo(_))));
        assert_eq!(
            notifier.0.lock().expect("notifier lock")[0].1,
            NotificationKind::Error
        );
    }
}
