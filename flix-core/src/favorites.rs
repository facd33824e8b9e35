use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::FavoritesConfig;
use crate::error::{FavoritesError, ValidationError};
use crate::fetcher::DataFetcher;
use crate::models::{FavoriteRecord, Item, ItemId};
use crate::persistence::PersistenceAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    NowFavorite,
    NoLongerFavorite,
}

impl ToggleOutcome {
    pub fn is_favorite(self) -> bool {
        self == ToggleOutcome::NowFavorite
    }
}

pub fn validate_comment(comment: &str, min_len: usize) -> Result<(), ValidationError> {
    let actual = comment.trim().chars().count();
    if actual < min_len {
        return Err(ValidationError::CommentTooShort { min: min_len, actual });
    }
    Ok(())
}

type PendingSet = Arc<Mutex<HashSet<ItemId>>>;

fn lock_pending(pending: &PendingSet) -> MutexGuard<'_, HashSet<ItemId>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds an id in the pending set; the id leaves the set when this drops,
/// whichever path the operation exits through.
struct PendingGuard {
    pending: PendingSet,
    id: ItemId,
}

impl PendingGuard {
    fn claim(pending: &PendingSet, id: &ItemId) -> Result<Self, ValidationError> {
        if !lock_pending(pending).insert(id.clone()) {
            return Err(ValidationError::AlreadyPending(id.clone()));
        }
        Ok(Self {
            pending: Arc::clone(pending),
            id: id.clone(),
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
    }
}

/// Persisted favorites with optimistic per-id toggling.
///
/// The whole collection is written back after every mutation. Storage
/// failures are logged and the store keeps working from memory.
#[derive(Clone)]
pub struct FavoritesStore {
    storage: Arc<dyn PersistenceAdapter>,
    fetcher: Arc<dyn DataFetcher>,
    config: FavoritesConfig,
    favorites: Arc<RwLock<Vec<FavoriteRecord>>>,
    pending: PendingSet,
}

impl FavoritesStore {
    pub async fn load(
        storage: Arc<dyn PersistenceAdapter>,
        fetcher: Arc<dyn DataFetcher>,
        config: FavoritesConfig,
    ) -> Self {
        let favorites = match storage.get(&config.storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<FavoriteRecord>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, key = %config.storage_key, "stored favorites are unreadable, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "favorites storage unavailable, keeping favorites in memory only");
                Vec::new()
            }
        };
        info!(count = favorites.len(), "favorites loaded");

        Self {
            storage,
            fetcher,
            config,
            favorites: Arc::new(RwLock::new(favorites)),
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Flips `item` in or out of the favorites after the remote round trip.
    ///
    /// A second toggle for an id that is still in flight is rejected with
    /// [`ValidationError::AlreadyPending`]. On a failed round trip the
    /// favorites are left untouched.
    pub async fn toggle(
        &self,
        item: Item,
        comment: impl Into<String>,
    ) -> Result<ToggleOutcome, FavoritesError> {
        item.validate()?;
        let _guard = PendingGuard::claim(&self.pending, &item.id)?;
        debug!(id = %item.id, "toggle round trip started");

        if let Err(e) = self.fetcher.perform_toggle_round_trip().await {
            warn!(id = %item.id, error = %e, "toggle round trip failed");
            return Err(e.into());
        }

        let mut favorites = self.favorites.write().await;
        let outcome = match favorites.iter().position(|f| f.id() == &item.id) {
            Some(index) => {
                favorites.remove(index);
                ToggleOutcome::NoLongerFavorite
            }
            None => {
                favorites.push(FavoriteRecord::new(item, comment));
                ToggleOutcome::NowFavorite
            }
        };
        self.persist(&favorites).await;
        Ok(outcome)
    }

    /// Adds a favorite directly, as the "my movies" form does.
    pub async fn add(&self, item: Item, comment: impl Into<String>) -> Result<(), FavoritesError> {
        let comment = comment.into();
        item.validate()?;
        validate_comment(&comment, self.config.min_comment_len)?;
        let _guard = PendingGuard::claim(&self.pending, &item.id)?;

        let mut favorites = self.favorites.write().await;
        if favorites.iter().any(|f| f.id() == &item.id) {
            return Err(ValidationError::AlreadyFavorite(item.id).into());
        }
        favorites.push(FavoriteRecord::new(item, comment));
        self.persist(&favorites).await;
        Ok(())
    }

    pub async fn remove(&self, id: &ItemId) -> Result<FavoriteRecord, FavoritesError> {
        let _guard = PendingGuard::claim(&self.pending, id)?;
        let mut favorites = self.favorites.write().await;
        let index = favorites
            .iter()
            .position(|f| f.id() == id)
            .ok_or_else(|| ValidationError::NotFavorite(id.clone()))?;
        let removed = favorites.remove(index);
        self.persist(&favorites).await;
        Ok(removed)
    }

    pub async fn update_comment(
        &self,
        id: &ItemId,
        comment: impl Into<String>,
    ) -> Result<(), FavoritesError> {
        let comment = comment.into();
        validate_comment(&comment, self.config.min_comment_len)?;
        let _guard = PendingGuard::claim(&self.pending, id)?;
        let mut favorites = self.favorites.write().await;
        let record = favorites
            .iter_mut()
            .find(|f| f.id() == id)
            .ok_or_else(|| ValidationError::NotFavorite(id.clone()))?;
        record.comment = comment;
        self.persist(&favorites).await;
        Ok(())
    }

    pub async fn get_all(&self) -> Vec<FavoriteRecord> {
        self.favorites.read().await.clone()
    }

    pub async fn is_favorite(&self, id: &ItemId) -> bool {
        self.favorites.read().await.iter().any(|f| f.id() == id)
    }

    pub async fn favorite_ids(&self) -> HashSet<ItemId> {
        self.favorites
            .read()
            .await
            .iter()
            .map(|f| f.id().clone())
            .collect()
    }

    pub fn is_pending(&self, id: &ItemId) -> bool {
        lock_pending(&self.pending).contains(id)
    }

    pub fn pending_ids(&self) -> HashSet<ItemId> {
        lock_pending(&self.pending).clone()
    }

    async fn persist(&self, favorites: &[FavoriteRecord]) {
        let json = match serde_json::to_string(favorites) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize favorites");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.config.storage_key, &json).await {
            warn!(error = %e, key = %self.config.storage_key, "failed to persist favorites");
        }
    }
}
