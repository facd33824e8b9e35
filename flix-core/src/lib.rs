pub mod accumulator;
pub mod config;
pub mod error;
pub mod favorites;
pub mod fetcher;
pub mod gate;
pub mod latest;
pub mod models;
pub mod persistence;
pub mod tmdb;
pub mod visibility;

pub use accumulator::accumulate;
pub use config::FlixConfig;
pub use error::{FavoritesError, FetchError, GateError, StorageError, ValidationError};
pub use favorites::{validate_comment, FavoritesStore, ToggleOutcome};
pub use fetcher::DataFetcher;
pub use gate::{spawn_request_gate, GateEvent, Paginator, RequestGateHandle, TriggerOutcome};
pub use latest::{spawn_latest_wins, spawn_latest_wins_with, KeyTracker, LatestWinsHandle, Resolution};
pub use models::{
    AggregateList, CastMember, Credits, CrewMember, FavoriteRecord, Genre, Item, ItemId, ListKey,
    ListStatus, MovieDetail, Page,
};
pub use persistence::{FileStorage, MemoryStorage, PersistenceAdapter};
pub use tmdb::TmdbClient;
pub use visibility::{ElementHandle, ScrollObserver, ViewportSample, VisibilityTrigger};
