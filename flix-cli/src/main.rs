use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use flix_core::{
    spawn_latest_wins_with, spawn_request_gate, AggregateList, DataFetcher, FavoritesStore,
    FetchError, FileStorage, FlixConfig, GateEvent, Item, ItemId, ListKey, MovieDetail,
    Resolution, TmdbClient, ToggleOutcome, TriggerOutcome,
};
use reqwest::{redirect, ClientBuilder};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flix")]
#[command(about = "Browse movie lists, search and manage favorites")]
struct Cli {
    /// Config file to use instead of the one in the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Page through a category such as popular, top_rated or upcoming.
    List {
        category: String,
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Page through movies of a genre id.
    Genre {
        id: String,
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Submit each term in turn, as if typed; prints the result for the last.
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Show one movie with its cast and recommendations. Several ids are
    /// resolved like route changes; only the last is shown.
    Movie {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List the genre ids usable with `genre`.
    Genres,
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
}

#[derive(Subcommand)]
enum FavoritesAction {
    List,
    Toggle {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        comment: String,
    },
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FlixConfig::from_file(path),
        None => FlixConfig::load(),
    };
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent("flix/0.1")
        .build()
        .context("failed to build HTTP client")?;
    let tmdb = TmdbClient::new(client, &config)?;
    let fetcher: Arc<dyn DataFetcher> = Arc::new(tmdb.clone());

    match cli.command {
        Command::List { category, pages } => {
            let list = paginate(fetcher, ListKey::Category(category), pages).await?;
            print_list(&list);
        }
        Command::Genre { id, pages } => {
            let list = paginate(fetcher, ListKey::Genre(id), pages).await?;
            print_list(&list);
        }
        Command::Search { terms } => {
            let (last, items) = resolve_latest(terms, move |term: String| {
                let fetcher = Arc::clone(&fetcher);
                async move { fetcher.fetch_by_key(&term).await }
            })
            .await?;
            println!("{} result(s) for '{last}'", items.len());
            print_items(&items);
        }
        Command::Movie { ids } => {
            let (_, detail) = resolve_latest(ids, move |id: String| {
                let tmdb = tmdb.clone();
                async move { tmdb.movie_detail(&id).await.map(Some) }
            })
            .await?;
            if let Some(detail) = detail {
                print_detail(&detail);
            }
        }
        Command::Genres => {
            for genre in tmdb.genres().await? {
                println!("{:>8}  {}", genre.id, genre.name);
            }
        }
        Command::Favorites { action } => favorites(fetcher, &config, action).await?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn data_dir() -> Result<PathBuf> {
    FlixConfig::config_dir().ok_or_else(|| anyhow!("no config directory available"))
}

async fn paginate(fetcher: Arc<dyn DataFetcher>, key: ListKey, pages: u32) -> Result<AggregateList> {
    let (tx, mut events) = mpsc::channel(8);
    let gate = spawn_request_gate(fetcher, key, None, tx);

    let mut loaded = 0;
    while loaded < pages {
        match events.recv().await {
            Some(GateEvent::PageLoaded { page, added, .. }) => {
                tracing::info!(page, added, "page loaded");
                loaded += 1;
                if added == 0 {
                    break;
                }
            }
            Some(GateEvent::PageFailed { page, error, .. }) => {
                return Err(anyhow!("page {page} failed: {error}"));
            }
            None => break,
        }
        if loaded < pages && gate.trigger().await? == TriggerOutcome::Dropped {
            tracing::debug!("trigger dropped");
        }
    }

    let list = gate.snapshot();
    gate.stop().await?;
    Ok(list)
}

/// Submits `keys` back to back and waits for the last one. A failure of the
/// last key's fetch is reported as soon as it happens.
async fn resolve_latest<T, F, Fut>(keys: Vec<String>, resolve: F) -> Result<(String, T)>
where
    T: Clone + Default + Send + Sync + 'static,
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let last = keys.last().cloned().unwrap_or_default();
    let (failed_tx, mut failed) = mpsc::unbounded_channel();
    let reporting = move |key: String| {
        let failed_tx = failed_tx.clone();
        let pending = resolve(key.clone());
        async move {
            let result = pending.await;
            if let Err(error) = &result {
                let _ = failed_tx.send((key, error.to_string()));
            }
            result
        }
    };

    let (tx, _deliveries) = mpsc::channel(keys.len() * 2 + 1);
    let resolver = spawn_latest_wins_with(reporting, tx);
    let mut latest = resolver.subscribe();
    for key in keys {
        resolver.submit(key).await?;
    }

    let ready = async {
        loop {
            tokio::select! {
                changed = latest.changed() => {
                    if changed.is_err() {
                        return Err(anyhow!("resolver stopped"));
                    }
                    let current = latest.borrow_and_update().clone();
                    if let Some(Resolution::Ready { key, value }) = current {
                        if key == last {
                            return Ok(value);
                        }
                    }
                }
                Some((key, error)) = failed.recv() => {
                    if key == last {
                        return Err(anyhow!("'{key}' failed: {error}"));
                    }
                }
            }
        }
    };
    let value = tokio::time::timeout(Duration::from_secs(30), ready)
        .await
        .context("timed out")??;
    resolver.stop().await?;
    Ok((last, value))
}

async fn favorites(fetcher: Arc<dyn DataFetcher>, config: &FlixConfig, action: FavoritesAction) -> Result<()> {
    let storage = Arc::new(FileStorage::new(data_dir()?));
    let store = FavoritesStore::load(storage, fetcher, config.favorites.clone()).await;

    match action {
        FavoritesAction::List => {
            for favorite in store.get_all().await {
                println!("{:>8}  {}  ({})", favorite.item.id, favorite.item.title, favorite.comment);
            }
        }
        FavoritesAction::Toggle { id, title, comment } => {
            let item = Item::new(ItemId::from(id.as_str()), title);
            match store.toggle(item, comment).await? {
                ToggleOutcome::NowFavorite => println!("now a favorite"),
                ToggleOutcome::NoLongerFavorite => println!("no longer a favorite"),
            }
        }
        FavoritesAction::Remove { id } => {
            let removed = store.remove(&ItemId::from(id.as_str())).await?;
            println!("removed {}", removed.item.title);
        }
    }
    Ok(())
}

fn print_list(list: &AggregateList) {
    println!("{}: {} item(s) over {} page(s)", list.key, list.items.len(), list.page_number);
    print_items(&list.items);
}

fn print_detail(detail: &MovieDetail) {
    let movie = &detail.movie;
    println!("{} ({})", movie.title, movie.id);
    if let Some(tagline) = movie.extra.get("tagline").and_then(|t| t.as_str()) {
        println!("  {tagline}");
    }
    if let Some(overview) = movie.extra.get("overview").and_then(|o| o.as_str()) {
        println!("\n{overview}");
    }
    println!("\nCast:");
    for actor in &detail.credits.cast {
        match &actor.character {
            Some(character) => println!("  {} as {character}", actor.name),
            None => println!("  {}", actor.name),
        }
    }
    println!("\nRecommended:");
    print_items(&detail.recommendations);
}

fn print_items(items: &[Item]) {
    for item in items {
        println!("{:>8}  {}", item.id, item.title);
    }
}
