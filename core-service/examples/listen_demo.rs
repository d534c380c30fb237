//! # Podcast Core Demo
//!
//! Searches the ListenAPI catalog, caches the first podcast found and plays
//! its latest episode on a silent scripted engine.
//!
//! Run against the ListenAPI mock server (no key needed):
//!
//! ```text
//! cargo run --example listen_demo --package core-service -- "star wars"
//! ```
//!
//! Set `LISTEN_API_KEY` and `LISTEN_API_BASE_URL` to use the production API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use bridge_traits::playback::MediaEngine;
use core_library::models::SortOrder;
use core_playback::testing::ScriptedEngine;
use core_runtime::config::{CoreConfig, LISTEN_API_KEY_ENV};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{CoreService, State};
use futures::StreamExt;
use provider_listennotes::{SearchHit, SearchKind};

const MOCK_SERVER_URL: &str = "https://listen-api-test.listennotes.com/api/v2";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let query = std::env::args().nth(1).unwrap_or_else(|| "star wars".to_string());
    let api_key = std::env::var(LISTEN_API_KEY_ENV).unwrap_or_else(|_| "demo".to_string());
    let base_url =
        std::env::var("LISTEN_API_BASE_URL").unwrap_or_else(|_| MOCK_SERVER_URL.to_string());
    let database = std::env::temp_dir().join("listen-demo").join("podcasts.db");
    std::fs::create_dir_all(database.parent().context("database path has no parent")?)?;

    let config = CoreConfig::builder()
        .database_path(&database)
        .listen_api_key(api_key)
        .listen_api_base_url(base_url)
        .build()?;

    let engine = ScriptedEngine::new();
    let factory_engine = engine.clone();
    let core = CoreService::new(
        config,
        Arc::new(move || Box::new(factory_engine.clone()) as Box<dyn MediaEngine>),
    )
    .await?;

    let results = core.repository().search(&query, SearchKind::Podcast, 0).await?;
    println!("{} podcasts match {:?}", results.total_count, query);
    let Some(podcast) = results.hits.into_iter().find_map(|hit| match hit {
        SearchHit::Podcast(podcast) => Some(podcast),
        SearchHit::Episode(_) => None,
    }) else {
        bail!("no podcast found for {:?}", query);
    };

    let mut states = core
        .repository()
        .get_podcast_with_episodes(&podcast.id, SortOrder::RecentFirst);
    let details = loop {
        match states.next().await {
            Some(State::Loading) => println!("Loading {}...", podcast.title),
            Some(State::Success(details)) => break details,
            Some(State::Error(e)) => bail!("could not load {}: {}", podcast.title, e),
            None => bail!("podcast stream ended"),
        }
    };
    println!(
        "{} by {} ({} episodes cached)",
        details.podcast.title,
        details.podcast.publisher,
        details.episodes.len()
    );

    let episode = details.episodes.first().context("podcast has no episodes")?;
    let player = core.player_controller("demo")?;
    player.play_episode_by_id(&episode.id).await?;

    let client = player.client();
    println!(
        "Playing {:?} ({:?})",
        client.current_episode().borrow().title,
        *client.playback_state().borrow()
    );

    engine.set_position(45_000);
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    println!("Position: {} ms", *client.current_position().borrow());

    let position = client.skip_forward().await?;
    println!("Skipped forward to {} ms", position);
    client.pause().await?;

    player.disconnect().await?;
    core.shutdown().await?;
    println!("Progress saved to {}", database.display());
    Ok(())
}
