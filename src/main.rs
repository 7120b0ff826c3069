use livekit::{Room, RoomOptions};
use log::{error, info};
use meet_room_core::api::ApiClient;
use meet_room_core::config::Config;
use meet_room_core::logging::setup_logging;
use meet_room_core::notification::Notifier;
use meet_room_core::pip::HeadlessPipHost;
use meet_room_core::repl::{start_repl, ReplContext};
use meet_room_core::role_change::data_payloads;
use meet_room_core::room_cache::RoomDataCache;
use meet_room_core::room_view::{RoomView, RoomViewOptions};
use meet_room_core::storage::LocalStorage;
use meet_room_core::tracks::{LivekitTrackFactory, PreviewTracks};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env_variables();
    setup_logging(config.log_file.as_deref())?;

    let Some(slug) = config.room_slug.clone().or_else(|| std::env::args().nth(1)) else {
        eprintln!("Usage: meet_room <room-slug> (or set ROOM_SLUG)");
        return Ok(());
    };

    let api = ApiClient::new(&config.api_base_url)?;
    let cache = RoomDataCache::new(Arc::new(api.clone()));

    let room_data = api.fetch_room(&slug).await?;
    cache.insert(&room_data.id, room_data.clone());
    info!("Fetched room {} ({})", room_data.name, room_data.id);

    let Some(livekit) = room_data.livekit.clone() else {
        return Err(format!("room {} has no media connection", room_data.slug).into());
    };

    let (room, room_events) =
        Room::connect(&livekit.url, &livekit.token, RoomOptions::default()).await?;
    let room = Arc::new(room);
    info!("Connected to LiveKit room {}", livekit.room);

    let storage = Arc::new(LocalStorage::open(config.storage_dir.clone())?);
    let pip_host = Arc::new(HeadlessPipHost::new());
    let notifier: Arc<dyn Notifier> = Arc::new(room.local_participant());

    let mut view = RoomView::new(
        &room_data.id,
        api,
        cache,
        RoomViewOptions {
            storage,
            pip_host: pip_host.clone(),
            pip_size: config.pip_size,
            notifier: Some(notifier),
        },
    );
    view.listen_for_role_changes(data_payloads(room_events));

    let previews = PreviewTracks::new(LivekitTrackFactory::default())
        .with_error_handler(|e| error!("Preview tracks unavailable: {}", e));

    start_repl(ReplContext {
        room: Arc::clone(&room),
        view,
        previews,
        pip_host,
    })
    .await;

    room.close().await?;
    info!("Disconnected");
    Ok(())
}
