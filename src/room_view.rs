//! Everything one mounted room owns. Built when the room is entered and
//! released as a whole when it is left.

use crate::api::ApiClient;
use crate::model::ApiRoom;
use crate::moderation::ModerationClient;
use crate::notification::Notifier;
use crate::panel::{MainPanels, PipPanels};
use crate::pip::{PipHost, PipSize, PipWindow};
use crate::role_change::RoleChangeListener;
use crate::room_cache::{RoomDataCache, RoomInvalidator};
use crate::storage::LocalStorage;
use crate::store::Store;
use crate::stores::RoomStores;
use bytes::Bytes;
use futures::Stream;
use log::info;
use std::sync::Arc;

pub struct RoomViewOptions {
    pub storage: Arc<LocalStorage>,
    pub pip_host: Arc<dyn PipHost>,
    pub pip_size: PipSize,
    pub notifier: Option<Arc<dyn Notifier>>,
}

pub struct RoomView {
    room_id: String,
    cache: Arc<RoomDataCache>,
    room: Store<Option<ApiRoom>>,
    stores: RoomStores,
    panels: MainPanels,
    pip_panels: PipPanels,
    pip: PipWindow,
    moderation: ModerationClient,
    role_listener: Option<RoleChangeListener>,
}

impl RoomView {
    pub fn new(
        room_id: &str,
        api: ApiClient,
        cache: Arc<RoomDataCache>,
        options: RoomViewOptions,
    ) -> Self {
        let room = cache.entry(room_id);
        let stores = RoomStores::new(options.storage);
        let pip = PipWindow::new(options.pip_host, options.pip_size, stores.room_pip.clone());

        let mut moderation = ModerationClient::new(api, room.clone());
        if let Some(notifier) = options.notifier {
            moderation = moderation.with_notifier(notifier);
        }

        info!("Room view created for room {}", room_id);
        RoomView {
            room_id: room_id.to_string(),
            cache,
            room,
            stores,
            panels: MainPanels::main(),
            pip_panels: PipPanels::pip(),
            pip,
            moderation,
            role_listener: None,
        }
    }

    /// Starts refetching room data on role changes announced in
    /// `payloads`. Replaces any previous listener.
    pub fn listen_for_role_changes<S>(&mut self, payloads: S)
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        let invalidator: Arc<dyn RoomInvalidator> = Arc::new(Arc::clone(&self.cache));
        self.role_listener = Some(RoleChangeListener::spawn(&self.room_id, payloads, invalidator));
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn room(&self) -> &Store<Option<ApiRoom>> {
        &self.room
    }

    pub fn cache(&self) -> &Arc<RoomDataCache> {
        &self.cache
    }

    pub fn stores(&self) -> &RoomStores {
        &self.stores
    }

    pub fn panels(&self) -> &MainPanels {
        &self.panels
    }

    pub fn pip_panels(&self) -> &PipPanels {
        &self.pip_panels
    }

    pub fn pip(&self) -> &PipWindow {
        &self.pip
    }

    pub fn moderation(&self) -> &ModerationClient {
        &self.moderation
    }

    pub fn is_listening_for_role_changes(&self) -> bool {
        self.role_listener
            .as_ref()
            .is_some_and(RoleChangeListener::is_listening)
    }

    /// Whether the local user may run privileged actions in this room.
    pub fn is_admin_or_owner(&self) -> bool {
        self.room.read(|room| {
            room.as_ref()
                .is_some_and(|room| room.is_administrable || room.is_owner)
        })
    }
}

impl Drop for RoomView {
    fn drop(&mut self) {
        info!("Room view for room {} released", self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::panel::PanelId;
    use crate::pip::HeadlessPipHost;
    use crate::room_cache::tests::room;
    use crate::room_cache::RoomFetcher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[derive(Default)]
    struct PromotingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoomFetcher for PromotingFetcher {
        async fn fetch_room(&self, room_id: &str) -> Result<ApiRoom, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut fetched = room(room_id);
            fetched.is_administrable = true;
            Ok(fetched)
        }
    }

    fn view(dir: &tempfile::TempDir, cache: Arc<RoomDataCache>) -> RoomView {
        RoomView::new(
            "r1",
            ApiClient::new("http://127.0.0.1:9/api/v1.0/").unwrap(),
            cache,
            RoomViewOptions {
                storage: Arc::new(LocalStorage::open(dir.path()).unwrap()),
                pip_host: Arc::new(HeadlessPipHost::new()),
                pip_size: PipSize::default(),
                notifier: None,
            },
        )
    }

    #[tokio::test]
    async fn main_and_pip_panels_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoomDataCache::new(Arc::new(PromotingFetcher::default()));
        let view = view(&dir, cache);

        view.panels().open(PanelId::Chat, None);
        view.pip_panels().open(PanelId::Participants, None);

        assert_eq!(view.panels().active_panel(), Some(PanelId::Chat));
        assert_eq!(view.pip_panels().active_panel(), Some(PanelId::Participants));
    }

    #[tokio::test]
    async fn views_do_not_share_ui_state() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoomDataCache::new(Arc::new(PromotingFetcher::default()));
        let first = view(&dir, Arc::clone(&cache));
        let second = view(&dir, cache);

        first.panels().open(PanelId::Tools, None);
        first.stores().screen_share.update(|s| s.enabled = false);

        assert!(second.panels().active_panel().is_none());
        assert!(second.stores().screen_share.get().enabled);
        // Room data is a shared cache entry.
        assert!(first.room().same_store(second.room()));
    }

    #[tokio::test]
    async fn role_change_refetches_room_for_the_view() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(PromotingFetcher::default());
        let cache = RoomDataCache::new(fetcher.clone());
        cache.insert("r1", room("r1"));
        let mut view = view(&dir, cache);
        assert!(!view.is_admin_or_owner());

        let (tx, rx) = mpsc::unbounded_channel();
        view.listen_for_role_changes(UnboundedReceiverStream::new(rx));
        let mut updates = view.room().subscribe();

        tx.send(Bytes::from_static(br#"{"type":"RoleChanged"}"#)).unwrap();
        updates.changed().await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(view.is_admin_or_owner());
    }

    #[tokio::test]
    async fn dropping_view_stops_role_listener() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(PromotingFetcher::default());
        let cache = RoomDataCache::new(fetcher.clone());
        let mut view = view(&dir, Arc::clone(&cache));

        let (tx, rx) = mpsc::unbounded_channel();
        view.listen_for_role_changes(UnboundedReceiverStream::new(rx));
        assert!(view.is_listening_for_role_changes());

        drop(view);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(Bytes::from_static(br#"{"type":"RoleChanged"}"#));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pip_window_drives_room_pip_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoomDataCache::new(Arc::new(PromotingFetcher::default()));
        let view = view(&dir, cache);

        view.pip().open().await.unwrap();

        assert!(view.stores().room_pip.get().is_open);
    }
}
