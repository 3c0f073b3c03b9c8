// Composition tests — full flows across the detector, the registry, and
// the persistence codec.
//
// These exercise the chain:
//   image bytes -> fingerprint -> ledger -> snapshot -> disk -> fresh process
// without any network access; the loader serves in-memory PNGs.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GrayImage};

use dejaview::detect::{ImageEvent, Reply, RepostDetector, DEFAULT_THRESHOLD};
use dejaview::store::codec::{load_state, save_state};
use dejaview::store::{ChatId, ConversationRegistry, MediaId, MessageId, UserId};

const CHAT: ChatId = ChatId(-1001000000777);
const SENDER: UserId = UserId(4242);

fn png_with_columns(values: [u8; 9]) -> Vec<u8> {
    let img = GrayImage::from_fn(18, 16, |x, _| image::Luma([values[(x / 2) as usize]]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

async fn post(
    registry: &Arc<ConversationRegistry>,
    media: &str,
    message: i64,
    sender: UserId,
    bytes: &[u8],
    loads: &Arc<AtomicUsize>,
) -> Option<Reply> {
    let detector = RepostDetector::new(Arc::clone(registry), DEFAULT_THRESHOLD);
    let event = ImageEvent {
        chat: CHAT,
        sender,
        media: MediaId::new(media),
        message: MessageId(message),
    };
    let loads = Arc::clone(loads);
    let bytes = bytes.to_vec();
    detector
        .process(
            &event,
            |prior| format!("https://t.me/c/1000000777/{prior}"),
            move || {
                loads.fetch_add(1, Ordering::SeqCst);
                async move { Ok(bytes) }
            },
        )
        .await
        .unwrap()
}

// ============================================================
// Chain: detect -> snapshot -> disk -> restart -> detect
// ============================================================

#[tokio::test]
async fn detection_continues_seamlessly_across_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let image = png_with_columns([0, 40, 10, 90, 200, 3, 150, 60, 255]);
    let loads = Arc::new(AtomicUsize::new(0));

    // First process lifetime: baseline plus one repost.
    {
        let registry = Arc::new(ConversationRegistry::new());
        registry.enable(CHAT).await;

        assert!(post(&registry, "up1", 1, SENDER, &image, &loads).await.is_none());
        let reply = post(&registry, "up2", 2, SENDER, &image, &loads)
            .await
            .unwrap();
        assert!(reply.text.contains("/1"));

        save_state(&path, &registry.snapshot().await).unwrap();
    }

    // Second process lifetime: the count picks up where it left off.
    let registry = Arc::new(ConversationRegistry::from_ledgers(load_state(&path).unwrap()));
    assert!(registry.is_monitored(CHAT).await);

    let reply = post(&registry, "up3", 3, SENDER, &image, &loads)
        .await
        .unwrap();
    assert!(reply.text.contains("reposted 2 times"));
    assert!(reply.text.contains("/2"), "pointer must survive the restart");

    // A known media id is still memoized after the restart.
    let before = loads.load(Ordering::SeqCst);
    let reply = post(&registry, "up1", 4, SENDER, &image, &loads)
        .await
        .unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), before, "memo table must survive the restart");
    assert!(reply.text.contains("reposted 3 times"));
}

#[tokio::test]
async fn disabling_forgets_everything_even_after_a_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let image = png_with_columns([9, 8, 7, 6, 5, 4, 3, 2, 1]);
    let loads = Arc::new(AtomicUsize::new(0));

    let registry = Arc::new(ConversationRegistry::new());
    registry.enable(CHAT).await;
    post(&registry, "up1", 1, SENDER, &image, &loads).await;
    post(&registry, "up2", 2, SENDER, &image, &loads).await;

    registry.disable(CHAT).await;
    save_state(&path, &registry.snapshot().await).unwrap();

    let restored = Arc::new(ConversationRegistry::from_ledgers(load_state(&path).unwrap()));
    assert!(!restored.is_monitored(CHAT).await);

    // Events in the forgotten chat are ignored entirely.
    let before = loads.load(Ordering::SeqCst);
    assert!(post(&restored, "up2", 3, SENDER, &image, &loads).await.is_none());
    assert_eq!(loads.load(Ordering::SeqCst), before);

    // Re-enabling starts the history from scratch.
    restored.enable(CHAT).await;
    assert!(post(&restored, "up2", 4, SENDER, &image, &loads).await.is_none());
}

#[tokio::test]
async fn exemptions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let image = png_with_columns([100, 0, 100, 0, 100, 0, 100, 0, 100]);
    let loads = Arc::new(AtomicUsize::new(0));

    let registry = Arc::new(ConversationRegistry::new());
    registry.enable(CHAT).await;
    registry.add_exempt(CHAT, SENDER).await.unwrap();
    save_state(&path, &registry.snapshot().await).unwrap();

    let restored = Arc::new(ConversationRegistry::from_ledgers(load_state(&path).unwrap()));

    // The exempt sender posts freely; another sender is checked.
    for message in 1..=3 {
        assert!(post(&restored, "e1", message, SENDER, &image, &loads).await.is_none());
    }
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    assert!(post(&restored, "o1", 10, UserId(7), &image, &loads).await.is_none());
    let reply = post(&restored, "o2", 11, UserId(7), &image, &loads).await;
    assert!(reply.unwrap().text.contains("reposted once"));
}

// ============================================================
// Multiple chats stay independent end to end
// ============================================================

#[tokio::test]
async fn chats_never_share_fingerprint_history() {
    let other_chat = ChatId(-1001000000888);
    let image = png_with_columns([1, 2, 3, 4, 5, 6, 7, 8, 9]);
    let loads = Arc::new(AtomicUsize::new(0));

    let registry = Arc::new(ConversationRegistry::new());
    registry.enable(CHAT).await;
    registry.enable(other_chat).await;

    post(&registry, "x1", 1, SENDER, &image, &loads).await;

    // Same image, different chat: still a baseline there.
    let detector = RepostDetector::new(Arc::clone(&registry), DEFAULT_THRESHOLD);
    let event = ImageEvent {
        chat: other_chat,
        sender: SENDER,
        media: MediaId::new("x2"),
        message: MessageId(5),
    };
    let loads_clone = Arc::clone(&loads);
    let bytes = image.clone();
    let reply = detector
        .process(
            &event,
            |prior| format!("https://t.me/c/1000000888/{prior}"),
            move || {
                loads_clone.fetch_add(1, Ordering::SeqCst);
                async move { Ok(bytes) }
            },
        )
        .await
        .unwrap();
    assert!(reply.is_none());
}
