mod common;

use common::{engine_commands, engine_server, test_bridge, TRACKS};
use rockbox_ext::{ErrorKind, OpError};
use serde_json::{json, Value};

async fn load_tracks(bridge: &rockbox_ext::Bridge) {
    bridge
        .call("playlist.insertTracks", vec![json!("last"), json!(TRACKS)])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_every_call_settles_once() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;
    load_tracks(&bridge).await;

    let handles: Vec<_> = [
        ("playback.play", vec![]),
        ("playback.status", vec![]),
        ("playlist.amount", vec![]),
        ("sound.adjustVolume", vec![json!(1)]),
        ("system.getGlobalStatus", vec![]),
        ("playback.pause", vec![]),
        ("playback.status", vec![]),
    ]
    .into_iter()
    .map(|(path, args)| bridge.call(path, args))
    .collect();
    let ids: Vec<_> = handles.iter().map(|h| h.id()).collect();

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(bridge.dispatcher().pending_count(), 0);
    for id in ids {
        assert!(!bridge.dispatcher().cancel(id), "call settled twice");
    }
}

#[tokio::test]
async fn test_type_mismatch_is_argument_error() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let err = bridge
        .call("playlist.removeTracks", vec![json!("0")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
    assert_eq!(err.to_script().parameter.as_deref(), Some("positions"));

    let err = bridge
        .call("playback.fastForwardRewind", vec![json!(-5)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);

    let err = bridge
        .call("sound.setPitch", vec![json!(2500)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
    assert!(engine_commands(&server).await.is_empty());
}

#[tokio::test]
async fn test_pause_twice_stays_paused() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;
    load_tracks(&bridge).await;

    bridge.call("playback.play", vec![]).await.unwrap();
    bridge.call("playback.pause", vec![]).await.unwrap();
    bridge.call("playback.pause", vec![]).await.unwrap();

    let status = bridge.call("playback.status", vec![]).await.unwrap();
    assert_eq!(status, json!(3));
    assert_eq!(engine_commands(&server).await, vec!["play", "pause"]);

    let resume = bridge.call("playlist.getResumeInfo", vec![]).await.unwrap();
    assert_eq!(resume["index"], 0);
}

#[tokio::test]
async fn test_resume_while_stopped_is_rejected() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let err = bridge.call("playback.resume", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    let err = bridge.call("playback.play", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
}

#[tokio::test]
async fn test_removing_before_cursor_shifts_it() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;
    load_tracks(&bridge).await;

    bridge.call("playlist.start", vec![json!(1)]).await.unwrap();
    bridge
        .call("playlist.removeTracks", vec![json!([0])])
        .await
        .unwrap();

    let current = bridge.call("playlist.getCurrent", vec![]).await.unwrap();
    assert_eq!(current["index"], 0);
    assert_eq!(current["amount"], 2);
    assert_eq!(current["tracks"][0], TRACKS[1]);

    let playing = bridge.call("playback.currentTrack", vec![]).await.unwrap();
    assert_eq!(playing["path"], TRACKS[1]);
    assert_eq!(playing["index"], 0);
    assert_eq!(playing["title"], "02 Sexy Boy");

    bridge.call("playback.pause", vec![]).await.unwrap();
    let resume = bridge.call("playlist.getResumeInfo", vec![]).await.unwrap();
    assert_eq!(resume["index"], 0);

    bridge.call("playback.hardStop", vec![]).await.unwrap();
    bridge.call("playlist.resumeTrack", vec![]).await.unwrap();
    let playing = bridge.call("playback.currentTrack", vec![]).await.unwrap();
    assert_eq!(playing["path"], TRACKS[1]);
}

#[tokio::test]
async fn test_overlapping_inserts_apply_in_order() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let handles: Vec<_> = TRACKS
        .iter()
        .rev()
        .map(|track| bridge.call("rb.playlist.insertTracks", vec![json!("prepend"), json!([track])]))
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let current = bridge.call("playlist.getCurrent", vec![]).await.unwrap();
    assert_eq!(current["tracks"], json!(TRACKS));
}

#[tokio::test]
async fn test_unknown_album_is_null() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let album = bridge
        .call("library.album.getAlbum", vec![json!("moon-safari")])
        .await
        .unwrap();
    assert_eq!(album, Value::Null);
    let artists = bridge.call("library.artist.getArtists", vec![]).await.unwrap();
    assert_eq!(artists, json!([]));
}

#[tokio::test]
async fn test_browse_cannot_escape_library() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let err = bridge
        .call("browse.getEntries", vec![json!("../../etc")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathNotFound);

    let entries = bridge
        .call("browse.getEntries", vec![json!("/Air")])
        .await
        .unwrap();
    assert_eq!(entries[0]["name"], "Air/Moon Safari");
}

#[tokio::test]
async fn test_saved_settings_reach_engine_and_disk() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let saved = bridge
        .call("settings.saveSettings", vec![json!({ "volume": -10, "repeat_mode": 1 })])
        .await
        .unwrap();
    assert_eq!(saved["volume"], -10);
    assert_eq!(engine_commands(&server).await, vec!["sound/volume"]);

    let on_disk = std::fs::read_to_string(bridge.config().settings_file()).unwrap();
    assert!(on_disk.contains("volume = -10"));

    let err = bridge
        .call("settings.saveSettings", vec![json!({ "volume": 40 })])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
    let current = bridge.call("sound.soundCurrent", vec![json!("volume")]).await.unwrap();
    assert_eq!(current, json!(-10));
}

#[tokio::test]
async fn test_engine_failure_is_internal() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("PUT"))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;
    load_tracks(&bridge).await;

    let err = bridge.call("playback.play", vec![]).await.unwrap_err();
    assert!(matches!(err, OpError::Internal(_)));
    assert!(!err.to_string().contains("503"));
    let status = bridge.call("playback.status", vec![]).await.unwrap();
    assert_eq!(status, json!(0));
}

#[tokio::test]
async fn test_shutdown_cancels_new_calls() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    bridge.shutdown().await;
    let err = bridge.call("playlist.amount", vec![]).await.unwrap_err();
    assert!(matches!(err, OpError::Cancelled));
}

#[tokio::test]
async fn test_typescript_and_description() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let ts = bridge.projection().typescript();
    assert!(ts.contains("declare const rb: Rb;"));
    assert!(ts.contains("  pause(): Promise<void>;"));
    assert!(ts.contains("  readonly PLAYING: 1;"));
    assert!(ts.contains("insertTracks(position: number | InsertPositionName, tracks: string[])"));
    assert!(ts.contains("getAlbum(id: string): Promise<Album | null>;"));

    let described = bridge.projection().describe();
    assert_eq!(described["playback"]["PAUSED"], json!({ "const": 3 }));
    assert_eq!(described["sound"]["setPitch"]["op"], "sound.setPitch");
    assert_eq!(described["playlist"]["PLAYLIST_INSERT_LAST"], json!({ "const": -3 }));
}

#[tokio::test]
async fn test_sound_extras_reach_engine() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let phys = bridge
        .call("sound.soundVal2Phys", vec![json!("bass"), json!(6)])
        .await
        .unwrap();
    assert_eq!(phys, json!(60));
    let clicked = bridge.call("sound.keyClickClick", vec![]).await.unwrap();
    assert_eq!(clicked, json!(false));

    bridge
        .call("sound.beepPlay", vec![json!(880), json!(100), json!(1000)])
        .await
        .unwrap();
    bridge
        .call("sound.pcmSetLowLatency", vec![json!(true)])
        .await
        .unwrap();
    let low = bridge.call("sound.pcmGetLowLatency", vec![]).await.unwrap();
    assert_eq!(low, json!(true));
    assert_eq!(engine_commands(&server).await, vec!["beep", "pcmbuf/low_latency"]);

    let err = bridge
        .call("sound.beepPlay", vec![json!(5), json!(100), json!(1000)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
}

#[tokio::test]
async fn test_operation_ids_are_not_paths() {
    let server = engine_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let bridge = test_bridge(&server, tmp.path()).await;

    let err = bridge
        .call("library.getAlbum", vec![json!("moon-safari")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownOperation);
}
