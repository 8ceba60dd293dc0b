// Shared test utilities for integration tests
use std::path::Path;
use std::sync::Arc;

use rockbox_audio::HttpEngine;
use rockbox_ext::{Bridge, BridgeConfig};
use rockbox_library::{DatabaseConfig, Library};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TRACKS: [&str; 3] = [
    "Air/Moon Safari/01 La femme d'argent.flac",
    "Air/Moon Safari/02 Sexy Boy.flac",
    "Air/Moon Safari/03 All I Need.flac",
];

/// A daemon stand-in that accepts every command and reports position 0.
pub async fn engine_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file_position"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "position": 0, "elapsed": 0 })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Music library with three tracks under `tmp_dir/Music`.
pub fn music_dir(tmp_dir: &Path) -> std::path::PathBuf {
    let root = tmp_dir.join("Music");
    std::fs::create_dir_all(root.join("Air/Moon Safari")).unwrap();
    for track in TRACKS {
        std::fs::write(root.join(track), b"not really flac").unwrap();
    }
    root
}

/// A bridge over the HTTP engine at `server` and an empty in-memory index.
pub async fn test_bridge(server: &MockServer, tmp_dir: &Path) -> Bridge {
    let engine = HttpEngine::with_base_url(&server.uri(), 5).unwrap();
    let db = rockbox_library::connect(&DatabaseConfig::in_memory())
        .await
        .unwrap();
    rockbox_library::create_schema(&db).await.unwrap();

    let config = BridgeConfig::new(music_dir(tmp_dir), tmp_dir.join("state"));
    Bridge::new(config, Arc::new(engine), Arc::new(Library::new(db)))
        .await
        .unwrap()
}

/// Paths of the PUT commands the engine received, in order.
pub async fn engine_commands(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.url.path().trim_start_matches('/').to_string())
        .collect()
}
