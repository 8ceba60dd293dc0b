//! Read-only queries against the library index.

use std::future::Future;
use std::sync::Arc;

use rockbox_library::LibraryIndex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{OpError, RegistryError};
use crate::marshal::{to_script, ArgType, Args, Param, Returns};
use crate::namespace::Namespace;
use crate::registry::{Domain, Operation, Registry};

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

fn op<F, Fut>(library: &Arc<dyn LibraryIndex>, method: &str, handler: F) -> Operation
where
    F: Fn(Arc<dyn LibraryIndex>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, OpError>> + Send + 'static,
{
    let library = library.clone();
    Operation::task(Domain::Library, method, move |args| handler(library.clone(), args))
}

fn id_param() -> Param {
    Param::required("id", ArgType::non_empty_string())
}

/// Register `library.*`. Scripts see the methods grouped as
/// `rb.library.album`, `rb.library.artist` and `rb.library.track`.
pub fn register(registry: &Registry, library: Arc<dyn LibraryIndex>) -> Result<Namespace, RegistryError> {
    let lib = &library;

    registry.register(
        op(lib, "getAlbum", |lib, args| async move {
            let IdArgs { id } = args.parse()?;
            to_script(&lib.album(&id).await?)
        })
        .param(id_param())
        .returns(Returns::nullable(Returns::Record("Album"))),
    )?;
    registry.register(
        op(lib, "getAlbums", |lib, _| async move { to_script(&lib.albums().await?) })
            .returns(Returns::list(Returns::Record("Album"))),
    )?;
    registry.register(
        op(lib, "getArtist", |lib, args| async move {
            let IdArgs { id } = args.parse()?;
            to_script(&lib.artist(&id).await?)
        })
        .param(id_param())
        .returns(Returns::nullable(Returns::Record("Artist"))),
    )?;
    registry.register(
        op(lib, "getArtists", |lib, _| async move { to_script(&lib.artists().await?) })
            .returns(Returns::list(Returns::Record("Artist"))),
    )?;
    registry.register(
        op(lib, "getTrack", |lib, args| async move {
            let IdArgs { id } = args.parse()?;
            to_script(&lib.track(&id).await?)
        })
        .param(id_param())
        .returns(Returns::nullable(Returns::Record("Track"))),
    )?;
    registry.register(
        op(lib, "getTracks", |lib, _| async move { to_script(&lib.tracks().await?) })
            .returns(Returns::list(Returns::Record("Track"))),
    )?;

    Ok(Namespace::new()
        .child(
            "album",
            Namespace::new()
                .method("getAlbum", "library.getAlbum")
                .method("getAlbums", "library.getAlbums"),
        )
        .child(
            "artist",
            Namespace::new()
                .method("getArtist", "library.getArtist")
                .method("getArtists", "library.getArtists"),
        )
        .child(
            "track",
            Namespace::new()
                .method("getTrack", "library.getTrack")
                .method("getTracks", "library.getTracks"),
        )
        .under("library"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::error::ErrorKind;
    use crate::namespace::Node;
    use crate::testing::FakeLibrary;
    use rockbox_library::Album;
    use serde_json::json;

    fn album(id: &str, title: &str) -> Album {
        Album {
            id: id.into(),
            title: title.into(),
            artist: "Air".into(),
            year: 1998,
            year_string: "1998".into(),
            album_art: None,
            md5: "d41d8cd9".into(),
            artist_id: "air".into(),
            tracks: Vec::new(),
        }
    }

    fn dispatcher(library: FakeLibrary) -> (Namespace, Dispatcher) {
        let registry = Registry::new();
        let namespace = register(&registry, Arc::new(library)).unwrap();
        (namespace, Dispatcher::new(Arc::new(registry)))
    }

    #[test]
    fn test_namespace_is_grouped() {
        let registry = Registry::new();
        let namespace = register(&registry, Arc::new(FakeLibrary::default())).unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(
            namespace.get("library.album.getAlbum"),
            Some(&Node::Method("library.getAlbum".into()))
        );
        assert!(namespace.get("library.getAlbum").is_none());
    }

    #[tokio::test]
    async fn test_unknown_album_is_null() {
        let (_ns, dispatcher) = dispatcher(FakeLibrary {
            albums: vec![album("moon-safari", "Moon Safari")],
            ..FakeLibrary::default()
        });
        let value = dispatcher
            .dispatch("library.getAlbum", vec![json!("nope")])
            .await
            .unwrap();
        assert_eq!(value, Value::Null);

        let value = dispatcher
            .dispatch("library.getAlbum", vec![json!("moon-safari")])
            .await
            .unwrap();
        assert_eq!(value["title"], "Moon Safari");
        assert_eq!(value["year"], 1998);
    }

    #[tokio::test]
    async fn test_lists() {
        let (_ns, dispatcher) = dispatcher(FakeLibrary {
            albums: vec![album("a", "Premiers Symptômes"), album("b", "Talkie Walkie")],
            ..FakeLibrary::default()
        });
        let albums = dispatcher.dispatch("library.getAlbums", vec![]).await.unwrap();
        assert_eq!(albums.as_array().unwrap().len(), 2);
        let tracks = dispatcher.dispatch("library.getTracks", vec![]).await.unwrap();
        assert_eq!(tracks, json!([]));
    }

    #[tokio::test]
    async fn test_index_failure_is_internal() {
        let (_ns, dispatcher) = dispatcher(FakeLibrary {
            failing: true,
            ..FakeLibrary::default()
        });
        let err = dispatcher
            .dispatch("library.getArtists", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert!(!err.to_string().contains("locked"));
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let (_ns, dispatcher) = dispatcher(FakeLibrary::default());
        let err = dispatcher
            .dispatch("library.getTrack", vec![json!("")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentError);
    }
}
