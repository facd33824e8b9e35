use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flix_core::{
    spawn_latest_wins_with, DataFetcher, FetchError, FlixConfig, ItemId, ListKey, Resolution,
    TmdbClient,
};
use tokio::sync::mpsc;

fn client_for(server: &MockServer) -> TmdbClient {
    let mut config = FlixConfig::default();
    config.api.base_url = server.uri();
    config.api.access_token = Some("secret-token".into());
    config.favorites.toggle_latency_ms = 5;
    TmdbClient::new(Client::new(), &config).expect("valid base url")
}

fn results(ids: &[i64]) -> serde_json::Value {
    json!({
        "page": 1,
        "results": ids
            .iter()
            .map(|id| json!({ "id": id, "title": format!("movie {id}"), "vote_average": 7.5 }))
            .collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn category_page_hits_movie_list_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/movie/popular"))
        .and(query_param("page", "2"))
        .and(query_param("sort_by", "popularity.desc"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results(&[1, 2, 3])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client
        .fetch_page(&ListKey::Category("popular".into()), 2)
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].id, ItemId::Number(1));
    assert_eq!(items[0].extra["vote_average"], 7.5);
}

#[tokio::test]
async fn genre_page_uses_discover_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/discover/movie"))
        .and(query_param("with_genres", "28"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results(&[9])))
        .expect(1)
        .mount(&server)
        .await;

    let items = client_for(&server)
        .fetch_page(&ListKey::Genre("28".into()), 1)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn fetch_by_key_searches_first_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/search/movie"))
        .and(query_param("query", "batman"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results(&[268, 272])))
        .expect(1)
        .mount(&server)
        .await;

    let items = client_for(&server).fetch_by_key("batman").await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn error_status_becomes_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/movie/top_rated"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_page(&ListKey::Category("top_rated".into()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 401, .. }));
}

#[tokio::test]
async fn items_without_title_fail_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/movie/upcoming"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "id": 1 }] })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_page(&ListKey::Category("upcoming".into()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn genres_and_recommendations_unwrap_envelopes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/genre/movie/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "genres": [{ "id": 28, "name": "Action" }, { "id": 35, "name": "Comedy" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/3/movie/550/recommendations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results(&[680])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let genres = client.genres().await.unwrap();
    assert_eq!(genres[1].name, "Comedy");
    let recommended = client.recommendations("550").await.unwrap();
    assert_eq!(recommended[0].id, ItemId::Number(680));
}

async fn mount_detail(server: &MockServer, id: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/3/movie/{id}")))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "title": "Fight Club",
            "tagline": "Mischief. Mayhem. Soap.",
            "runtime": 139,
            "genres": [{ "id": 18, "name": "Drama" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/3/movie/{id}/credits")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "cast": [
                { "id": 819, "name": "Edward Norton", "character": "Narrator" },
                { "id": 287, "name": "Brad Pitt", "character": "Tyler Durden" }
            ],
            "crew": [{ "id": 7467, "name": "David Fincher", "job": "Director" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/3/movie/{id}/recommendations")))
        .respond_with(ResponseTemplate::new(200).set_body_json(results(&[680, 807])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn movie_and_credits_hit_detail_endpoints() {
    let server = MockServer::start().await;
    mount_detail(&server, 550).await;

    let client = client_for(&server);
    let movie = client.movie("550").await.unwrap();
    assert_eq!(movie.title, "Fight Club");
    assert_eq!(movie.extra["runtime"], 139);

    let credits = client.credits("550").await.unwrap();
    assert_eq!(credits.cast.len(), 2);
    assert_eq!(credits.cast[1].character.as_deref(), Some("Tyler Durden"));
    assert_eq!(credits.crew[0].job.as_deref(), Some("Director"));
}

#[tokio::test]
async fn movie_detail_combines_all_three_sources() {
    let server = MockServer::start().await;
    mount_detail(&server, 550).await;

    let detail = client_for(&server).movie_detail("550").await.unwrap();
    assert_eq!(detail.movie.id, ItemId::Number(550));
    assert_eq!(detail.credits.cast[0].name, "Edward Norton");
    assert_eq!(detail.recommendations.len(), 2);
}

#[tokio::test]
async fn movie_detail_fails_when_any_source_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/movie/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/3/movie/404/credits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "cast": [], "crew": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/3/movie/404/recommendations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results(&[])))
        .mount(&server)
        .await;

    let err = client_for(&server).movie_detail("404").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn movie_detail_resolves_latest_route_id() {
    let server = MockServer::start().await;
    mount_detail(&server, 550).await;

    let client = client_for(&server);
    let (tx, mut results) = mpsc::channel(8);
    let resolver = spawn_latest_wins_with(
        move |id: String| {
            let client = client.clone();
            async move { client.movie_detail(&id).await.map(Some) }
        },
        tx,
    );

    resolver.submit("550").await.unwrap();
    assert_eq!(results.recv().await, Some(Resolution::Loading { key: "550".into() }));
    match results.recv().await {
        Some(Resolution::Ready { key, value: Some(detail) }) => {
            assert_eq!(key, "550");
            assert_eq!(detail.movie.title, "Fight Club");
        }
        other => panic!("unexpected resolution {other:?}"),
    }
    resolver.stop().await.unwrap();
}

#[tokio::test]
async fn toggle_round_trip_waits_then_succeeds() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    client.perform_toggle_round_trip().await.unwrap();
}
