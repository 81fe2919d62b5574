mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app;
use common::fixtures::lessons;
use common::http::{assert_status_ok_json, call};

#[tokio::test]
async fn it_imports_and_folds_browser_storage() {
    let app = spawn_test_app().await;

    let dump = json!({
        "userData": "{\"name\":\"Lucía\",\"xp\":\"250\",\"streak\":4,\"hearts\":9,\"completedLessons\":[1]}",
        "completedLessons": "[1,2]",
        "nivel3_completado": "true",
        "nivel4_completado": "false",
        "nivel11_completado": "true",
        "dailyProgress": "15",
        "lastDailyReset": "Thu Oct 16 2026",
        "userRanking": [{ "id": "friend-1", "name": "Pablo", "xp": 420, "streak": 2 }],
        "syncQueue": [{ "type": "saveProgress", "data": { "xp": 250 }, "timestamp": 1760600000000_i64 }],
        "theme": "dark"
    });

    let (status, body) = call(&app.app, Method::POST, "/api/import/local-storage", Some(dump)).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["written"], 9);

    let profile = &body["data"]["profile"];
    assert_eq!(profile["name"], "Lucía");
    assert_eq!(profile["xp"], 250);
    assert_eq!(profile["level"], 3);
    assert_eq!(profile["streak"], 4);
    assert_eq!(profile["hearts"], 5);
    assert_eq!(profile["dailyProgress"], 15);
    assert_eq!(profile["completedLessons"], json!([1, 2, 3]));

    let stored = app.store().load_profile(5).unwrap();
    assert_eq!(stored.completed_lessons, lessons(&[1, 2, 3]));

    let (_, body) = call(&app.app, Method::GET, "/api/leaderboard", None).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["friend-1", "local"]);

    assert_eq!(app.store().pending_operation_count(), 1);

    let (_, body) = call(&app.app, Method::GET, "/api/lessons", None).await;
    assert_eq!(body["data"][3]["unlocked"], true);
    assert_eq!(body["data"][4]["unlocked"], false);
}

#[tokio::test]
async fn it_existing_profile_wins_over_imported_values() {
    let app = spawn_test_app().await;
    app.engine().startup_checks().await.unwrap();
    common::fixtures::seed_profile(app.store(), |p| p.xp = 40);

    let dump = json!({ "xp": "900", "completedLessons": "[1]" });
    let (status, body) = call(&app.app, Method::POST, "/api/import/local-storage", Some(dump)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["xp"], 40);
    assert_eq!(body["data"]["profile"]["completedLessons"], json!([1]));
}

#[tokio::test]
async fn it_user_data_lessons_merge_after_startup() {
    let app = spawn_test_app().await;
    app.engine().startup_checks().await.unwrap();
    common::fixtures::seed_profile(app.store(), |p| {
        p.completed_lessons.insert(1);
    });

    let dump = json!({ "userData": "{\"completedLessons\":[2,3]}" });
    let (status, body) = call(&app.app, Method::POST, "/api/import/local-storage", Some(dump)).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["profile"]["completedLessons"], json!([1, 2, 3]));
    assert_eq!(
        app.store().load_profile(5).unwrap().completed_lessons,
        lessons(&[1, 2, 3])
    );
}

#[tokio::test]
async fn it_malformed_values_fall_back_to_defaults() {
    let app = spawn_test_app().await;

    let dump = json!({
        "userData": "{not json",
        "xp": "-12",
        "hearts": "NaN",
        "completedLessons": "[\"x\", 2, -1]"
    });
    let (status, body) = call(&app.app, Method::POST, "/api/import/local-storage", Some(dump)).await;
    assert_eq!(status, StatusCode::OK);
    let profile = &body["data"]["profile"];
    assert_eq!(profile["xp"], 0);
    assert_eq!(profile["hearts"], 5);
    assert_eq!(profile["level"], 1);
    assert_eq!(profile["completedLessons"], json!([2]));
}
