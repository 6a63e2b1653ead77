//! End-to-end tests: raw tables on disk through preprocessing, training,
//! artifact persistence and the HTTP API.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use data_loader::{DataIndex, write_processed};
use features::create_user_item_matrix;
use models::{grid_search, train_knn};
use serde_json::{Value, json};
use server::{AppState, ModelKind, ServerConfig, router};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const MOVIES: &str = "movieId,title,genres
1,Toy Story (1995),Adventure|Animation|Children|Comedy|Fantasy
2,Jumanji (1995),Adventure|Children|Fantasy
3,Heat (1995),Action|Crime|Thriller
4,Sabrina (1995),Comedy|Romance
5,GoldenEye (1995),Action|Adventure|Thriller
";

const RATINGS: &str = "userId,movieId,rating,timestamp
1,1,4.0,964982703
1,3,4.0,964981247
1,5,5.0,964982224
2,1,3.0,964982931
2,2,4.0,964982400
3,2,5.0,964983034
3,4,2.5,964982176
3,5,1.0,964982400
4,1,4.5,964982400
4,4,3.0,964982653
not-a-user,1,4.0,964982703
";

fn write_raw(dir: &Path) {
    fs::write(dir.join("movies.csv"), MOVIES).unwrap();
    fs::write(dir.join("ratings.csv"), RATINGS).unwrap();
}

fn prepare(kind: ModelKind) -> (TempDir, ServerConfig) {
    let root = TempDir::new().unwrap();
    let raw = root.path().join("raw");
    let processed = root.path().join("processed");
    fs::create_dir_all(&raw).unwrap();
    write_raw(&raw);

    let raw_index = DataIndex::load_from_files(&raw).unwrap();
    assert_eq!(raw_index.ratings().len(), 10);
    write_processed(&raw_index, &processed).unwrap();

    let index = DataIndex::load_processed(&processed).unwrap();
    let matrix = create_user_item_matrix(index.ratings());
    let model_path = root.path().join("models").join("model.bin");
    match kind {
        ModelKind::Svd => grid_search(&matrix, &[1, 2, 3]).unwrap().best.save(&model_path).unwrap(),
        ModelKind::Knn => train_knn(&matrix, 2).unwrap().save(&model_path).unwrap(),
    }

    let config = ServerConfig::default()
        .with_data_dir(processed)
        .with_model_path(model_path)
        .with_model_kind(kind);
    (root, config)
}

async fn recommend(state: AppState, body: Value) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/recommend")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_svd_pipeline_end_to_end() {
    let (_root, config) = prepare(ModelKind::Svd);
    let state = AppState::load(&config).unwrap();

    let request = json!({ "user_id": 1, "n_recommendations": 2 });
    let (status, body) = recommend(state.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "svd");

    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 2);
    for rec in recs {
        let movie_id = rec["movieId"].as_u64().unwrap();
        assert!(![1, 3, 5].contains(&movie_id));
        assert!(rec["title"].as_str().unwrap().contains("(1995)"));
    }

    let (status, _) = recommend(state.clone(), json!({ "user_id": 77 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(state.log.total(), 1);
}

#[tokio::test]
async fn test_knn_pipeline_end_to_end() {
    let (_root, config) = prepare(ModelKind::Knn);
    let state = AppState::load(&config).unwrap();

    let (status, body) = recommend(state, json!({ "user_id": 2, "n_recommendations": 5 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "knn");
    let rated = [1u64, 2];
    assert!(
        body["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| !rated.contains(&r["movieId"].as_u64().unwrap()))
    );
}

#[test]
fn test_startup_fails_without_artifact() {
    let (root, config) = prepare(ModelKind::Svd);
    let missing = config.with_model_path(root.path().join("nope.bin"));
    let err = AppState::load(&missing).err().unwrap();
    assert!(format!("{err:#}").contains("not found"));
}

#[test]
fn test_startup_rejects_wrong_artifact_kind() {
    let (_root, config) = prepare(ModelKind::Knn);
    let mismatched = config.with_model_kind(ModelKind::Svd);
    assert!(AppState::load(&mismatched).is_err());
}
