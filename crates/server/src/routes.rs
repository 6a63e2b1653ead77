//! HTTP routes.

use crate::error::ApiError;
use crate::monitoring::{drift_report, insufficient_data_html};
use crate::state::AppState;
use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use data_loader::{MovieId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

pub const MIN_RECOMMENDATIONS: usize = 1;
pub const MAX_RECOMMENDATIONS: usize = 20;
pub const DEFAULT_RECOMMENDATIONS: i64 = 10;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/recommend", post(recommend))
        .route("/monitoring/drift-report", get(drift))
        .route("/monitoring/stats", get(stats))
        .with_state(state)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    pub user_id: UserId,
    #[serde(default = "default_recommendations")]
    pub n_recommendations: i64,
}

fn default_recommendations() -> i64 {
    DEFAULT_RECOMMENDATIONS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedMovie {
    #[serde(rename = "movieId")]
    pub movie_id: MovieId,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub user_id: UserId,
    pub model: String,
    pub recommendations: Vec<RecommendedMovie>,
}

async fn home(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("Movie recommendation API ({}) online", state.recommender.name()),
        "status": "OK",
    }))
}

#[instrument(skip_all)]
async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let n = usize::try_from(request.n_recommendations)
        .ok()
        .filter(|n| (MIN_RECOMMENDATIONS..=MAX_RECOMMENDATIONS).contains(n))
        .ok_or(ApiError::InvalidCount {
            found: request.n_recommendations,
            min: MIN_RECOMMENDATIONS,
            max: MAX_RECOMMENDATIONS,
        })?;
    let user_id = request.user_id;

    let recommender = state.recommender.clone();
    let scored = tokio::task::spawn_blocking(move || recommender.recommend(user_id, n))
        .await
        .map_err(|e| ApiError::Internal(format!("scoring task failed: {e}")))??;

    let recommendations = scored
        .into_iter()
        .map(|r| RecommendedMovie {
            movie_id: r.movie_id,
            title: state
                .index
                .get_movie(r.movie_id)
                .map(|m| m.title.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            score: (r.score * 1000.0).round() / 1000.0,
        })
        .collect::<Vec<_>>();

    state.log.record(user_id, n);
    info!(user_id, n, returned = recommendations.len(), "Served recommendations");

    Ok(Json(RecommendResponse {
        user_id,
        model: state.recommender.name().to_string(),
        recommendations,
    }))
}

async fn drift(State(state): State<AppState>) -> Html<String> {
    let records = state.log.snapshot();
    match drift_report(&records) {
        Some(report) => Html(report.to_html()),
        None => Html(insufficient_data_html(records.len())),
    }
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "total_requests": state.log.total(),
        "logged_requests": state.log.len(),
        "capacity": state.log.capacity(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::RequestLog;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use data_loader::{DataIndex, Genre, Movie, Rating};
    use features::create_user_item_matrix;
    use models::{SvdScorer, train_svd};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut index = DataIndex::new();
        for (id, title) in [(10, "Alien (1979)"), (20, "Heat (1995)")] {
            index.insert_movie(Movie {
                id,
                title: title.to_string(),
                year: None,
                genres: vec![Genre::Drama],
            });
        }
        // Movie 30 has ratings but no row in the movie table
        let ratings = [
            (1, 10, 4.0),
            (2, 20, 5.0),
            (3, 10, 3.0),
            (3, 20, 3.0),
            (3, 30, 2.0),
        ];
        for (user_id, movie_id, rating) in ratings {
            index.insert_rating(Rating {
                user_id,
                movie_id,
                rating,
                timestamp: None,
            });
        }

        let index = Arc::new(index);
        let matrix = create_user_item_matrix(index.ratings());
        let model = Arc::new(train_svd(&matrix, 2).unwrap());
        AppState::new(Arc::new(SvdScorer::new(model, index.clone())), index)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "OK");
    }

    #[tokio::test]
    async fn test_recommend_excludes_rated_and_rounds() {
        let state = test_state();
        let response = router(state.clone())
            .oneshot(post_json("/recommend", json!({ "user_id": 1, "n_recommendations": 5 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: RecommendResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.user_id, 1);
        assert_eq!(body.model, "svd");
        assert_eq!(body.recommendations.len(), 2);
        assert!(body.recommendations.iter().all(|r| r.movie_id != 10));
        for rec in &body.recommendations {
            assert_eq!((rec.score * 1000.0).round() / 1000.0, rec.score);
        }
        let unknown = body.recommendations.iter().find(|r| r.movie_id == 30).unwrap();
        assert_eq!(unknown.title, "Unknown");
        assert_eq!(state.log.total(), 1);
    }

    #[tokio::test]
    async fn test_default_count() {
        let state = test_state();
        let response = router(state.clone())
            .oneshot(post_json("/recommend", json!({ "user_id": 2 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.log.snapshot()[0].n_recommendations, 10);
    }

    #[tokio::test]
    async fn test_count_out_of_range() {
        for n in [0, 21, -3] {
            let response = router(test_state())
                .oneshot(post_json("/recommend", json!({ "user_id": 1, "n_recommendations": n })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let state = test_state();
        let response = router(state.clone())
            .oneshot(post_json("/recommend", json!({ "user_id": 999 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["detail"].as_str().unwrap().contains("999"));
        assert_eq!(state.log.total(), 0);
    }

    #[tokio::test]
    async fn test_drift_report_needs_traffic() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/monitoring/drift-report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Need 50+ requests"));
    }

    #[tokio::test]
    async fn test_drift_report_and_stats() {
        let state = test_state().with_log(Arc::new(RequestLog::with_capacity(100)));
        for i in 0..120 {
            state.log.record(1 + i % 3, 10);
        }

        let app = router(state);
        let report = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/monitoring/drift-report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(report.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Data Drift Report"));

        let stats = app
            .oneshot(
                Request::builder()
                    .uri("/monitoring/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(stats).await;
        assert_eq!(body["total_requests"], 120);
        assert_eq!(body["logged_requests"], 100);
    }
}
