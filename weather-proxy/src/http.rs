use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use weather_core::{GatewayError, WeatherGateway, WeatherRecord};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error_message: String,
}

/// HTTP face of a [`GatewayError`].
#[derive(Debug)]
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            error_message: self.0.client_message(),
        });

        let mut response = (status, body).into_response();

        if let GatewayError::TooManyRequests { retry_after } = &self.0 {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs()),
            );
        }

        response
    }
}

pub fn router(gateway: Arc<WeatherGateway>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/weather", get(get_weather))
        .route("/health", get(health))
        .layer(cors)
        .with_state(gateway)
}

async fn get_weather(
    State(gateway): State<Arc<WeatherGateway>>,
    headers: HeaderMap,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> Result<Json<WeatherRecord>, ApiError> {
    let Query(query) =
        query.map_err(|rejection| GatewayError::InvalidInput(rejection.body_text()))?;
    let caller_key = caller_key(&headers, &query)?;

    let record = gateway
        .handle(&query.city, &query.country, caller_key)
        .await?;

    Ok(Json(record))
}

/// The `X-Api-Key` header wins over the `apiKey` query parameter whenever it is present.
fn caller_key<'a>(headers: &'a HeaderMap, query: &'a WeatherQuery) -> Result<&'a str, ApiError> {
    match headers.get(API_KEY_HEADER) {
        Some(value) => value.to_str().map_err(|_| {
            tracing::warn!("Rejected request with a non-ASCII API key header");
            ApiError(GatewayError::Unauthorized)
        }),
        None => Ok(query.api_key.as_deref().unwrap_or_default()),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;
    use weather_core::{AccessGuard, CredentialPool, OpenWeatherClient, RateLimiter, SystemClock};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_KEY: &str = "APIKEY-12345";
    const UPSTREAM_PATH: &str = "/data/2.5/weather";

    fn paris_body() -> serde_json::Value {
        serde_json::json!({
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
            "main": {"temp": 18.5, "feels_like": 17.9, "humidity": 60},
            "name": "Paris"
        })
    }

    async fn upstream_returning(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPSTREAM_PATH))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    fn app_with_timeout(server: &MockServer, max_requests: u32, timeout: Duration) -> Router {
        let credentials =
            Arc::new(CredentialPool::new(vec!["upstream".into()]).expect("pool"));
        let provider = OpenWeatherClient::new(
            format!("{}{UPSTREAM_PATH}", server.uri()),
            timeout,
            credentials.clone(),
        )
        .expect("client builds");

        let gateway = WeatherGateway::new(
            AccessGuard::new([VALID_KEY]),
            Arc::new(RateLimiter::new(
                max_requests,
                Duration::from_secs(3600),
                Arc::new(SystemClock),
            )),
            credentials,
            Arc::new(provider),
        );
        router(Arc::new(gateway))
    }

    fn app(server: &MockServer, max_requests: u32) -> Router {
        app_with_timeout(server, max_requests, Duration::from_secs(2))
    }

    fn weather_request(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn returns_record_for_valid_request() {
        let server = upstream_returning(ResponseTemplate::new(200).set_body_json(paris_body())).await;

        let response = app(&server, 5)
            .oneshot(weather_request(
                "/api/weather?city=Paris&country=fr",
                Some(VALID_KEY),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "city": "Paris",
                "country": "fr",
                "description": "clear sky",
                "temperature": 18.5,
                "humidity": 60.0,
            })
        );
    }

    #[tokio::test]
    async fn accepts_key_from_query_string() {
        let server = upstream_returning(ResponseTemplate::new(200).set_body_json(paris_body())).await;

        let response = app(&server, 5)
            .oneshot(weather_request(
                "/api/weather?city=Paris&country=fr&apiKey=APIKEY-12345",
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_ascii_key_header_is_unauthorized_without_query_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paris_body()))
            .expect(0)
            .mount(&server)
            .await;

        let request = Request::builder()
            .uri("/api/weather?city=Paris&country=fr&apiKey=APIKEY-12345")
            .header(
                API_KEY_HEADER,
                HeaderValue::from_bytes(b"\xffAPIKEY-12345").expect("obs-text header value"),
            )
            .body(Body::empty())
            .expect("request");

        let response = app(&server, 5).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], 401);
    }

    #[tokio::test]
    async fn missing_country_is_bad_request() {
        let server = MockServer::start().await;

        let response = app(&server, 5)
            .oneshot(weather_request("/api/weather?city=Paris", Some(VALID_KEY)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn unparseable_query_is_json_bad_request() {
        let server = MockServer::start().await;

        let response = app(&server, 5)
            .oneshot(weather_request(
                "/api/weather?city=Paris&city=Lyon&country=fr",
                Some(VALID_KEY),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
        assert!(
            body["error_message"]
                .as_str()
                .is_some_and(|msg| msg.starts_with("Invalid input"))
        );
    }

    #[tokio::test]
    async fn unknown_key_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paris_body()))
            .expect(0)
            .mount(&server)
            .await;

        let response = app(&server, 5)
            .oneshot(weather_request(
                "/api/weather?city=Paris&country=fr",
                Some("INVALID"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn quota_exhaustion_sets_retry_after() {
        let server = upstream_returning(ResponseTemplate::new(200).set_body_json(paris_body())).await;
        let app = app(&server, 1);
        let uri = "/api/weather?city=Paris&country=fr";

        let first = app
            .clone()
            .oneshot(weather_request(uri, Some(VALID_KEY)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(weather_request(uri, Some(VALID_KEY)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let retry_after: u64 = second
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .expect("retry-after header");
        assert!((1..=3600).contains(&retry_after));
    }

    #[tokio::test]
    async fn upstream_failures_map_to_gateway_statuses() {
        let cases = [
            (ResponseTemplate::new(401), StatusCode::UNAUTHORIZED),
            (ResponseTemplate::new(500), StatusCode::BAD_GATEWAY),
            (
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "Paris"})),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (upstream, expected) in cases {
            let server = upstream_returning(upstream).await;

            let response = app(&server, 5)
                .oneshot(weather_request(
                    "/api/weather?city=Paris&country=fr",
                    Some(VALID_KEY),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn slow_upstream_is_gateway_timeout() {
        let server = upstream_returning(
            ResponseTemplate::new(200)
                .set_body_json(paris_body())
                .set_delay(Duration::from_secs(2)),
        )
        .await;

        let response = app_with_timeout(&server, 5, Duration::from_millis(100))
            .oneshot(weather_request(
                "/api/weather?city=Paris&country=fr",
                Some(VALID_KEY),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn malformed_upstream_body_is_not_echoed_to_caller() {
        let server = upstream_returning(
            ResponseTemplate::new(200).set_body_string("<html>upstream-internal-page</html>"),
        )
        .await;

        let response = app(&server, 5)
            .oneshot(weather_request(
                "/api/weather?city=Paris&country=fr",
                Some(VALID_KEY),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(
            body["error_message"],
            "Upstream weather service returned a malformed response"
        );
        assert!(!body.to_string().contains("upstream-internal-page"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let server = MockServer::start().await;

        let response = app(&server, 5)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
