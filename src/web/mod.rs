pub mod views;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::client::SchedulingClient;
use crate::models::FormData;
use crate::view::ViewState;
use crate::widget::BookingWidget;

pub(crate) type HostedWidget<C> = BookingWidget<C, ViewState>;

pub(crate) struct AppState<C> {
    pub(crate) widget: Arc<HostedWidget<C>>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            widget: Arc::clone(&self.widget),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    width: Option<u32>,
}

pub fn router<C: SchedulingClient + 'static>(widget: Arc<HostedWidget<C>>) -> Router {
    Router::new()
        .route("/", get(page_handler::<C>))
        .route("/refresh", post(refresh_handler::<C>))
        .route("/slots/{index}", post(select_handler::<C>))
        .route("/booking", post(submit_handler::<C>))
        .route("/booking/close", post(close_handler::<C>))
        .route("/config", get(config_handler::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { widget })
}

pub async fn serve<C: SchedulingClient + 'static>(widget: Arc<HostedWidget<C>>, addr: &str) -> Result<()> {
    let app = router(widget);
    let listener = TcpListener::bind(addr).await?;
    info!("Booking widget listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn page_handler<C: SchedulingClient + 'static>(
    State(state): State<AppState<C>>,
    Query(query): Query<PageQuery>,
) -> Html<String> {
    let widget = &state.widget;
    if let Some(width) = query.width {
        widget.resize(width);
    }
    // Leaves the error state once the cool-down has run out.
    widget.form_state();
    let config = widget.config();
    Html(widget.with_view(|view| views::render_page(config.as_deref(), view)))
}

async fn refresh_handler<C: SchedulingClient + 'static>(State(state): State<AppState<C>>) -> Redirect {
    if let Err(e) = state.widget.refresh_availability().await {
        warn!("Availability refresh failed: {}", e);
    }
    Redirect::to("/")
}

async fn select_handler<C: SchedulingClient + 'static>(
    State(state): State<AppState<C>>,
    Path(index): Path<usize>,
) -> Result<Redirect, StatusCode> {
    match state.widget.select_slot(index) {
        Some(_) => Ok(Redirect::to("/")),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn submit_handler<C: SchedulingClient + 'static>(
    State(state): State<AppState<C>>,
    Form(form): Form<FormData>,
) -> Redirect {
    match state.widget.submit(form).await {
        Ok(outcome) => info!("Booking form submitted: {:?}", outcome),
        Err(e) => warn!("Booking failed: {}", e),
    }
    Redirect::to("/")
}

async fn close_handler<C: SchedulingClient + 'static>(State(state): State<AppState<C>>) -> Redirect {
    state.widget.close_booking_page().await;
    Redirect::to("/")
}

async fn config_handler<C: SchedulingClient + 'static>(
    State(state): State<AppState<C>>,
) -> Result<Json<Value>, StatusCode> {
    let config = state.widget.config().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    serde_json::to_value(&*config)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{slot_at, FakeClient};
    use axum::body::{to_bytes, Body};
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tower::ServiceExt;

    async fn hosted() -> Arc<HostedWidget<FakeClient>> {
        let t = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let client = FakeClient::with_slots(vec![slot_at(t, 60), slot_at(t, 0)]);
        let widget = Arc::new(BookingWidget::new(client, ViewState::new("#bookingjs")));
        widget
            .init(json!({
                "app": "demo",
                "email": "host@example.com",
                "api_token": "secret",
                "name": "Doc",
                "localization": { "timezone": "UTC", "show_timezone_helper": false }
            }))
            .await
            .unwrap();
        widget
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_page_lists_sorted_slots() {
        let app = router(hosted().await);
        let resp = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        let first = html.find("slot +0m").unwrap();
        let second = html.find("slot +60m").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_width_query_resizes() {
        let widget = hosted().await;
        let app = router(Arc::clone(&widget));
        let resp = app.oneshot(get_req("/?width=320")).await.unwrap();
        let html = body_text(resp).await;
        assert!(html.contains("view-basicDay"));
        assert!(widget.with_view(|v| v.has_class("is-small")));
    }

    #[tokio::test]
    async fn test_select_and_book() {
        let widget = hosted().await;
        let app = router(Arc::clone(&widget));

        let resp = app.clone().oneshot(post("/slots/0")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(widget.with_view(|v| v.booking_page.is_some()));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/booking")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("name=Marty&email=marty%40example.com&comment=Hi"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(widget.client().count("create_booking"), 1);
        let payload = &widget.client().bookings()[0].payload;
        assert_eq!(payload["customer"]["comment"], json!("Hi"));

        let html = body_text(app.clone().oneshot(get_req("/")).await.unwrap()).await;
        assert!(html.contains("marty@example.com"));

        app.oneshot(post("/booking/close")).await.unwrap();
        assert_eq!(widget.client().count("find_availability"), 2);
        assert!(widget.with_view(|v| v.booking_page.is_none()));
    }

    #[tokio::test]
    async fn test_unknown_slot_is_not_found() {
        let app = router(hosted().await);
        let resp = app.oneshot(post("/slots/9")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_config_hides_token() {
        let app = router(hosted().await);
        let resp = app.oneshot(get_req("/config")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["email"], json!("host@example.com"));
        assert!(body.get("api_token").is_none());
        assert_eq!(body["booking_graph"], json!("instant"));
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let widget = hosted().await;
        let app = router(Arc::clone(&widget));
        let resp = app.oneshot(post("/refresh")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(widget.client().count("find_availability"), 2);
    }
}
