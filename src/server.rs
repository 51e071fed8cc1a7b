use crate::config::AppConfig;
use crate::interaction::{HitIndex, HoverTracker, TooltipState};
use crate::render::Scene;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

// The map is inlined so pointer positions can be converted to SVG user space.
const HOST_PAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>United States Educational Attainment</title>
<style>
  body { font-family: sans-serif; }
  #map { position: relative; display: inline-block; }
  #tooltip {
    position: absolute; pointer-events: none; padding: 4px 8px;
    background: rgba(255, 255, 204, 0.9); border: 1px solid #999; font-size: 12px;
  }
</style>
</head>
<body>
<h1 id="title">United States Educational Attainment</h1>
<div id="description">Percentage of adults age 25 and older with a bachelor's degree or higher (2010-2014)</div>
<div id="map">
<!-- map -->
<div id="tooltip" style="visibility: hidden"></div>
</div>
<script>
  const svg = document.querySelector("#map svg");
  const tooltip = document.getElementById("tooltip");
  let pending = null;

  function apply(state) {
    tooltip.style.visibility = state.visible ? "visible" : "hidden";
    tooltip.textContent = state.content || "";
    if (state.education === null) {
      tooltip.removeAttribute("data-education");
    } else {
      tooltip.setAttribute("data-education", state.education);
    }
    tooltip.style.left = state.left + "px";
    tooltip.style.top = state.top + "px";
  }

  svg.addEventListener("pointermove", (event) => {
    const p = new DOMPoint(event.clientX, event.clientY).matrixTransform(svg.getScreenCTM().inverse());
    if (pending) pending.abort();
    pending = new AbortController();
    fetch(`/api/hover?x=${p.x}&y=${p.y}`, { signal: pending.signal })
      .then((r) => r.json())
      .then(apply)
      .catch(() => {});
  });

  svg.addEventListener("pointerleave", () => {
    if (pending) pending.abort();
    apply({ visible: false, content: null, education: null, left: 0, top: 0 });
  });
</script>
</body>
</html>
"##;

pub struct AppState {
    pub scene: Scene,
    pub hits: HitIndex,
    pub svg: String,
    pub page: String,
}

impl AppState {
    pub fn new(scene: Scene) -> Self {
        let hits = HitIndex::build(&scene);
        let svg = scene.to_svg();
        let page = HOST_PAGE.replace("<!-- map -->", &svg);
        Self {
            scene,
            hits,
            svg,
            page,
        }
    }
}

#[derive(Deserialize)]
pub struct HoverParams {
    x: f64,
    y: f64,
}

pub fn router(config: &AppConfig, state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/map.svg", get(svg_handler))
        .route("/api/hover", get(hover_handler))
        .fallback_service(ServeDir::new(&config.output.dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, scene: Scene) -> Result<()> {
    tracing::info!("Building hit index for hover API...");
    let state = Arc::new(AppState::new(scene));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    tracing::info!("Starting server on http://{}", addr);

    let app = router(&config, state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn svg_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/svg+xml")], state.svg.clone())
}

/// Tooltip as it looks with the pointer resting at `(x, y)`.
async fn hover_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HoverParams>,
) -> Json<TooltipState> {
    let mut tracker = HoverTracker::new(&state.scene, &state.hits);
    Json(tracker.pointer_at(params.x, params.y).clone())
}
