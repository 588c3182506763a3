use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use larder_core::db::Database;
use larder_core::deduction::{CookError, CookReport};
use larder_core::models::{
    InventoryRecord, MatchType, NewIngredientLine, NewInventoryRecord, NewRecipe,
    NewTaxonomyNode, NodeKind, RecipeDetail, RecipeSummary, SearchOptions, SubstitutionEdge,
    TaxonomyNode,
};
use larder_core::ranking::{CoverageStats, RecipeMatch};
use larder_core::service::PantryService;
use larder_core::store::PantryStore;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Deserialize)]
struct SearchQuery {
    user_id: i64,
    max_missing: Option<usize>,
    cuisine: Option<String>,
    difficulty: Option<String>,
    query: Option<String>,
    assume_pantry_staples: Option<bool>,
}

#[derive(Deserialize)]
struct CoverageQuery {
    user_id: i64,
    assume_pantry_staples: Option<bool>,
}

#[derive(Deserialize)]
struct CookRequest {
    user_id: i64,
    #[serde(default = "default_servings")]
    servings: f64,
}

fn default_servings() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct CreateIngredientRequest {
    taxonomy_id: Option<i64>,
    display_name: String,
    quantity: Option<f64>,
    unit: Option<String>,
    #[serde(default)]
    optional: bool,
}

#[derive(Deserialize)]
struct CreateRecipeRequest {
    title: String,
    cuisine: Option<String>,
    difficulty: Option<String>,
    prep_minutes: Option<i64>,
    cook_minutes: Option<i64>,
    #[serde(default = "default_servings")]
    servings: f64,
    #[serde(default = "default_public")]
    is_public: bool,
    #[serde(default)]
    ingredients: Vec<CreateIngredientRequest>,
}

fn default_public() -> bool {
    true
}

#[derive(Deserialize)]
struct CreateInventoryRequest {
    user_id: i64,
    taxonomy_id: i64,
    quantity: f64,
    #[serde(default = "default_unit")]
    unit: String,
    #[serde(default = "default_location")]
    location: String,
    expires_at: Option<String>,
}

fn default_unit() -> String {
    "pcs".to_string()
}

fn default_location() -> String {
    "pantry".to_string()
}

#[derive(Deserialize)]
struct TaxonomyQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct CreateTaxonomyRequest {
    name: String,
    kind: String,
    parent_id: Option<i64>,
    #[serde(default)]
    is_pantry_staple: bool,
}

#[derive(Deserialize)]
struct SubstitutionQuery {
    required_id: Option<i64>,
}

#[derive(Deserialize)]
struct CreateSubstitutionRequest {
    required_id: i64,
    substitute_id: i64,
    match_type: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// A 500 whose message is safe to show; the cause is logged, not returned.
    Failed(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Failed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<CookError> for ApiError {
    fn from(err: CookError) -> Self {
        match err {
            CookError::InvalidServings(_) => Self::BadRequest(err.to_string()),
            CookError::RecipeNotFound(_) => Self::NotFound(err.to_string()),
            CookError::InventoryUpdate(_) => {
                let message = err.to_string();
                tracing::error!("cook failed: {:#}", anyhow::Error::new(err));
                Self::Failed(message)
            }
        }
    }
}

fn bad_request(err: anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Matching handlers ---

async fn search_recipes(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<RecipeMatch>>, ApiError> {
    let options = SearchOptions {
        max_missing: params.max_missing,
        cuisine: params.cuisine,
        difficulty: params.difficulty,
        query: params.query,
        assume_pantry_staples: params.assume_pantry_staples,
    };
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let defaults = db.search_defaults().context("database error")?;
    let matches = PantryService::new(&*db)
        .with_defaults(defaults)
        .smart_search(params.user_id, &options)
        .context("search failed")?;
    Ok(Json(matches))
}

async fn recipe_stats(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<CoverageStats>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let defaults = db.search_defaults().context("database error")?;
    let stats = PantryService::new(&*db)
        .with_defaults(defaults)
        .coverage_stats(params.user_id)
        .context("failed to compute coverage stats")?;
    Ok(Json(stats))
}

async fn recipe_coverage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<CoverageQuery>,
) -> Result<Json<RecipeMatch>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let defaults = db.search_defaults().context("database error")?;
    let coverage = PantryService::new(&*db)
        .with_defaults(defaults)
        .recipe_coverage(params.user_id, id, params.assume_pantry_staples)
        .context("failed to score recipe")?;
    coverage
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))
}

async fn cook_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CookRequest>,
) -> Result<Json<CookReport>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let report = PantryService::new(&*db).mark_cooked(req.user_id, id, req.servings)?;
    Ok(Json(report))
}

// --- Recipe handlers ---

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeDetail>), ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    let recipe = db
        .create_recipe(&NewRecipe {
            title: req.title,
            cuisine: req.cuisine,
            difficulty: req.difficulty,
            prep_minutes: req.prep_minutes,
            cook_minutes: req.cook_minutes,
            servings: req.servings,
            is_public: req.is_public,
        })
        .map_err(bad_request)?;

    for ing in req.ingredients {
        let line = NewIngredientLine {
            taxonomy_id: ing.taxonomy_id,
            display_name: ing.display_name,
            quantity: ing.quantity,
            unit: ing.unit,
            is_optional: ing.optional,
        };
        if let Err(e) = db.add_ingredient_line(recipe.id, &line) {
            db.delete_recipe(recipe.id)
                .context("failed to discard partial recipe")?;
            return Err(bad_request(e));
        }
    }

    let detail = db
        .get_recipe_detail(recipe.id)
        .context("failed to get recipe detail")?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn list_recipes(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecipeSummary>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let recipes = db.list_recipes(false).context("database error")?;
    Ok(Json(recipes))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let detail = db
        .get_recipe_detail(id)
        .map_err(|_| ApiError::NotFound(format!("Recipe {id} not found")))?;
    Ok(Json(detail))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db.delete_recipe(id).context("failed to delete recipe")? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Recipe {id} not found")))
    }
}

// --- Inventory handlers ---

async fn list_inventory(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Vec<InventoryRecord>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let scope = db.resolve_scope(params.user_id).context("database error")?;
    let records = db.list_inventory(&scope).context("database error")?;
    Ok(Json(records))
}

async fn create_inventory(
    State(state): State<AppState>,
    Json(req): Json<CreateInventoryRequest>,
) -> Result<(StatusCode, Json<InventoryRecord>), ApiError> {
    let expires_at = req
        .expires_at
        .as_deref()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| ApiError::BadRequest(format!("Invalid date '{d}'. Use YYYY-MM-DD")))
        })
        .transpose()?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let record = db
        .add_inventory(&NewInventoryRecord {
            user_id: req.user_id,
            taxonomy_id: req.taxonomy_id,
            quantity: req.quantity,
            unit: req.unit,
            location: req.location,
            expires_at,
        })
        .map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn delete_inventory(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db.remove_inventory(id).context("database error")? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Inventory record {id} not found")))
    }
}

// --- Taxonomy handlers ---

async fn list_taxonomy(
    State(state): State<AppState>,
    Query(params): Query<TaxonomyQuery>,
) -> Result<Json<Vec<TaxonomyNode>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let nodes = match params.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => db.search_taxonomy(q),
        _ => db.list_taxonomy_children(None),
    }
    .context("database error")?;
    Ok(Json(nodes))
}

async fn create_taxonomy(
    State(state): State<AppState>,
    Json(req): Json<CreateTaxonomyRequest>,
) -> Result<(StatusCode, Json<TaxonomyNode>), ApiError> {
    let kind = NodeKind::parse(&req.kind).map_err(bad_request)?;
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let node = db
        .add_taxonomy_node(&NewTaxonomyNode {
            name: req.name,
            kind,
            parent_id: req.parent_id,
            is_pantry_staple: req.is_pantry_staple,
        })
        .map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn get_taxonomy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TaxonomyNode>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    db.get_taxonomy_node(id)
        .context("database error")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Taxonomy node {id} not found")))
}

async fn taxonomy_children(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TaxonomyNode>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db.get_taxonomy_node(id).context("database error")?.is_none() {
        return Err(ApiError::NotFound(format!("Taxonomy node {id} not found")));
    }
    let children = db.list_taxonomy_children(Some(id)).context("database error")?;
    Ok(Json(children))
}

// --- Substitution handlers ---

async fn list_substitutions(
    State(state): State<AppState>,
    Query(params): Query<SubstitutionQuery>,
) -> Result<Json<Vec<SubstitutionEdge>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let edges = db
        .list_substitutions(params.required_id)
        .context("database error")?;
    Ok(Json(edges))
}

async fn create_substitution(
    State(state): State<AppState>,
    Json(req): Json<CreateSubstitutionRequest>,
) -> Result<(StatusCode, Json<SubstitutionEdge>), ApiError> {
    let match_type = MatchType::parse(&req.match_type).map_err(bad_request)?;
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let edge = db
        .add_substitution(req.required_id, req.substitute_id, match_type)
        .map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(edge)))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes/search", get(search_recipes))
        .route("/api/recipes/stats", get(recipe_stats))
        .route("/api/recipes", post(create_recipe).get(list_recipes))
        .route("/api/recipes/{id}", get(get_recipe).delete(delete_recipe))
        .route("/api/recipes/{id}/coverage", get(recipe_coverage))
        .route("/api/recipes/{id}/cook", post(cook_recipe))
        .route("/api/inventory", get(list_inventory).post(create_inventory))
        .route("/api/inventory/{id}", delete(delete_inventory))
        .route("/api/taxonomy", get(list_taxonomy).post(create_taxonomy))
        .route("/api/taxonomy/{id}", get(get_taxonomy))
        .route("/api/taxonomy/{id}/children", get(taxonomy_children))
        .route(
            "/api/substitutions",
            get(list_substitutions).post(create_substitution),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        tracing::warn!("authentication disabled (--no-auth), the API is open to anyone");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        tracing::warn!(
            "listening on {bind} with no authentication, any device on the network can use the API"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!(%bind, port, "server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
