//! Goal CRUD and onboarding endpoints.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::session::require_account;
use crate::error::{DatabaseError, Error};
use crate::goals::model::{ExperienceStage, Goal, GoalCategory, validate_goal_text};
use crate::plan::generator::PlanGenerator;
use crate::plan::model::validate_plan;
use crate::store::Store;

/// Shared state for goal routes.
#[derive(Clone)]
pub struct GoalRouteState {
    pub store: Arc<dyn Store>,
    pub generator: Arc<dyn PlanGenerator>,
}

fn goal_not_found(id: Uuid) -> Error {
    DatabaseError::NotFound {
        entity: "goal".into(),
        id: id.to_string(),
    }
    .into()
}

/// Load a goal and check it belongs to the given account. Foreign goals
/// read as not-found so ids cannot be probed.
async fn load_owned_goal(
    store: &Arc<dyn Store>,
    account_id: Uuid,
    goal_id: Uuid,
) -> Result<Goal, Error> {
    let goal = store
        .get_goal(goal_id)
        .await?
        .ok_or_else(|| goal_not_found(goal_id))?;
    if goal.account_id != account_id {
        return Err(goal_not_found(goal_id));
    }
    Ok(goal)
}

#[derive(Deserialize)]
struct CreateGoalRequest {
    category: GoalCategory,
    goal_text: String,
    stage: ExperienceStage,
}

/// POST /api/goals
///
/// Creates a goal and synthesizes its full email plan in one transaction.
/// Nothing persists if generation or validation fails. For a first goal
/// this also completes onboarding and schedules the first send.
async fn create_goal(
    State(state): State<GoalRouteState>,
    headers: HeaderMap,
    Json(request): Json<CreateGoalRequest>,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    let goal_text = validate_goal_text(&request.goal_text)?;

    let goal = Goal::new(account.id, request.category, &goal_text, request.stage);

    let drafts = state
        .generator
        .generate(request.category, &goal_text, request.stage)
        .await?;
    let entries = validate_plan(goal.id, drafts)?;

    state.store.insert_goal_with_plan(&goal, &entries).await?;

    if !account.onboarding_complete {
        // First send goes out on the next cycle.
        state.store.complete_onboarding(account.id, Utc::now()).await?;
        info!(account_id = %account.id, goal_id = %goal.id, "Onboarding complete");
    } else {
        info!(account_id = %account.id, goal_id = %goal.id, "Goal created");
    }

    Ok((StatusCode::CREATED, Json(goal)))
}

/// GET /api/goals
async fn list_goals(
    State(state): State<GoalRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    let goals = state.store.list_goals(account.id).await?;
    Ok(Json(goals))
}

/// GET /api/goals/{id}
///
/// Returns the goal with its full plan, including sent-at stamps.
async fn get_goal(
    State(state): State<GoalRouteState>,
    headers: HeaderMap,
    Path(goal_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    let goal = load_owned_goal(&state.store, account.id, goal_id).await?;
    let plan = state.store.list_plan_entries(goal.id).await?;
    Ok(Json(serde_json::json!({ "goal": goal, "plan": plan })))
}

#[derive(Deserialize)]
struct UpdateGoalRequest {
    category: Option<GoalCategory>,
    goal_text: Option<String>,
    stage: Option<ExperienceStage>,
}

/// PATCH /api/goals/{id}
///
/// Edits a goal's fields. Terminal goals reject edits with 409; their plan
/// and send history stay frozen.
async fn update_goal(
    State(state): State<GoalRouteState>,
    headers: HeaderMap,
    Path(goal_id): Path<Uuid>,
    Json(request): Json<UpdateGoalRequest>,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    let mut goal = load_owned_goal(&state.store, account.id, goal_id).await?;
    goal.ensure_mutable()?;

    if let Some(category) = request.category {
        goal.category = category;
    }
    if let Some(text) = &request.goal_text {
        goal.goal_text = validate_goal_text(text)?;
    }
    if let Some(stage) = request.stage {
        goal.stage = stage;
    }
    goal.updated_at = Utc::now();

    state.store.update_goal(&goal).await?;
    Ok(Json(goal))
}

/// POST /api/goals/{id}/complete
async fn complete_goal(
    State(state): State<GoalRouteState>,
    headers: HeaderMap,
    Path(goal_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    finish(state, headers, goal_id, true).await
}

/// POST /api/goals/{id}/cancel
async fn cancel_goal(
    State(state): State<GoalRouteState>,
    headers: HeaderMap,
    Path(goal_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    finish(state, headers, goal_id, false).await
}

/// Move a goal to a terminal state. Already-terminal goals conflict; the
/// transition is otherwise one-way.
async fn finish(
    state: GoalRouteState,
    headers: HeaderMap,
    goal_id: Uuid,
    completed: bool,
) -> Result<Json<Goal>, Error> {
    let account = require_account(&state.store, &headers).await?;
    let goal = load_owned_goal(&state.store, account.id, goal_id).await?;
    goal.ensure_mutable()?;

    state.store.finish_goal(goal.id, completed, Utc::now()).await?;
    let goal = state
        .store
        .get_goal(goal.id)
        .await?
        .ok_or_else(|| goal_not_found(goal_id))?;
    info!(goal_id = %goal.id, completed, "Goal closed");
    Ok(Json(goal))
}

/// Build the goal REST routes.
pub fn goal_routes(state: GoalRouteState) -> Router {
    Router::new()
        .route("/api/goals", post(create_goal).get(list_goals))
        .route("/api/goals/{id}", get(get_goal).patch(update_goal))
        .route("/api/goals/{id}/complete", post(complete_goal))
        .route("/api/goals/{id}/cancel", post(cancel_goal))
        .with_state(state)
}
