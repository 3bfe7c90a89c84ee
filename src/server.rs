//! HTTP server assembly.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use secrecy::SecretString;
use tower_http::trace::TraceLayer;

use crate::account::routes::{AccountRouteState, account_routes};
use crate::auth::routes::{AuthRouteState, auth_routes};
use crate::billing::client::BillingClient;
use crate::billing::routes::{BillingRouteState, billing_routes};
use crate::email::Mailer;
use crate::goals::routes::{GoalRouteState, goal_routes};
use crate::plan::generator::PlanGenerator;
use crate::scheduler::cycle::DripCycle;
use crate::scheduler::routes::{CronRouteState, cron_routes};
use crate::store::Store;

/// Everything the route modules need, built once at startup.
pub struct AppDeps {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub billing: Arc<dyn BillingClient>,
    pub generator: Arc<dyn PlanGenerator>,
    pub cycle: Arc<DripCycle>,
    pub base_url: String,
    pub cron_secret: Option<String>,
    pub webhook_secret: SecretString,
}

async fn health() -> &'static str {
    "ok"
}

/// Build the full application router.
pub fn build_router(deps: AppDeps) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth_routes(AuthRouteState {
            store: deps.store.clone(),
            mailer: deps.mailer.clone(),
            base_url: deps.base_url.clone(),
        }))
        .merge(goal_routes(GoalRouteState {
            store: deps.store.clone(),
            generator: deps.generator.clone(),
        }))
        .merge(account_routes(AccountRouteState {
            store: deps.store.clone(),
            billing: deps.billing.clone(),
        }))
        .merge(billing_routes(BillingRouteState {
            store: deps.store.clone(),
            billing: deps.billing.clone(),
            webhook_secret: deps.webhook_secret.clone(),
        }))
        .merge(cron_routes(CronRouteState {
            cycle: deps.cycle.clone(),
            cron_secret: deps.cron_secret.clone(),
        }))
        .layer(TraceLayer::new_for_http())
}
