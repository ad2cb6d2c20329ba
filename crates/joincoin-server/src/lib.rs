pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::middleware::require_admin;
use crate::routes::{admin, gate, orders, users};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/users", post(users::register))
        .route("/users/{user_id}", get(users::get_user))
        .route("/users/{user_id}/orders", get(orders::owner_orders))
        .route("/users/{user_id}/gate", get(gate::check))
        .route("/users/{user_id}/gate/confirm", post(gate::confirm))
        .route("/collectors/{collector_id}/orders", get(orders::collector_orders))
        .route("/orders", post(orders::place_order))
        .route("/joins", post(orders::record_join))
        .route("/coin-orders", post(orders::create_coin_order))
        .route("/referrals", post(users::register_referral))
        .route("/welcome-message", get(users::welcome_message));

    let admin_routes = Router::new()
        .route("/admin/coin-orders/pending", get(admin::pending_coin_orders))
        .route("/admin/coin-orders/{order_id}/resolve", post(admin::resolve_coin_order))
        .route("/admin/users/{user_id}/ban", post(admin::ban))
        .route("/admin/users/{user_id}/unban", post(admin::unban))
        .route("/admin/users/{user_id}/warn", post(admin::warn))
        .route(
            "/admin/forced-channels",
            get(admin::list_forced_channels).post(admin::add_forced_channel),
        )
        .route("/admin/forced-channels/{channel}", delete(admin::remove_forced_channel))
        .route("/admin/transactions", get(admin::transactions))
        .route("/admin/welcome-message", put(admin::set_welcome_message))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
