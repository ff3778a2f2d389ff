//! # gossip-counter-http
//!
//! The HTTP face of a counter node, served with Axum.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /` | current total |
//! | `GET /inc?amount=N` | total after adding `N` |
//! | `GET /verbose` | full replica state as JSON |
//! | `GET /cluster` | known members as JSON |
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gossip_counter::prelude::*;
//! use gossip_counter::membership::{Member, Membership};
//!
//! struct Alone(Member);
//!
//! impl Membership for Alone {
//!     fn local_member(&self) -> Member { self.0.clone() }
//!     fn members(&self) -> Vec<Member> { vec![self.0.clone()] }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = Arc::new(SyncCoordinator::new(GCounter::new("solo")));
//!     let me = Member { name: "solo".into(), addr: ([127, 0, 0, 1], 0).into(), meta: vec![] };
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4001").await.unwrap();
//!     gossip_counter_http::serve(listener, coordinator, Arc::new(Alone(me)), std::future::pending())
//!         .await
//!         .unwrap();
//! }
//! ```

mod api;

use std::future::Future;
use std::sync::Arc;

use axum::{routing::get, Router};
use gossip_counter::membership::Membership;
use gossip_counter::SyncCoordinator;
use tokio::net::TcpListener;

/// Shared application state for Axum handlers.
pub(crate) struct AppState {
    pub coordinator: Arc<SyncCoordinator>,
    pub membership: Arc<dyn Membership>,
}

/// Build the router without binding anything.
pub fn router(coordinator: Arc<SyncCoordinator>, membership: Arc<dyn Membership>) -> Router {
    let state = Arc::new(AppState {
        coordinator,
        membership,
    });

    Router::new()
        .route("/", get(api::total))
        .route("/inc", get(api::increment))
        .route("/verbose", get(api::verbose))
        .route("/cluster", get(api::cluster))
        .with_state(state)
}

/// Serve the counter on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    coordinator: Arc<SyncCoordinator>,
    membership: Arc<dyn Membership>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(coordinator, membership);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "http listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
