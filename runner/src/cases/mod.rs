//! Scenario suite: one case per API surface, in execution order.

mod accounts;
mod auth;
mod bootstrap;
mod funds;
mod health;
mod nav_history;
mod positions;
mod positions_history;
mod sources;
mod sources_accuracy;
pub mod support;
mod users;
mod watchlists;

pub use support::{AuthSession, CaseContext, Pair, Request, Side};

use crate::registry::Registry;

/// The fixed, ordered registry of every case.
pub fn registry() -> Registry {
    Registry::new(vec![
        Box::new(health::Health),
        Box::new(bootstrap::Bootstrap),
        Box::new(auth::Auth),
        Box::new(users::Users),
        Box::new(sources::Sources),
        Box::new(sources_accuracy::SourcesAccuracy),
        Box::new(funds::Funds),
        Box::new(accounts::Accounts),
        Box::new(positions::Positions),
        Box::new(positions_history::PositionsHistory),
        Box::new(watchlists::Watchlists),
        Box::new(nav_history::NavHistory),
    ])
}
