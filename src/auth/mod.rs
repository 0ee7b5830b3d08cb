use axum::Router;

use crate::{config::Variant, state::AppState};

mod dto;
pub mod extractors;
pub mod google;
pub mod handlers;
pub mod password;
pub mod services;
pub mod session;

pub fn router(variant: Variant) -> Router<AppState> {
    match variant {
        Variant::Basic => handlers::basic_routes(),
        Variant::Extended => handlers::extended_routes(),
    }
}
