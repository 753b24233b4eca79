use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use boxoffice_tickets::{Actor, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// The authenticated caller, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id.clone(), self.role)
    }
}

impl From<Claims> for Identity {
    /// Unrecognised roles get no elevated rights.
    fn from(claims: Claims) -> Self {
        Self {
            role: claims.role.parse().unwrap_or(Role::User),
            user_id: claims.sub,
        }
    }
}

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated("missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthenticated("expected a Bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthenticated(format!("invalid token: {}", e)))?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::Unauthenticated("token has no subject".to_string()));
    }

    req.extensions_mut().insert(Identity::from(token_data.claims));
    Ok(next.run(req).await)
}
