use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};

use gophkeeper_core::proto::authorization_service_server::AuthorizationService;
use gophkeeper_core::proto::{AuthRequest, AuthResponse};

use crate::auth::Authorizer;

const OPERATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Unary registration and login endpoints. This service is the bootstrap
/// path: the auth middleware lets it through without a token.
pub struct AuthService {
    auth: Arc<Authorizer>,
}

impl AuthService {
    pub fn new(auth: Arc<Authorizer>) -> Self {
        Self { auth }
    }
}

#[tonic::async_trait]
impl AuthorizationService for AuthService {
    async fn register(
        &self,
        request: Request<AuthRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let (login, password) = match (req.login, req.password) {
            (Some(l), Some(p)) => (l, p),
            _ => return Err(Status::invalid_argument("login and password are required")),
        };
        if req.salt.is_empty() {
            return Err(Status::invalid_argument("key salt is required"));
        }

        let auth = tokio::time::timeout(
            OPERATION_TIMEOUT,
            self.auth.register(&login, &password, &req.salt),
        )
        .await
        .map_err(|_| Status::deadline_exceeded("registration timed out"))?
        .map_err(Status::from)?;

        Ok(Response::new(AuthResponse {
            user_id: Some(auth.user_id),
            token: Some(auth.token),
            refresh_token: Some(auth.refresh_token),
            salt: Vec::new(),
        }))
    }

    async fn authorize(
        &self,
        request: Request<AuthRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let (login, password) = match (req.login, req.password) {
            (Some(l), Some(p)) => (l, p),
            _ => return Err(Status::invalid_argument("login and password are required")),
        };

        let auth = tokio::time::timeout(
            OPERATION_TIMEOUT,
            self.auth.authorize(&login, &password),
        )
        .await
        .map_err(|_| Status::deadline_exceeded("authorization timed out"))?
        .map_err(Status::from)?;

        Ok(Response::new(AuthResponse {
            user_id: Some(auth.user_id),
            token: Some(auth.token),
            refresh_token: Some(auth.refresh_token),
            salt: auth.key_salt,
        }))
    }
}
