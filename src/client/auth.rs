// ── Client: Authentication ─────────────────────────────────────────────────
//
// The /auth/* endpoints plus the token persistence seam.
//
// Token storage is an external collaborator: the engine only needs
// get/set/clear semantics, so it talks to a `TokenStore` trait and ships an
// in-memory implementation. A frontend backs the trait with whatever
// durable store it has (browser local storage, OS keychain, a file).
//
// A 401 from any endpoint — not just these — clears the store and fires the
// forced-logout hooks registered on `ApiClient`; that side is wired in
// `client::http`.

use log::info;
use parking_lot::RwLock;

use crate::atoms::error::ClientResult;
use crate::atoms::types::{LoginRequest, LoginResponse, TokenValidation, UserProfile};
use crate::client::http::ApiClient;

// ── Token store seam ───────────────────────────────────────────────────────

/// Minimal contract for bearer-token persistence. Implementations must be
/// cheap to call — `get` runs on every request.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn clear(&self);
}

/// Process-lifetime token store. The default; suitable for tests and for
/// embedders that re-login on startup.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn set(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.write() = None;
    }
}

// ── Auth client ────────────────────────────────────────────────────────────

/// Typed wrapper over the /auth/* endpoints.
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
}

impl AuthClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Exchange credentials (or the anonymous flag) for a bearer token.
    /// On success the token is stored and attached to every later request.
    pub async fn login(&self, request: &LoginRequest) -> ClientResult<LoginResponse> {
        let response: LoginResponse = self.api.post_json("/auth/login", request).await?;
        self.api.token_store().set(&response.token);
        info!("[auth] logged in as {} (anonymous={})", response.user_id, response.is_anonymous);
        Ok(response)
    }

    /// Fetch the current user profile.
    pub async fn me(&self) -> ClientResult<UserProfile> {
        self.api.get_json("/auth/me").await
    }

    /// Rotate the bearer token. The new token replaces the stored one.
    pub async fn refresh(&self) -> ClientResult<LoginResponse> {
        let response: LoginResponse = self.api.post_json("/auth/refresh", &()).await?;
        self.api.token_store().set(&response.token);
        Ok(response)
    }

    /// Check token validity without side effects.
    pub async fn validate(&self) -> ClientResult<TokenValidation> {
        self.api.get_json("/auth/validate").await
    }

    /// Invalidate the server-side session, then clear local credentials.
    /// Local state is cleared even if the server call fails — the user
    /// asked to be logged out.
    pub async fn logout(&self) -> ClientResult<()> {
        let result = self.api.post_ok("/auth/logout", &()).await;
        self.api.forced_logout();
        info!("[auth] logged out");
        result
    }

    pub fn has_token(&self) -> bool {
        self.api.token_store().get().is_some()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
