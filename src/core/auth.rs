//! Acting-user context
//!
//! An [`AuthProvider`] turns request headers into an [`AuthContext`], which
//! decides admin gating and the time zone used for temporal filter values.

use axum::http::HeaderMap;
use chrono::FixedOffset;
use uuid::Uuid;

use super::context::RequestContext;
use super::error::ApiError;
use super::field::parse_utc_offset;
use super::operation::Operation;

/// Who is making the request
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    /// Authenticated user
    User {
        user_id: Uuid,
        time_zone: Option<FixedOffset>,
        roles: Vec<String>,
    },

    /// Administrator
    Admin {
        admin_id: Uuid,
        time_zone: Option<FixedOffset>,
    },

    /// No authentication (public access)
    #[default]
    Anonymous,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            AuthContext::Admin { admin_id, .. } => Some(*admin_id),
            AuthContext::Anonymous => None,
        }
    }

    pub fn time_zone(&self) -> Option<FixedOffset> {
        match self {
            AuthContext::User { time_zone, .. } | AuthContext::Admin { time_zone, .. } => {
                *time_zone
            }
            AuthContext::Anonymous => None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            AuthContext::User { roles, .. } => roles.iter().any(|r| r == role),
            AuthContext::Admin { .. } => true,
            AuthContext::Anonymous => false,
        }
    }

    /// Request context for `operation` acted by this user
    ///
    /// Admin content is only rendered when explicitly requested and the
    /// actor is an admin.
    pub fn request_context(&self, operation: Operation, wants_admin_content: bool) -> RequestContext {
        let admin = self.is_admin();
        let mut ctx = RequestContext::new(operation)
            .with_admin(admin)
            .with_admin_user(admin)
            .with_admin_content(admin && wants_admin_content);
        if let Some(zone) = self.time_zone() {
            ctx = ctx.with_time_zone(zone);
        }
        ctx
    }
}

/// Extracts the acting user from request headers
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, ApiError>;
}

/// Treats every request as anonymous
pub struct NoAuthProvider;

impl AuthProvider for NoAuthProvider {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<AuthContext, ApiError> {
        Ok(AuthContext::Anonymous)
    }
}

/// Trusts identity headers set by an upstream gateway
///
/// - `x-user-id`: user uuid; absent means anonymous
/// - `x-user-roles`: comma-separated roles; `admin` makes the user an admin
/// - `x-time-zone`: UTC offset such as `+02:00`
pub struct HeaderAuthProvider;

impl HeaderAuthProvider {
    pub const USER_ID: &'static str = "x-user-id";
    pub const ROLES: &'static str = "x-user-roles";
    pub const TIME_ZONE: &'static str = "x-time-zone";
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

impl AuthProvider for HeaderAuthProvider {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
        let Some(raw_id) = header(headers, Self::USER_ID) else {
            return Ok(AuthContext::Anonymous);
        };
        let user_id = Uuid::parse_str(raw_id)
            .map_err(|_| ApiError::bad_request(format!("invalid {} header", Self::USER_ID)))?;

        let time_zone = match header(headers, Self::TIME_ZONE) {
            Some(raw) => Some(parse_utc_offset(raw).ok_or_else(|| {
                ApiError::bad_request(format!("invalid {} header", Self::TIME_ZONE))
            })?),
            None => None,
        };

        let roles: Vec<String> = header(headers, Self::ROLES)
            .map(|raw| {
                raw.split(',')
                    .map(|r| r.trim().to_lowercase())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if roles.iter().any(|r| r == "admin") {
            return Ok(AuthContext::Admin {
                admin_id: user_id,
                time_zone,
            });
        }
        Ok(AuthContext::User {
            user_id,
            time_zone,
            roles,
        })
    }
}
