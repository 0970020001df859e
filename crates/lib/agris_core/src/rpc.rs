//! Wire types for the user service's internal RPC surface.
//!
//! The catalog service calls these over HTTP/JSON:
//!
//! | Method | Path |
//! |---|---|
//! | `Authenticate` | `POST /rpc/user.UserService/Authenticate` |
//! | `GetCurrentUserInfo` | `POST /rpc/user.UserService/GetCurrentUserInfo` (bearer) |

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::auth::Role;

pub const AUTHENTICATE_PATH: &str = "/rpc/user.UserService/Authenticate";
pub const CURRENT_USER_INFO_PATH: &str = "/rpc/user.UserService/GetCurrentUserInfo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub token: String,
}

/// `valid = false` covers bad, expired or orphaned tokens; transport-level
/// errors are reserved for failures of the service itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl AuthenticateResponse {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            user_id: None,
            role: None,
        }
    }

    pub fn valid(user_id: Uuid, role: Role) -> Self {
        Self {
            valid: true,
            user_id: Some(user_id),
            role: Some(role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}
