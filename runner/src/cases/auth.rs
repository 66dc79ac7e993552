use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::support::{AuthSession, CaseContext, Request};
use crate::registry::Case;

/// Login, refresh and `me` for the admin user.
pub struct Auth;

#[async_trait]
impl Case for Auth {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.both_initialized(self.name()).await? {
            return Ok(());
        }

        let login = ctx.login("auth.login").await?;
        login.same_shape(
            "auth.login",
            &["$.access_token", "$.refresh_token", "$.user.id"],
        )?;
        let sessions = login.try_map(|_, response| AuthSession::from_login(response))?;

        let refresh = ctx
            .each("auth.refresh", |side| {
                Request::post(
                    "/api/auth/refresh",
                    json!({"refresh_token": sessions[side].refresh_token}),
                )
            })
            .await?;
        refresh.same_status("auth.refresh")?;
        refresh.same_shape("auth.refresh", &["$.access_token"])?;

        let me = ctx
            .both_authed("auth.me", &sessions, Request::get("/api/auth/me"))
            .await?;
        me.same_status("auth.me")?;
        me.same_shape("auth.me", &["$.id", "$.created_at"])
    }
}
