use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::support::{unique_name, AuthSession, CaseContext, Request};
use crate::registry::Case;

const PASSWORD: &str = "password123";

/// Admin summary, then registration of a fresh user and a duplicate of it.
pub struct Users;

#[async_trait]
impl Case for Users {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        if !ctx.both_initialized(self.name()).await? {
            return Ok(());
        }

        let login = ctx.login("users.me.summary login").await?;
        if login.golden.status == 200 {
            let sessions = login.try_map(|_, response| AuthSession::from_login(response))?;
            let summary = ctx
                .both_authed(
                    "users.me.summary",
                    &sessions,
                    Request::get("/api/users/me/summary/"),
                )
                .await?;
            summary.same_status("users.me.summary")?;
            summary.same_shape("users.me.summary", &[])?;
        }

        let username = unique_name("newuser");
        let register = Request::post(
            "/api/users/register/",
            json!({
                "username": username,
                "password": PASSWORD,
                "password_confirm": PASSWORD,
            }),
        );

        let created = ctx.both("users.register", register.clone()).await?;
        if created.same_status("users.register")? != 201 {
            // Registration closed (403) or rejected (400): shapes only
            return created.same_shape("users.register", &[]);
        }
        created.same_shape(
            "users.register",
            &["$.access_token", "$.refresh_token", "$.user.id"],
        )?;

        let duplicate = ctx.both("users.register(duplicate)", register).await?;
        duplicate.same_status("users.register(duplicate)")?;
        duplicate.same_shape("users.register(duplicate)", &[])
    }
}
