use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::support::{CaseContext, Request};
use crate::registry::Case;

const WRONG_KEY: &str = "WRONG_KEY_FOR_TEST";

/// Wrong-key bootstrap calls against two uninitialised systems.
pub struct Bootstrap;

#[async_trait]
impl Case for Bootstrap {
    fn name(&self) -> &'static str {
        "bootstrap"
    }

    async fn run(&self, ctx: &CaseContext) -> Result<()> {
        let flags = ctx.initialized_flags().await?;
        if flags.golden != Value::Bool(false) || flags.candidate != Value::Bool(false) {
            bail!(
                "bootstrap requires both targets to be uninitialized: golden={} candidate={}; \
                 reset the configuration volume and retry",
                flags.golden,
                flags.candidate
            );
        }

        let verify = ctx
            .both(
                "bootstrap.verify",
                Request::post("/api/admin/bootstrap/verify", json!({"bootstrap_key": WRONG_KEY})),
            )
            .await?;
        verify.same_status("bootstrap.verify")?;
        verify.same_shape("bootstrap.verify", &[])?;

        let initialize = ctx
            .both(
                "bootstrap.initialize",
                Request::post(
                    "/api/admin/bootstrap/initialize",
                    json!({
                        "bootstrap_key": WRONG_KEY,
                        "admin_username": ctx.admin_username,
                        "admin_password": ctx.admin_password,
                        "allow_register": false,
                    }),
                ),
            )
            .await?;
        initialize.same_status("bootstrap.initialize")?;
        initialize.same_shape("bootstrap.initialize", &[])
    }
}
