//! Session commands - login and logout

use anyhow::{Context, Result};
use jobflow_client::JobClient;

use crate::output::OutputContext;

/// Log in and store the session token
pub async fn login(
    client: &JobClient,
    username: &str,
    password: &str,
    ctx: &OutputContext,
) -> Result<()> {
    client
        .login(username, password)
        .await
        .context("Login failed")?;
    ctx.success(&format!("Logged in as {}", username));
    Ok(())
}

/// Forget the stored session token
pub fn logout(client: &JobClient, ctx: &OutputContext) -> Result<()> {
    if client.is_logged_in() {
        client.logout();
        ctx.success("Logged out");
    } else {
        ctx.info("Not logged in");
    }
    Ok(())
}
