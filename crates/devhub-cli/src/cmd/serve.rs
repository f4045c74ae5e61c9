use crate::cmd::Context;

pub fn run(ctx: &Context, port: Option<u16>, open_browser: bool) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let port = port.unwrap_or(config.server.port);
    let workspace = ctx.workspace(&config)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        if let Err(e) = workspace.refresh_projects().await {
            tracing::warn!(error = %e, "initial project refresh failed");
        }

        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        tracing::info!(
            user = workspace.user_id(),
            memory = ctx.memory,
            deadline_ms = workspace.reconciler().deadline().as_millis() as u64,
            "serving workspace"
        );

        tokio::select! {
            res = devhub_server::serve_on(workspace, listener, open_browser) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
