// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run the HTTP API

use anyhow::{Context, Result};
use std::sync::Arc;

use docqa::server::{self, AppState};
use docqa::utils::UPLOADS_DIR;
use docqa::watch::ArtifactWatcher;

use super::AppContext;

/// Run the serve command
pub fn run(ctx: &AppContext, bind: Option<&str>, watch: bool) -> Result<()> {
    // The gateway's blocking HTTP client is created and finally dropped out
    // here, outside the async runtime.
    let orchestrator = ctx.orchestrator(true, None)?;
    let pipeline = Arc::new(ctx.pipeline(orchestrator.clone(), true)?);

    let _watch = if watch {
        Some(ArtifactWatcher::new(orchestrator.clone()).spawn()?)
    } else {
        None
    };

    let state = AppState::new(
        pipeline.clone(),
        ctx.config.index.ingest_mode(),
        ctx.index_dir.join(UPLOADS_DIR),
    );
    let app = server::router(state, ctx.config.server.max_upload_bytes());
    let bind = bind.unwrap_or_else(|| ctx.config.server.bind()).to_string();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(server::serve(&bind, app));
    drop(runtime);
    drop(pipeline);
    result
}
