//! Flow controller: runs the current stage, then advances and persists the
//! stage pointer.

use crate::error::{FlowError, Result};
use crate::flow::params::FlowParams;
use crate::flow::stages::{AfterCommit, StageContext, run_stage};
use crate::status::{FlowStatus, Stage, StatusStore};
use crate::system::command::CommandSpec;

/// Drives the first-boot flow from whatever stage was last persisted.
pub struct FlowController {
    store: StatusStore,
    status: FlowStatus,
    ctx: StageContext,
}

impl FlowController {
    /// Resume from the status persisted in `store` (a fresh status if none).
    pub async fn load(store: StatusStore, ctx: StageContext) -> Self {
        let status = store.load().await;
        tracing::info!(
            stage = %status.stage(),
            username = status.username.as_deref().unwrap_or("-"),
            "Onboarding status loaded"
        );
        Self { store, status, ctx }
    }

    pub fn current_stage(&self) -> Stage {
        self.status.stage()
    }

    pub fn status(&self) -> &FlowStatus {
        &self.status
    }

    /// Run the current stage. On success the next stage is persisted before
    /// this returns; on failure the stage pointer does not move.
    pub async fn step(&mut self, params: &FlowParams) -> Result<Stage> {
        let stage = self.status.stage();
        if stage.is_terminal() {
            return Err(FlowError::AlreadyComplete.into());
        }

        tracing::info!(%stage, skip = params.skip, "Running stage");
        let outcome = match run_stage(stage, &self.ctx, params, &mut self.status, &self.store).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(%stage, error = %e, "Stage failed");
                return Err(e);
            }
        };

        // Memory only moves once the disk has.
        let mut advanced = self.status.clone();
        let next = advanced.advance()?;
        self.store.save(&mut advanced).await?;
        self.status = advanced;
        tracing::info!(from = %stage, to = %next, "Stage complete");

        for effect in outcome.after_commit {
            self.apply(effect).await;
        }
        Ok(next)
    }

    /// Step until the terminal stage is reached or a stage fails.
    pub async fn run(&mut self, params: &FlowParams) -> Result<()> {
        if self.current_stage().is_terminal() {
            tracing::info!("Onboarding already complete, nothing to do");
            return Ok(());
        }
        while !self.current_stage().is_terminal() {
            self.step(params).await?;
        }
        tracing::info!(username = ?self.status.username, "Onboarding finished");
        Ok(())
    }

    async fn apply(&self, effect: AfterCommit) {
        match effect {
            AfterCommit::StartService(service) => {
                let spec = CommandSpec::new("systemctl").args(["start", service.as_str()]);
                match self.ctx.runner.run(&spec).await {
                    Ok(output) if output.success() => {
                        tracing::info!(%service, "Service started");
                    }
                    Ok(output) => {
                        tracing::warn!(%service, reason = %output.failure_reason(), "Service did not start");
                    }
                    Err(e) => tracing::warn!(%service, error = %e, "Service did not start"),
                }
            }
        }
    }
}
