use crate::apply::{apply_plan, ApplyResult};
use crate::planner::{generate_plan, PlanOptions, RenamePlan, RenameStats};
use crate::report::{RunContext, RunStage};
use crate::resolver::DateResolver;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub plan: PlanOptions,
    /// Without this the run stops after naming and touches nothing.
    pub apply: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub plan: RenamePlan,
    pub applied: Option<ApplyResult>,
}

impl RunSummary {
    pub fn stats(&self) -> &RenameStats {
        &self.plan.stats
    }
}

/// One complete run over a folder: header, plan, optional rename, statistics.
pub fn rename_folder(
    options: &RunOptions,
    resolver: &DateResolver,
    ctx: &mut RunContext<'_>,
) -> Result<RunSummary> {
    ctx.log("File Rename Log");
    ctx.log("=".repeat(40));
    ctx.log("");

    ctx.stage(RunStage::Launching);
    ctx.log("Step 1:  Launching rename run...");
    ctx.log(format!("Timezone being used:  {}", resolver.zone().name()));

    let plan = generate_plan(&options.plan, resolver, ctx)?;

    let applied = if options.apply {
        Some(apply_plan(&plan, ctx)?)
    } else {
        ctx.log("Dry run:  no files were renamed.");
        None
    };

    ctx.stage(RunStage::OutputStatistics);
    ctx.log("Step 6:  Output Statistics...");
    ctx.log(format!("Total files processed:  {}", plan.stats.total_files));
    ctx.log(format!(
        "...Of which, the number of files using a fallback timestamp:  {}",
        plan.stats.fallback_count
    ));
    if let Some(result) = &applied {
        ctx.log(format!(
            "Renamed:  {}   Unchanged:  {}   Failed:  {}",
            result.applied, result.unchanged, result.failed
        ));
    }
    ctx.log("File Renaming Complete.");
    ctx.stage(RunStage::Complete);

    Ok(RunSummary { plan, applied })
}
