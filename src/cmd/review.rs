//! Review commands: `gatekeeper review`, `gatekeeper context`, `gatekeeper parse`.

use anyhow::{Context, Result, bail};
use gatekeeper::adapters::{
    DesktopNotifier, GitDiffProvider, JsonPlanStore, LogNotifier, ProcessSessionSpawner,
    TokioShellRunner,
};
use gatekeeper::config::GatekeeperConfig;
use gatekeeper::ports::{Notifier, PlanSource};
use gatekeeper::review::{
    ContextBuilder, KeywordInterpreter, Orchestrator, OutputInterpreter, ReviewTracker,
    StructuredInterpreter, TaskReview, format_prompt,
};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

fn context_builder() -> ContextBuilder {
    ContextBuilder::new(Arc::new(GitDiffProvider::new()), Arc::new(TokioShellRunner::new()))
}

fn print_review(review: &TaskReview) {
    let result = review.result();
    let styled = if result.is_approved() {
        console::style(result.to_string()).green().bold()
    } else if result.is_rejected() {
        console::style(result.to_string()).red().bold()
    } else {
        console::style(result.to_string()).yellow().bold()
    };

    println!();
    println!(
        "{} {} (task {}, attempt {})",
        result.emoji(),
        styled,
        review.task_id(),
        review.attempt()
    );
    if !review.summary().is_empty() {
        println!("  {}", review.summary());
    }
    if review.is_blocking() {
        println!("  {}", console::style("Blocking: needs human review").red());
    }
    if !review.issues().is_empty() {
        println!();
        println!("Issues:");
        for issue in review.issues() {
            println!("  - {}", issue);
        }
    }
    println!();
}

pub async fn cmd_review(project_dir: &Path, task_id: &str, quiet: bool) -> Result<()> {
    let config = GatekeeperConfig::new(project_dir)?;
    for warning in config.toml.validate() {
        tracing::warn!("Config: {}", warning);
    }

    let project = config.project();
    let plan = Arc::new(JsonPlanStore::new(project.clone(), config.plan_file()));
    let notifier: Arc<dyn Notifier> = if quiet {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DesktopNotifier::new())
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(ProcessSessionSpawner::new()),
        notifier,
        plan.clone(),
    ));
    let tracker = ReviewTracker::new(plan.clone(), Arc::new(context_builder()), orchestrator);

    println!(
        "{} task {} with '{}'...",
        console::style("Reviewing").bold().cyan(),
        task_id,
        project.effective_review().command
    );

    let review = tracker.start(task_id, &project.id).await?;
    print_review(&review);

    if let Some(task) = plan.task(&project.id, task_id).await {
        println!(
            "Task {} is now {} (revisions: {})",
            task.id,
            console::style(task.status).bold(),
            task.revision_count
        );
    }

    Ok(())
}

pub async fn cmd_context(project_dir: &Path, task_id: &str) -> Result<()> {
    let config = GatekeeperConfig::new(project_dir)?;
    let project = config.project();
    let plan = JsonPlanStore::new(project.clone(), config.plan_file());

    let Some(task) = plan.task(&project.id, task_id).await else {
        bail!(
            "Task {} not found in {}",
            task_id,
            config.plan_file().display()
        );
    };

    let context = context_builder().build_default(&project, &task).await;
    for segment in context.degraded_segments() {
        tracing::warn!(segment, "Context segment degraded");
    }

    println!("{}", format_prompt(&context));
    Ok(())
}

pub fn cmd_parse(file: Option<&Path>, keywords_only: bool) -> Result<()> {
    let output = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read reviewer output from stdin")?;
            buf
        }
    };

    let interpreter: Box<dyn OutputInterpreter> = if keywords_only {
        Box::new(KeywordInterpreter)
    } else {
        Box::new(StructuredInterpreter::new())
    };

    let verdict = interpreter.interpret(&output);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
