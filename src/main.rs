mod api;
mod cli;
mod config;
mod dashboard;
mod error;
mod fingerprint;
mod health;
mod jobs;
mod mappings;
mod models;
mod pipeline;
mod render;
mod scheduler;
mod sync;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use api::{DashboardApi, HttpDashboardApi};
use cli::{Cli, Commands, DemoAction, MappingAction, ReportAction, TaskAction, WebhookAction};
use config::Config;
use dashboard::Dashboard;
use mappings::MappingService;
use models::{ConnectionStatus, DemoRequest, JobKind, ReportRequest, SortKey, StatusFilter, ViewState};
use render::{print_groups, print_tasks, JobEvent, TerminalSink};
use sync::required_id;

fn init_logging() {
    let filter = EnvFilter::try_from_env("DASHSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    init_logging();
    let config = Config::from_env()?.with_base_url(cli.base_url)?;
    let api: Arc<dyn DashboardApi> = Arc::new(HttpDashboardApi::new(&config)?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command.unwrap_or(Commands::Watch), config, api))
}

async fn run(command: Commands, config: Config, api: Arc<dyn DashboardApi>) -> Result<()> {
    match command {
        Commands::Watch => {
            let terminal = Arc::new(TerminalSink::default());
            let dashboard = Dashboard::new(api, terminal.clone(), &config);
            dashboard::run_watch(dashboard, terminal).await?;
        }
        Commands::Tasks { filter, search, sort } => {
            let filter: StatusFilter = filter.parse()?;
            let view = ViewState::new(filter, &search, SortKey::parse(&sort));
            let tasks = api.list_tasks().await.context("Failed to fetch tasks")?;
            let visible = pipeline::render_list(&tasks, &view);
            print_tasks(&visible);
            println!("\n{} of {} task(s)", visible.len(), tasks.len());
        }
        Commands::Groups => {
            let tasks = api.list_tasks().await.context("Failed to fetch tasks")?;
            print_groups(&pipeline::group_by_client(&tasks));
        }
        Commands::Task { action } => run_task(action, api.as_ref()).await?,
        Commands::Report { action } => run_report(action, api, &config).await?,
        Commands::Demo { action } => run_demo(action, api, &config).await?,
        Commands::Mappings { action } => run_mappings(action, api).await?,
        Commands::Health => {
            let status = match api.health().await {
                Ok(report) => ConnectionStatus::from_wire(&report.integration_status),
                Err(error) => {
                    log::debug!("health check failed: {error}");
                    ConnectionStatus::Offline
                }
            };
            println!("🔌 connection: {status}");
            if status != ConnectionStatus::Connected {
                bail!("integration is {status}");
            }
        }
        Commands::Webhook { action } => {
            let enabled = match action {
                WebhookAction::Status => api.webhook_enabled().await?,
                WebhookAction::Enable => {
                    api.set_webhook_enabled(true).await?;
                    true
                }
                WebhookAction::Disable => {
                    api.set_webhook_enabled(false).await?;
                    false
                }
                WebhookAction::Toggle => api.toggle_webhook().await?,
            };
            println!("Webhook is {}", if enabled { "enabled" } else { "disabled" });
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}

async fn run_task(action: TaskAction, api: &dyn DashboardApi) -> Result<()> {
    match action {
        TaskAction::Get { task_id } => {
            let task_id = required_id(&task_id)?;
            let task = api
                .get_task(task_id)
                .await
                .with_context(|| format!("Failed to fetch task {task_id}"))?;
            print_tasks(std::slice::from_ref(&task));
            if let Some(description) = task.description.filter(|text| !text.trim().is_empty()) {
                println!("\n{description}");
            }
        }
        TaskAction::Import { task_id } => {
            let task = api.import_task(required_id(&task_id)?).await?;
            println!("✅ Imported '{}' ({})", task.task_name, task.task_id);
        }
        TaskAction::Delete { task_id } => {
            let task_id = required_id(&task_id)?;
            api.delete_task(task_id).await?;
            println!("✅ Deleted task {task_id}");
        }
        TaskAction::Describe { task_id, text } => {
            let task_id = required_id(&task_id)?;
            api.update_description(task_id, text.trim()).await?;
            println!("✅ Updated description of {task_id}");
        }
    }
    Ok(())
}

async fn run_report(action: ReportAction, api: Arc<dyn DashboardApi>, config: &Config) -> Result<()> {
    match action {
        ReportAction::Run { kind, url } => {
            let kind: JobKind = kind.parse()?;
            let dashboard = Dashboard::new(api, Arc::new(TerminalSink::default()), config);
            let outcome = match dashboard.jobs.start_job(kind, ReportRequest { url }).await {
                Ok(job_id) => follow_job(&dashboard, &job_id).await,
                Err(error) => Err(error.into()),
            };
            dashboard.teardown();
            outcome?;
        }
        ReportAction::Schedules => {
            let schedules = api.list_schedules().await?;
            if schedules.is_empty() {
                println!("No scheduled reports.");
            }
            for schedule in schedules {
                println!(
                    "{:<12} {:<12} {:<10} {:<8} {}",
                    schedule.id,
                    schedule.kind,
                    schedule.frequency.as_deref().unwrap_or("-"),
                    if schedule.enabled { "on" } else { "off" },
                    schedule.url
                );
            }
        }
        ReportAction::Unschedule { id } => {
            let id = id.trim();
            if id.is_empty() {
                bail!("schedule id cannot be empty");
            }
            api.delete_schedule(id).await?;
            println!("✅ Removed schedule {id}");
        }
    }
    Ok(())
}

async fn run_demo(action: DemoAction, api: Arc<dyn DashboardApi>, config: &Config) -> Result<()> {
    match action {
        DemoAction::Create {
            business_name,
            color,
            template,
            repo,
            slug,
        } => {
            let request = DemoRequest {
                business_name,
                primary_color: color,
                template_id: template,
                github_repo_url: repo,
                slug,
            };
            let dashboard = Dashboard::new(api, Arc::new(TerminalSink::default()), config);
            let outcome = match dashboard.jobs.start_demo(request).await {
                Ok(slug) => follow_job(&dashboard, &slug).await,
                Err(error) => Err(error.into()),
            };
            dashboard.teardown();
            outcome?;
        }
        DemoAction::Status { slug } => {
            let slug = required_id(&slug)?;
            let report = api
                .demo_status(slug)
                .await
                .with_context(|| format!("Failed to fetch demo {slug}"))?;
            let event = JobEvent {
                job_id: slug.to_owned(),
                kind: JobKind::Demo,
                status: report.status,
                message: report.error,
                progress: report.progress,
            };
            println!("🔄 {}", event.summary());
        }
        DemoAction::CheckSlug { slug } => {
            let slug = slug.trim();
            jobs::validate_slug(slug)?;
            if api.slug_available(slug).await? {
                println!("✅ {slug} is available");
            } else {
                bail!("slug {slug} is already taken");
            }
        }
    }
    Ok(())
}

/// Waits for a tracked job's verdict; Ctrl-C stops waiting but leaves the
/// job running on the server.
async fn follow_job(dashboard: &Dashboard, job_id: &str) -> Result<()> {
    let Some(done) = dashboard.jobs.subscribe(job_id) else {
        return Ok(());
    };
    let event = tokio::select! {
        event = done => event.with_context(|| format!("stopped tracking job {job_id}"))?,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopped waiting for {job_id}; the job keeps running on the server.");
            return Ok(());
        }
    };
    match jobs::terminal_error(&event) {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

async fn run_mappings(action: MappingAction, api: Arc<dyn DashboardApi>) -> Result<()> {
    let mappings = MappingService::new(api);
    match action {
        MappingAction::List => {
            let set = mappings.list().await?;
            println!("Patterns:");
            for mapping in &set.patterns {
                println!("  {:<32} -> {}", mapping.pattern, mapping.client_name);
            }
            println!("Tasks:");
            for mapping in &set.tasks {
                println!("  {:<32} -> {}", mapping.task_id, mapping.client_name);
            }
        }
        MappingAction::AddPattern { pattern, client } => {
            let saved = mappings.add_pattern(&pattern, &client).await?;
            println!("✅ {} -> {}", saved.pattern, saved.client_name);
        }
        MappingAction::AddTask { task_id, client } => {
            let saved = mappings.add_task(&task_id, &client).await?;
            println!("✅ {} -> {}", saved.task_id, saved.client_name);
        }
        MappingAction::RemovePattern { pattern } => {
            mappings.remove_pattern(&pattern).await?;
            println!("✅ Removed pattern {}", pattern.trim());
        }
        MappingAction::RemoveTask { task_id } => {
            mappings.remove_task(&task_id).await?;
            println!("✅ Removed mapping for {}", task_id.trim());
        }
        MappingAction::Resolve { task_id, task_name } => {
            let set = mappings.list().await?;
            println!(
                "{}",
                set.resolve(task_id.trim(), &task_name)
                    .unwrap_or(pipeline::UNKNOWN_CLIENT)
            );
        }
    }
    Ok(())
}
