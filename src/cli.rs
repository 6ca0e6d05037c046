use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Dashboard server base URL (overrides DASHSYNC_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Live dashboard with auto-refresh and an interactive prompt
    Watch,
    /// Fetch and list tasks once
    Tasks {
        /// State to show, or "all"
        #[arg(short, long, default_value = "all")]
        filter: String,
        /// Case-insensitive match on name, id, client and branch
        #[arg(short, long, default_value = "")]
        search: String,
        /// <field>_<asc|desc>, field one of updated, created, name, client, state
        #[arg(short = 'o', long, default_value = "updated_desc")]
        sort: String,
    },
    /// Open tasks grouped by client
    Groups,
    /// Single task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Performance and security reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
    /// Demo sites built from a template or repository
    Demo {
        #[command(subcommand)]
        action: DemoAction,
    },
    /// Client-name mapping rules
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },
    /// Check the server's integration connection once
    Health,
    /// Task-update webhook
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Show one task
    Get {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Import a task from the upstream tracker
    Import {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Delete a task
    Delete {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Replace a task's description
    Describe {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
        #[arg(value_name = "TEXT")]
        text: String,
    },
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Start a report job and wait for it to finish
    Run {
        /// performance or security
        #[arg(value_name = "KIND")]
        kind: String,
        #[arg(value_name = "URL")]
        url: String,
    },
    /// List scheduled reports
    Schedules,
    /// Remove a scheduled report
    Unschedule {
        #[arg(value_name = "SCHEDULE_ID")]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum DemoAction {
    /// Create a demo site and follow its build until it runs
    Create {
        #[arg(value_name = "BUSINESS_NAME")]
        business_name: String,
        /// Brand color as #rrggbb
        #[arg(short, long, value_name = "HEX")]
        color: String,
        /// Template to start from
        #[arg(short, long, value_name = "TEMPLATE_ID", required_unless_present = "repo")]
        template: Option<String>,
        /// Public repository to clone instead of a template
        #[arg(short, long, value_name = "URL", conflicts_with = "template")]
        repo: Option<String>,
        /// Slug to publish under; derived from the name when omitted
        #[arg(short, long)]
        slug: Option<String>,
    },
    /// Show a demo's build state once
    Status {
        #[arg(value_name = "SLUG")]
        slug: String,
    },
    /// Check whether a slug is free to use
    CheckSlug {
        #[arg(value_name = "SLUG")]
        slug: String,
    },
}

#[derive(Subcommand)]
pub enum MappingAction {
    /// List pattern and task mappings
    List,
    /// Map task names matching a regex to a client
    AddPattern {
        #[arg(value_name = "PATTERN")]
        pattern: String,
        #[arg(value_name = "CLIENT")]
        client: String,
    },
    /// Map one task to a client
    AddTask {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
        #[arg(value_name = "CLIENT")]
        client: String,
    },
    RemovePattern {
        #[arg(value_name = "PATTERN")]
        pattern: String,
    },
    RemoveTask {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Show which client a task would be assigned to
    Resolve {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
        #[arg(value_name = "TASK_NAME")]
        task_name: String,
    },
}

#[derive(Subcommand)]
pub enum WebhookAction {
    Status,
    Enable,
    Disable,
    /// Flip the current state
    Toggle,
}
