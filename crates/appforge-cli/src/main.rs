//! AppForge CLI
//!
//! The `appforge` command turns a natural-language request into a native
//! Apple-platform app.
//!
//! ## Commands
//!
//! - `generate`: Run the route/analyze/plan/build/fix/recover pipeline
//! - `history`: Inspect or clear the project conversation history
//! - `providers`: List registered backend providers and their capabilities
//! - `integrations`: Set up, inspect and remove per-app provider credentials

use anyhow::{Context, Result};
use appforge_build::{CommandCompiler, CommandSpec, ProcessAgent, Toolchain};
use appforge_core::pipeline::phases::RouteSource;
use appforge_core::{
    BuildRequest, ForgeConfig, Hints, IntegrationConfig, IntegrationInput, IntegrationService,
    Operation, PipelineController, PipelineDeps, PipelineReport, Platform, ProjectStore,
    ProviderRegistry, Role,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "appforge")]
#[command(author = "AppForge Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate native Apple-platform apps from a prompt", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Project directory holding sources and `.appforge/` state
    #[arg(short = 'C', long, global = true, env = "APPFORGE_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate (or edit) an app from a prompt
    Generate(GenerateArgs),

    /// Conversation history for this project
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Registered backend providers
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },

    /// Per-app provider integrations
    Integrations {
        #[command(subcommand)]
        action: IntegrationAction,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// What to build
    prompt: String,

    /// App name (otherwise chosen during analysis)
    #[arg(short = 'n', long)]
    app_name: Option<String>,

    /// Target platform, skipping platform routing
    #[arg(short, long, value_parser = parse_platform)]
    platform: Option<Platform>,

    /// Operation (create, edit or fix), skipping operation routing
    #[arg(long, value_parser = parse_operation)]
    operation: Option<Operation>,

    /// Agent command, spoken to as JSON over stdin/stdout
    #[arg(long, env = "APPFORGE_AGENT_COMMAND")]
    agent_command: String,

    /// Timeout for a single agent call, in seconds
    #[arg(long, env = "APPFORGE_AGENT_TIMEOUT_SECS", default_value = "600")]
    agent_timeout: u64,

    /// Build toolchain: swift, xcodebuild or cargo
    #[arg(long, env = "APPFORGE_TOOLCHAIN", default_value = "swift")]
    toolchain: String,

    /// Timeout for a single build, in seconds
    #[arg(long, env = "APPFORGE_BUILD_TIMEOUT_SECS", default_value = "900")]
    build_timeout: u64,

    /// Maximum compiles per build-fix run
    #[arg(long, env = "APPFORGE_MAX_FIX_ITERATIONS")]
    max_fix_iterations: Option<u32>,

    /// Retries per phase before the pipeline gives up
    #[arg(long, env = "APPFORGE_PHASE_RETRY_CEILING")]
    retry_ceiling: Option<u32>,

    /// Do not create backend tables, buckets or publications
    #[arg(long)]
    no_provision: bool,

    /// Print the full pipeline report as JSON
    #[arg(long)]
    report_json: bool,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Show every entry, oldest first
    List,

    /// Show the last entries
    Recent {
        /// Number of entries
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Remove every entry
    Clear,
}

#[derive(Subcommand)]
enum ProvidersAction {
    /// List providers and what they offer
    List,
}

#[derive(Subcommand)]
enum IntegrationAction {
    /// Validate credentials and store them for an app
    Setup {
        /// Provider id (see `providers list`)
        provider: String,

        /// App name
        app: String,

        /// Setup field as key=value (repeatable)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Show a stored integration with secrets masked
    Show { provider: String, app: String },

    /// Delete a stored integration
    Remove { provider: String, app: String },

    /// Re-check a stored integration
    Revalidate { provider: String, app: String },

    /// List stored integrations
    List {
        /// Only this app
        #[arg(long)]
        app: Option<String>,
    },
}

/// Long-lived objects shared by every command.
struct AppContext {
    project_dir: PathBuf,
    store: ProjectStore,
    registry: Arc<ProviderRegistry>,
    config: ForgeConfig,
}

impl AppContext {
    fn open(project_dir: &Path) -> Result<Self> {
        let config = ForgeConfig::from_env();
        let registry =
            ProviderRegistry::with_defaults(&config).context("Failed to register providers")?;
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            store: ProjectStore::open(project_dir),
            registry: Arc::new(registry),
            config,
        })
    }

    fn integrations(&self) -> IntegrationService<'_> {
        IntegrationService::new(&self.registry, &self.store)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    appforge_core::init_tracing(cli.json, level);

    let ctx = AppContext::open(&cli.project_dir)?;

    match cli.command {
        Commands::Generate(args) => cmd_generate(&ctx, args).await,
        Commands::History { action } => match action {
            HistoryAction::List => cmd_history_list(&ctx, None),
            HistoryAction::Recent { count } => cmd_history_list(&ctx, Some(count)),
            HistoryAction::Clear => cmd_history_clear(&ctx),
        },
        Commands::Providers { action } => match action {
            ProvidersAction::List => cmd_providers_list(&ctx),
        },
        Commands::Integrations { action } => match action {
            IntegrationAction::Setup {
                provider,
                app,
                fields,
            } => cmd_integration_setup(&ctx, &provider, &app, fields),
            IntegrationAction::Show { provider, app } => cmd_integration_show(&ctx, &provider, &app),
            IntegrationAction::Remove { provider, app } => {
                cmd_integration_remove(&ctx, &provider, &app)
            }
            IntegrationAction::Revalidate { provider, app } => {
                cmd_integration_revalidate(&ctx, &provider, &app)
            }
            IntegrationAction::List { app } => cmd_integration_list(&ctx, app.as_deref()),
        },
    }
}

fn parse_platform(s: &str) -> std::result::Result<Platform, String> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).map_err(|_| {
        let names: Vec<&str> = Platform::all().iter().map(Platform::as_str).collect();
        format!("unknown platform '{s}' (expected one of {})", names.join(", "))
    })
}

fn parse_operation(s: &str) -> std::result::Result<Operation, String> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase()))
        .map_err(|_| format!("unknown operation '{s}' (expected create, edit or fix)"))
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

/// Run the pipeline against the project directory
async fn cmd_generate(ctx: &AppContext, args: GenerateArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(max) = args.max_fix_iterations {
        config = config.with_max_fix_iterations(max);
    }
    if let Some(ceiling) = args.retry_ceiling {
        config = config.with_phase_retry_ceiling(ceiling);
    }
    if args.no_provision {
        config = config.with_auto_provision(false);
    }

    let toolchain: Toolchain = args.toolchain.parse()?;
    let agent = Arc::new(ProcessAgent::new(
        CommandSpec::parse("agent", &args.agent_command, args.agent_timeout)?
            .in_dir(&ctx.project_dir),
    ));
    let compiler = CommandCompiler::new(
        CommandSpec::from_toolchain(toolchain, args.build_timeout).in_dir(&ctx.project_dir),
    );

    let deps = PipelineDeps {
        registry: ctx.registry.clone(),
        store: ctx.store.clone(),
        reasoner: agent.clone(),
        coder: agent,
        compiler: Arc::new(compiler),
        config,
    };

    let mut request = BuildRequest::new(args.prompt.clone()).with_hints(Hints {
        platform: args.platform,
        operation: args.operation,
    });
    if let Some(name) = &args.app_name {
        request = request.with_app_name(name.clone());
    }

    info!(project = %ctx.project_dir.display(), toolchain = toolchain.name(), "Starting generation");
    let report = PipelineController::new(deps).run(request).await;
    record_exchange(&ctx.store, &args.prompt, &report.summary());

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    if report.succeeded() {
        Ok(())
    } else {
        anyhow::bail!("Generation failed")
    }
}

/// Append the request and its outcome to the history log. Failures are logged, not fatal.
fn record_exchange(store: &ProjectStore, prompt: &str, outcome: &str) {
    for (role, content) in [(Role::User, prompt), (Role::Assistant, outcome)] {
        if let Err(e) = store.history().append(role, content) {
            tracing::warn!(error = %e, "Failed to record history");
        }
    }
}

fn render_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    let status = if report.succeeded() { "✓ DONE" } else { "✗ FAILED" };
    out.push_str(&format!("Request: {}\n", report.request_id));
    out.push_str(&format!("Status: {status}\n"));

    if let Some(route) = report.ledger.route() {
        let source = match route.source {
            RouteSource::Hint => "hint",
            RouteSource::Rules => "keywords",
            RouteSource::Agent => "agent",
        };
        out.push_str(&format!("Platform: {} (from {source})\n", route.platform));
    }
    if let Some(build) = report.ledger.build() {
        out.push_str(&format!("Units generated: {}\n", build.generated.len()));
        for summary in &build.provisioning {
            if !summary.result.tables_created.is_empty() {
                out.push_str(&format!(
                    "Provisioned {}: {}\n",
                    summary.provider_id,
                    summary.result.tables_created.join(", ")
                ));
            }
        }
    }
    if let Some(log) = report.ledger.fix() {
        out.push_str(&format!("Build: {}\n", log.summary()));
    }
    if let Some(recovery) = report.ledger.recovery() {
        if let Some(log) = &recovery.log {
            out.push_str(&format!(
                "Recovered {} unit(s): {}\n",
                recovery.targets.len(),
                log.summary()
            ));
        }
    }
    out.push_str(&format!("Duration: {}ms\n", report.duration_ms));

    if !report.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for warning in &report.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }
    if let Some((phase, reason)) = report.failure() {
        out.push_str(&format!("Failed during {phase}: {reason}\n"));
    }
    out
}

/// Print history entries, optionally only the last `count`
fn cmd_history_list(ctx: &AppContext, count: Option<usize>) -> Result<()> {
    let history = ctx.store.history();
    let entries = match count {
        Some(n) => history.recent(n)?,
        None => history.list()?,
    };
    if entries.is_empty() {
        println!("No history.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{} {:>9}: {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.role,
            entry.content
        );
    }
    Ok(())
}

fn cmd_history_clear(ctx: &AppContext) -> Result<()> {
    ctx.store.history().clear()?;
    println!("History cleared.");
    Ok(())
}

fn cmd_providers_list(ctx: &AppContext) -> Result<()> {
    for descriptor in ctx.registry.all() {
        let provider = ctx.registry.lookup(descriptor.id.as_str())?;
        let capabilities: Vec<&str> = [
            ("setup", provider.as_setup().is_some()),
            ("prompt", provider.as_prompt_contributor().is_some()),
            ("mcp", provider.as_mcp_server().is_some()),
            ("provision", provider.as_provisioner().is_some()),
        ]
        .into_iter()
        .filter_map(|(name, offered)| offered.then_some(name))
        .collect();

        println!("{} - {}", descriptor.id, descriptor.display_name);
        println!("  {}", descriptor.description);
        println!("  Capabilities: {}", capabilities.join(", "));
        if let Some(setup) = provider.as_setup() {
            println!("  Setup fields: {}", setup.required_fields().join(", "));
        }
    }
    Ok(())
}

fn cmd_integration_setup(
    ctx: &AppContext,
    provider: &str,
    app: &str,
    fields: Vec<(String, String)>,
) -> Result<()> {
    let input = fields
        .into_iter()
        .fold(IntegrationInput::new(), |input, (k, v)| input.with(k, v));
    let config = ctx
        .integrations()
        .setup(provider, app, &input)
        .with_context(|| format!("Failed to set up {provider} for {app}"))?;
    println!("✓ {} configured for {}", config.provider_id, config.app_name);
    print!("{}", render_config(&config));
    Ok(())
}

fn cmd_integration_show(ctx: &AppContext, provider: &str, app: &str) -> Result<()> {
    match ctx.integrations().show(provider, app)? {
        Some(config) => print!("{}", render_config(&config)),
        None => println!("No {provider} integration for {app}."),
    }
    Ok(())
}

fn cmd_integration_remove(ctx: &AppContext, provider: &str, app: &str) -> Result<()> {
    if ctx.integrations().remove(provider, app)? {
        println!("Removed {provider} integration for {app}.");
    } else {
        println!("No {provider} integration for {app}.");
    }
    Ok(())
}

fn cmd_integration_revalidate(ctx: &AppContext, provider: &str, app: &str) -> Result<()> {
    let config = ctx
        .integrations()
        .revalidate(provider, app)
        .with_context(|| format!("{provider} integration for {app} is no longer valid"))?;
    println!("✓ {} integration for {} is valid", config.provider_id, config.app_name);
    Ok(())
}

fn cmd_integration_list(ctx: &AppContext, app: Option<&str>) -> Result<()> {
    let configs = ctx.integrations().list(app)?;
    if configs.is_empty() {
        println!("No integrations.");
        return Ok(());
    }
    for config in configs {
        let status = if config.validated_at.is_some() { "✓" } else { "✗" };
        println!(
            "  {status} {}/{} {}",
            config.provider_id, config.app_name, config.project_url
        );
    }
    Ok(())
}

fn render_config(config: &IntegrationConfig) -> String {
    let validated = config
        .validated_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "  URL: {}\n  Project ref: {}\n  Key: {}\n  Access token: {}\n  Validated: {validated}\n",
        config.project_url,
        config.project_ref.as_deref().unwrap_or("-"),
        mask(&config.anon_key),
        if config.pat.is_some() { "set" } else { "not set" },
    )
}

/// Keep the first four characters of a secret.
fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn context(dir: &Path) -> AppContext {
        AppContext {
            project_dir: dir.to_path_buf(),
            store: ProjectStore::open(dir),
            registry: Arc::new(ProviderRegistry::with_defaults(&ForgeConfig::default()).unwrap()),
            config: ForgeConfig::default(),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_args_parse() {
        let cli = Cli::try_parse_from([
            "appforge",
            "generate",
            "a habit tracker",
            "--platform",
            "watchOS",
            "--agent-command",
            "my-agent --json",
            "--no-provision",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.platform, Some(Platform::Watchos));
                assert_eq!(args.toolchain, "swift");
                assert!(args.no_provision);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_platform("iOS").unwrap(), Platform::Ios);
        assert!(parse_platform("android").unwrap_err().contains("visionos"));
        assert_eq!(parse_operation("Fix").unwrap(), Operation::Fix);
        assert_eq!(
            parse_field("pat=sbp_a=b").unwrap(),
            ("pat".to_string(), "sbp_a=b".to_string())
        );
        assert!(parse_field("no-equals").is_err());
        assert!(parse_field("=value").is_err());
    }

    #[test]
    fn test_mask_hides_secrets() {
        assert_eq!(mask("appl_abcdef"), "appl…");
        assert_eq!(mask("abc"), "****");
    }

    #[test]
    fn test_integration_commands_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        cmd_integration_setup(
            &ctx,
            "revenuecat",
            "Habits",
            vec![
                ("project_id".into(), "proj1a2b".into()),
                ("api_key".into(), "appl_public".into()),
                ("secret_key".into(), "sk_secret".into()),
            ],
        )
        .unwrap();

        let stored = ctx.integrations().list(Some("Habits")).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].validated_at.is_some());
        assert!(!render_config(&stored[0]).contains("sk_secret"));

        cmd_integration_revalidate(&ctx, "revenuecat", "Habits").unwrap();
        cmd_integration_remove(&ctx, "revenuecat", "Habits").unwrap();
        assert!(ctx.integrations().list(None).unwrap().is_empty());
    }

    #[test]
    fn test_setup_rejects_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(cmd_integration_setup(&ctx, "firebase", "Habits", vec![]).is_err());
    }

    #[test]
    fn test_exchange_is_recorded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        record_exchange(&ctx.store, "a habit tracker", "Habits: 4 units generated");

        let entries = ctx.store.history().list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[1].role, Role::Assistant);
        assert!(entries[0].created_at <= entries[1].created_at);

        cmd_history_clear(&ctx).unwrap();
        assert!(ctx.store.history().list().unwrap().is_empty());
    }
}
