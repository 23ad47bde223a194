//! Supabase database provider.
//!
//! Offers every capability: setup, prompt contribution, a tool server and
//! provisioning through the Supabase management API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use appforge_state::IntegrationConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{
    qualified_tool, Credentials, IntegrationInput, McpServerCapability, McpServerDescriptor,
    PromptContribution, PromptContributor, PromptRequest, Provider, ProviderDescriptor,
    ProviderId, ProvisionRequest, ProvisionResult, Provisioner, SetupCapability, ToolTemplate,
};
use crate::domain::model::to_snake_case;
use crate::domain::{AuthMethod, ForgeError, ModelRef, Result};
use crate::obs;

pub const PROVIDER_ID: &str = "supabase";
pub const DEFAULT_API_BASE: &str = "https://api.supabase.com";
const MCP_PACKAGE: &str = "@supabase/mcp-server-supabase@latest";
const HOST_SUFFIX: &str = ".supabase.co";
const TOOLS: &[&str] = &[
    "list_tables",
    "execute_sql",
    "apply_migration",
    "get_project_url",
    "get_anon_key",
    "search_docs",
];

// ---------------------------------------------------------------------------
// Management API
// ---------------------------------------------------------------------------

/// The slice of the Supabase management API provisioning needs.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Names of the tables in the `public` schema.
    async fn list_tables(&self, token: &str, project_ref: &str) -> Result<Vec<String>>;

    /// Run one SQL batch against the project database.
    async fn run_sql(&self, token: &str, project_ref: &str, sql: &str) -> Result<()>;
}

/// `reqwest`-backed management API client.
pub struct HttpManagementApi {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct TableRow {
    table_name: String,
}

impl HttpManagementApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("appforge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ForgeError::Collaborator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn query(&self, token: &str, project_ref: &str, sql: &str) -> Result<serde_json::Value> {
        let url = format!("{}/v1/projects/{}/database/query", self.base_url, project_ref);
        debug!(project_ref = %project_ref, sql_len = sql.len(), "Running management query");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": sql }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ForgeError::Provisioning("management API request timed out".into())
                } else {
                    ForgeError::Provisioning(format!("management API request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Provisioning(format!(
                "management API returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ForgeError::Provisioning(format!("malformed management API response: {e}")))
    }
}

#[async_trait]
impl ManagementApi for HttpManagementApi {
    async fn list_tables(&self, token: &str, project_ref: &str) -> Result<Vec<String>> {
        let rows = self
            .query(
                token,
                project_ref,
                "select table_name from information_schema.tables where table_schema = 'public';",
            )
            .await?;
        let rows: Vec<TableRow> = serde_json::from_value(rows)?;
        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn run_sql(&self, token: &str, project_ref: &str, sql: &str) -> Result<()> {
        self.query(token, project_ref, sql).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct SupabaseProvider {
    descriptor: ProviderDescriptor,
    api: Arc<dyn ManagementApi>,
    retries: u32,
}

impl SupabaseProvider {
    /// Provider talking to the public management API.
    pub fn new() -> Result<Self> {
        Ok(Self::with_api(Arc::new(HttpManagementApi::new(DEFAULT_API_BASE)?)))
    }

    pub fn with_api(api: Arc<dyn ManagementApi>) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                id: ProviderId::from(PROVIDER_ID),
                display_name: "Supabase".into(),
                description: "Postgres database, auth, storage and realtime".into(),
                package: "https://github.com/supabase/supabase-swift".into(),
                tool: ToolTemplate {
                    command: "npx".into(),
                    args: vec!["-y".into(), MCP_PACKAGE.into()],
                },
                docs_package: Some(MCP_PACKAGE.into()),
            },
            api,
            retries: 2,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Run `op` up to `retries + 1` times, each attempt bounded by `deadline`.
    async fn attempt<T, F, Fut>(
        &self,
        what: &str,
        deadline: Instant,
        mut op: F,
    ) -> std::result::Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = String::new();
        for attempt in 0..=self.retries {
            match tokio::time::timeout_at(deadline, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    debug!(step = %what, attempt, error = %e, "Provisioning step failed");
                    last_error = e.to_string();
                }
                Err(_) => return Err(format!("{what}: deadline exceeded")),
            }
        }
        Err(format!(
            "{what}: {last_error} (gave up after {} attempts)",
            self.retries + 1
        ))
    }
}

impl Provider for SupabaseProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn as_setup(&self) -> Option<&dyn SetupCapability> {
        Some(self)
    }

    fn as_prompt_contributor(&self) -> Option<&dyn PromptContributor> {
        Some(self)
    }

    fn as_mcp_server(&self) -> Option<&dyn McpServerCapability> {
        Some(self)
    }

    fn as_provisioner(&self) -> Option<&dyn Provisioner> {
        Some(self)
    }
}

/// Host part of an `https://` URL, or an error naming what is wrong.
fn https_host(url: &str) -> Result<&str> {
    let rest = url.strip_prefix("https://").ok_or_else(|| {
        ForgeError::InvalidIntegration(format!("project URL must use https: {url}"))
    })?;
    let host = rest.split(['/', ':', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ForgeError::InvalidIntegration(format!("project URL has no host: {url}")));
    }
    Ok(host)
}

/// `abcd1234` for `abcd1234.supabase.co`.
fn project_ref_from_host(host: &str) -> Option<String> {
    host.strip_suffix(HOST_SUFFIX)
        .filter(|r| !r.is_empty() && r.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
}

impl SetupCapability for SupabaseProvider {
    fn required_fields(&self) -> &'static [&'static str] {
        &["project_url", "anon_key", "pat"]
    }

    fn validate(&self, app_name: &str, input: &IntegrationInput) -> Result<IntegrationConfig> {
        let project_url = input.require("project_url")?.trim_end_matches('/').to_string();
        let host = https_host(&project_url)?;
        let project_ref = input
            .get("project_ref")
            .map(str::to_string)
            .or_else(|| project_ref_from_host(host));

        Ok(IntegrationConfig {
            provider_id: PROVIDER_ID.to_string(),
            app_name: app_name.to_string(),
            anon_key: input.require("anon_key")?.to_string(),
            pat: Some(input.require("pat")?.to_string()),
            project_ref,
            project_url,
            validated_at: None,
        })
    }

    fn check(&self, config: &IntegrationConfig) -> Result<()> {
        https_host(&config.project_url)?;
        if config.anon_key.trim().is_empty() {
            return Err(ForgeError::InvalidIntegration("anon key is empty".into()));
        }
        if config.pat.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(ForgeError::InvalidIntegration("personal access token is missing".into()));
        }
        Ok(())
    }
}

fn column_type(type_name: &str) -> &'static str {
    match type_name.trim_end_matches('?') {
        "String" => "text",
        "Int" | "Int64" | "Int32" => "bigint",
        "Double" | "Float" | "CGFloat" | "Decimal" => "double precision",
        "Bool" => "boolean",
        "Date" => "timestamptz",
        "UUID" => "uuid",
        "Data" => "bytea",
        "URL" => "text",
        _ => "jsonb",
    }
}

/// Columns every generated table carries regardless of the model.
const IMPLICIT_COLUMNS: &[&str] = &["id", "created_at", "user_id"];

fn create_table_sql(model: &ModelRef, with_owner: bool) -> String {
    let table = model.table_name();
    let mut columns = vec![
        "id uuid primary key default gen_random_uuid()".to_string(),
        "created_at timestamptz not null default now()".to_string(),
    ];
    if with_owner {
        columns.push("user_id uuid not null default auth.uid() references auth.users(id) on delete cascade".into());
    }
    for property in &model.properties {
        let name = to_snake_case(&property.name);
        if name.is_empty() || IMPLICIT_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let nullability = if property.optional { "" } else { " not null" };
        columns.push(format!("{name} {}{nullability}", column_type(&property.type_name)));
    }

    let mut sql = format!(
        "create table if not exists public.{table} (\n  {}\n);\n",
        columns.join(",\n  ")
    );
    if with_owner {
        sql.push_str(&format!(
            "alter table public.{table} enable row level security;\n\
             drop policy if exists \"owner access\" on public.{table};\n\
             create policy \"owner access\" on public.{table} for all \
             using (auth.uid() = user_id) with check (auth.uid() = user_id);\n"
        ));
    }
    sql
}

fn bucket_id(app_name: &str) -> String {
    format!("{}-files", to_snake_case(app_name).replace('_', "-"))
}

fn create_bucket_sql(bucket: &str) -> String {
    format!(
        "insert into storage.buckets (id, name, public) values ('{bucket}', '{bucket}', false) \
         on conflict (id) do nothing;"
    )
}

fn enable_realtime_sql(table: &str) -> String {
    format!(
        "do $$ begin\n  if not exists (select 1 from pg_publication_tables \
         where pubname = 'supabase_realtime' and schemaname = 'public' and tablename = '{table}') then\n    \
         alter publication supabase_realtime add table public.{table};\n  end if;\nend $$;"
    )
}

fn describe_models(models: &[&ModelRef]) -> String {
    models
        .iter()
        .map(|m| {
            let props: Vec<String> = m
                .properties
                .iter()
                .map(|p| format!("{}: {}{}", p.name, p.type_name, if p.optional { "?" } else { "" }))
                .collect();
            format!("- {} -> table `{}` ({})", m.name, m.table_name(), props.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_auth(methods: &[AuthMethod]) -> String {
    methods
        .iter()
        .map(|m| match m {
            AuthMethod::Email => "email and password",
            AuthMethod::Apple => "Sign in with Apple (signInWithIdToken, provider .apple)",
            AuthMethod::Google => "Google (signInWithIdToken, provider .google)",
            AuthMethod::Anonymous => "anonymous sign-in",
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl PromptContributor for SupabaseProvider {
    async fn contribute(&self, request: &PromptRequest) -> Result<PromptContribution> {
        let cloud: Vec<&ModelRef> = request.models.iter().filter(|m| m.is_cloud()).collect();

        let mut system = String::from(
            "Backend: Supabase via the supabase-swift package (`import Supabase`). \
             Create a single shared `SupabaseClient` and inject it; never hard-code service-role keys. \
             Use async/await APIs and map rows with Codable structs using snake_case coding keys.",
        );
        if !request.auth_methods.is_empty() {
            system.push_str(&format!(
                " Authentication: {}. Gate data access on the current session.",
                describe_auth(&request.auth_methods)
            ));
        }

        let mut user = Vec::new();
        match &request.config {
            Some(config) => user.push(format!(
                "Supabase project URL: {}\nSupabase anon key: {}",
                config.project_url, config.anon_key
            )),
            None => user.push(
                "Supabase is not configured for this app yet; read the URL and anon key \
                 from a `Supabase.plist` resource with placeholder values."
                    .to_string(),
            ),
        }
        if !cloud.is_empty() {
            user.push(format!("Cloud-synced models:\n{}", describe_models(&cloud)));
        }

        Ok(PromptContribution {
            provider_id: ProviderId::from(PROVIDER_ID),
            system_fragment: Some(system),
            user_fragment: Some(user.join("\n\n")),
            backend_ready: request
                .config
                .as_ref()
                .is_some_and(|c| c.validated_at.is_some()),
        })
    }
}

impl McpServerCapability for SupabaseProvider {
    fn mcp_server(&self, credentials: &Credentials) -> Result<McpServerDescriptor> {
        let project_ref = credentials.project_ref.as_deref().ok_or_else(|| {
            ForgeError::InvalidIntegration("project ref is required for the Supabase tool server".into())
        })?;
        let mut args = self.descriptor.tool.args.clone();
        args.push(format!("--project-ref={project_ref}"));

        Ok(McpServerDescriptor {
            name: PROVIDER_ID.to_string(),
            command: self.descriptor.tool.command.clone(),
            args,
            env: [("SUPABASE_ACCESS_TOKEN".to_string(), credentials.token.clone())]
                .into_iter()
                .collect(),
        })
    }

    fn allowed_tools(&self) -> Vec<String> {
        TOOLS.iter().map(|t| qualified_tool(PROVIDER_ID, t)).collect()
    }
}

enum Step<'r> {
    Table(&'r ModelRef),
    Bucket(String),
    Realtime(String),
}

impl Step<'_> {
    fn label(&self) -> String {
        match self {
            Step::Table(model) => format!("table {}", model.table_name()),
            Step::Bucket(bucket) => format!("storage bucket {bucket}"),
            Step::Realtime(table) => format!("realtime for {table}"),
        }
    }
}

#[async_trait]
impl Provisioner for SupabaseProvider {
    async fn provision(
        &self,
        request: &ProvisionRequest,
        deadline: Instant,
    ) -> Result<ProvisionResult> {
        let mut result = ProvisionResult {
            needs_platform_setup: request.needs_auth
                && request.auth_methods.iter().any(AuthMethod::needs_platform_setup),
            ..ProvisionResult::default()
        };

        if Instant::now() >= deadline {
            let warning = "provisioning deadline already passed; no backend resources were created";
            obs::emit_provision_warning(PROVIDER_ID, warning);
            result.warnings.push(warning.to_string());
            return Ok(result);
        }

        let token = request.config.pat.as_deref().ok_or_else(|| {
            ForgeError::InvalidIntegration("provisioning requires a personal access token".into())
        })?;
        let project_ref = request.config.project_ref.as_deref().ok_or_else(|| {
            ForgeError::InvalidIntegration("provisioning requires a project ref".into())
        })?;

        let models: Vec<&ModelRef> = if request.needs_database {
            request
                .models
                .iter()
                .filter(|m| m.is_cloud() && !m.table_name().is_empty())
                .collect()
        } else {
            Vec::new()
        };

        let existing = if models.is_empty() {
            Vec::new()
        } else {
            match self
                .attempt("list tables", deadline, || self.api.list_tables(token, project_ref))
                .await
            {
                Ok(tables) => tables,
                Err(warning) => {
                    obs::emit_provision_warning(PROVIDER_ID, &warning);
                    result.warnings.push(warning);
                    Vec::new()
                }
            }
        };

        let mut steps: Vec<Step> = models
            .iter()
            .filter(|m| !existing.contains(&m.table_name()))
            .map(|&m| Step::Table(m))
            .collect();
        if request.needs_storage {
            steps.push(Step::Bucket(bucket_id(&request.app_name)));
        }
        if request.needs_realtime {
            steps.extend(models.iter().map(|m| Step::Realtime(m.table_name())));
        }

        let mut remaining = steps.iter();
        while let Some(step) = remaining.next() {
            if Instant::now() >= deadline {
                let left: Vec<String> =
                    std::iter::once(step).chain(remaining.by_ref()).map(Step::label).collect();
                let warning = format!("deadline reached; not provisioned: {}", left.join(", "));
                obs::emit_provision_warning(PROVIDER_ID, &warning);
                result.warnings.push(warning);
                break;
            }

            let sql = match step {
                Step::Table(model) => create_table_sql(model, request.needs_auth),
                Step::Bucket(bucket) => create_bucket_sql(bucket),
                Step::Realtime(table) => enable_realtime_sql(table),
            };
            let label = step.label();
            match self
                .attempt(&label, deadline, || self.api.run_sql(token, project_ref, &sql))
                .await
            {
                Ok(()) => {
                    if let Step::Table(model) = step {
                        result.tables_created.push(model.table_name());
                    }
                }
                Err(warning) => {
                    obs::emit_provision_warning(PROVIDER_ID, &warning);
                    result.warnings.push(warning);
                }
            }
        }

        info!(
            app = %request.app_name,
            created = result.tables_created.len(),
            warnings = result.warnings.len(),
            "Supabase provisioning finished"
        );
        Ok(result)
    }
}
