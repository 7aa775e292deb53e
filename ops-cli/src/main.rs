use anyhow::Context;
use audit_engine::Actor;
use clap::{Parser, Subcommand};
use logger_redacted::init_tracing;
use ops_cli::{build_orchestrator, connect, print_json, schedule};
use preauth_engine::MIGRATOR;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "preauth")]
#[command(about = "Run preauthorization intake, sweeps and staff overrides")]
struct Cli {
    /// Configuration file (.yaml, .toml or .json); PREAUTH__* variables override it
    #[arg(long, short, env = "PREAUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Database connection URL, overriding the configured one
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Evaluate an order and submit it if preauth is required
    ProcessOrder { order_id: Uuid },

    /// Resubmit pending requests that are due
    RetrySweep,

    /// Poll carriers for decisions
    StatusSweep,

    /// Expire requests with no decision inside the lookback window
    ExpirySweep,

    /// Run all sweeps on the configured cron schedule until Ctrl-C
    Schedule,

    /// Record a staff eligibility verdict
    RecordEligibility {
        #[arg(long)]
        member_id: String,
        #[arg(long)]
        carrier: String,
        /// Member is eligible; omit to record ineligible
        #[arg(long)]
        eligible: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        verified_by: String,
    },

    /// Re-run eligibility for an eligibility_failed request
    ReverifyEligibility {
        request_id: Uuid,
        #[arg(long)]
        staff_id: String,
    },

    /// Resubmit a need_info request with supplemental notes
    SupplementalInfo {
        request_id: Uuid,
        #[arg(long)]
        notes: String,
        #[arg(long)]
        staff_id: String,
    },

    /// Show a request
    Show { request_id: Uuid },

    /// Print the audit trail of a request
    AuditTrail { request_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config_engine::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("initializing logging: {}", e))?;

    let pool = connect(&config).await?;

    if let Command::Migrate = cli.command {
        MIGRATOR.run(&pool).await.context("running migrations")?;
        info!("Migrations applied");
        return Ok(());
    }

    let schedule_config = config.schedule.clone();
    let orchestrator = Arc::new(build_orchestrator(config, pool).await?);

    match cli.command {
        Command::Migrate => {}
        Command::ProcessOrder { order_id } => {
            print_json(&orchestrator.process_order(order_id).await?)?;
        }
        Command::RetrySweep => print_json(&orchestrator.run_retry_sweep().await?)?,
        Command::StatusSweep => print_json(&orchestrator.run_status_sweep().await?)?,
        Command::ExpirySweep => print_json(&orchestrator.run_expiry_sweep().await?)?,
        Command::Schedule => schedule::run(orchestrator, &schedule_config).await?,
        Command::RecordEligibility {
            member_id,
            carrier,
            eligible,
            notes,
            verified_by,
        } => {
            let record = orchestrator
                .record_manual_eligibility(&member_id, &carrier, eligible, notes, &verified_by)
                .await?;
            print_json(&record)?;
        }
        Command::ReverifyEligibility { request_id, staff_id } => {
            let outcome = orchestrator
                .reverify_eligibility(request_id, Actor::staff(staff_id, None))
                .await?;
            print_json(&outcome)?;
        }
        Command::SupplementalInfo {
            request_id,
            notes,
            staff_id,
        } => {
            let request = orchestrator
                .submit_supplemental_info(request_id, &notes, Actor::staff(staff_id, None))
                .await?;
            print_json(&request)?;
        }
        Command::Show { request_id } => print_json(&orchestrator.get_request(request_id).await?)?,
        Command::AuditTrail { request_id } => print_json(&orchestrator.audit_trail(request_id).await?)?,
    }

    Ok(())
}
