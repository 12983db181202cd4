//! claimgate - operator CLI for the signed-claim lifecycle engine.
//!
//! Wraps the engine for kiosk, gatekeeper, and back-office use: issuing
//! and validating claims, inspecting status, and administering cycles,
//! rosters, and box inventory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use claimgate_core::{
    AdminCapability, ContractCategory, Database, Direction, Engine, EngineConfig, IssueRequest,
    SystemClock, ValidateRequest, import,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// claimgate - signed-claim lifecycle engine
#[derive(Parser, Debug)]
#[command(name = "claimgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the engine configuration file
    #[arg(short, long, default_value = "claimgate.toml")]
    config: PathBuf,

    /// Path to the SQLite database
    #[arg(long, default_value = "claimgate.db")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Kiosk side ===
    /// Issue a claim for an employee
    Issue {
        /// Employee national id
        employee_id: String,

        /// Explicit cycle id (defaults to the active cycle)
        #[arg(long)]
        cycle: Option<i64>,

        /// Branch for the stock precheck
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Reprint a pending claim with a fresh TTL
    Reprint {
        /// Claim id
        claim_id: i64,

        /// Why the claim is being reprinted
        #[arg(short, long)]
        reason: String,

        /// Kiosk or operator identifier
        #[arg(long, default_value = "kiosk")]
        actor: String,
    },

    // === Gatekeeper side ===
    /// Validate a scanned code and deliver a box
    Validate {
        /// Scanned code (`<id>:<signature>` or bare `<id>`)
        code: String,

        /// Gatekeeper identifier
        #[arg(short, long)]
        gatekeeper: String,

        /// Branch the scan happens at
        #[arg(short, long)]
        branch: String,

        /// Specific physical box label, if one was scanned
        #[arg(long)]
        box_code: Option<String>,
    },

    /// Show a claim's state and timeline
    Status {
        /// Claim code or numeric claim id
        lookup: String,

        /// Emit the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    // === Back office ===
    /// Cancel a claim (admin)
    Cancel {
        /// Claim id
        claim_id: i64,

        /// Justification recorded on the timeline
        #[arg(short, long)]
        reason: String,

        /// Administrator identifier
        #[arg(long)]
        actor: String,
    },

    /// Block or unblock a single claim (admin)
    Block {
        /// Claim id
        claim_id: i64,

        /// Lift the block instead of setting it
        #[arg(long)]
        unblock: bool,

        /// Justification for the block
        #[arg(short, long)]
        reason: Option<String>,

        /// Administrator identifier
        #[arg(long)]
        actor: String,
    },

    /// Transition pending claims past their TTL to expired
    Sweep,

    /// Stock inspection and manual movements
    #[command(subcommand)]
    Stock(StockCommands),

    /// Roster, cycle, and inventory intake
    #[command(subcommand)]
    Import(ImportCommands),
}

#[derive(Subcommand, Debug)]
enum StockCommands {
    /// Show stock levels, optionally scoped to one branch
    Summary {
        /// Branch identifier
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Record a justified manual movement (admin)
    Move {
        /// Branch identifier
        branch: String,

        /// Box type
        box_type: String,

        /// Movement direction
        #[arg(value_parser = ["in", "out"])]
        direction: String,

        /// Quantity moved
        quantity: i64,

        /// Justification recorded on the movement
        #[arg(short, long)]
        reason: String,

        /// Administrator identifier
        #[arg(long)]
        actor: String,
    },
}

#[derive(Subcommand, Debug)]
enum ImportCommands {
    /// Insert or refresh an employee
    Employee {
        /// National id
        national_id: String,

        /// Display name
        name: String,

        /// Contract category (permanent, fixed-term, part-time, fee, external)
        category: String,

        /// Soft-block the employee
        #[arg(long)]
        blocked: bool,
    },

    /// Create a collection cycle
    Cycle {
        /// Cycle label
        label: String,

        /// First day of the window (YYYY-MM-DD)
        starts: NaiveDate,

        /// Last day of the window (YYYY-MM-DD)
        ends: NaiveDate,

        /// Mark the cycle active (at most one may be)
        #[arg(long)]
        active: bool,
    },

    /// Create a benefit type
    Benefit {
        /// Benefit name
        name: String,

        /// Box type consumed on delivery
        box_type: String,

        /// Eligible contract categories (comma separated)
        #[arg(long, value_delimiter = ',')]
        eligible: Vec<String>,

        /// Deliver without gatekeeper validation
        #[arg(long)]
        no_gatekeeper: bool,
    },

    /// Admit a benefit type into a cycle
    Admit {
        /// Cycle id
        cycle_id: i64,

        /// Benefit type id
        benefit_id: i64,

        /// Also mark it the cycle's primary benefit
        #[arg(long)]
        primary: bool,
    },

    /// Register labelled physical boxes at a branch
    Boxes {
        /// Branch identifier
        branch: String,

        /// Box type
        box_type: String,

        /// Box labels (comma separated)
        #[arg(value_delimiter = ',')]
        labels: Vec<String>,

        /// Who booked the intake
        #[arg(long, default_value = "warehouse")]
        actor: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = EngineConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let db = Database::open(&cli.db)
        .with_context(|| format!("failed to open database at {}", cli.db.display()))?;
    let engine = Engine::new(db, config, Arc::new(SystemClock));

    match cli.command {
        Commands::Issue {
            employee_id,
            cycle,
            branch,
        } => {
            let result = engine.issue(&IssueRequest {
                employee_id,
                cycle_id: cycle,
                branch_id: branch,
                deadline: None,
            });
            match result {
                Ok(issued) => {
                    println!(
                        "claim {} issued, expires {}",
                        issued.claim.id, issued.claim.expires_at
                    );
                    println!("{}", issued.code);
                }
                // Issuance is idempotent on the uniqueness tuple.
                Err(claimgate_core::EngineError::AlreadyIssued { claim }) => {
                    println!(
                        "claim {} already issued [{}], expires {}",
                        claim.id, claim.state, claim.expires_at
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Reprint {
            claim_id,
            reason,
            actor,
        } => {
            let reprinted = engine.reprint(claim_id, &reason, &actor)?;
            println!(
                "claim {} reprinted, expires {}",
                reprinted.claim.id, reprinted.claim.expires_at
            );
            println!("{}", reprinted.code);
        }
        Commands::Validate {
            code,
            gatekeeper,
            branch,
            box_code,
        } => {
            let delivered = engine.validate(&ValidateRequest {
                scanned_code: code,
                gatekeeper_id: gatekeeper,
                branch_id: branch,
                box_code,
                deadline: None,
            })?;
            println!(
                "claim {} delivered: hand over box {}",
                delivered.claim.id, delivered.box_label
            );
        }
        Commands::Status { lookup, json } => {
            let status = engine.get_status(&lookup)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status.claim)?);
            } else {
                println!(
                    "claim {} [{}] expires in {}s",
                    status.claim.id, status.claim.state, status.seconds_to_expiry
                );
            }
            for event in &status.events {
                println!("  {} {} by {}", event.at, event.kind.token(), event.actor_id);
            }
        }
        Commands::Cancel {
            claim_id,
            reason,
            actor,
        } => {
            let admin = AdminCapability::new(actor);
            let claim = engine.cancel(claim_id, &reason, Some(&admin))?;
            println!("claim {} is now {}", claim.id, claim.state);
        }
        Commands::Block {
            claim_id,
            unblock,
            reason,
            actor,
        } => {
            let admin = AdminCapability::new(actor);
            engine.block_claim(claim_id, !unblock, reason.as_deref(), Some(&admin))?;
            println!(
                "claim {claim_id} {}",
                if unblock { "unblocked" } else { "blocked" }
            );
        }
        Commands::Sweep => {
            let count = engine.sweep_expired()?;
            println!("{count} claims expired");
        }
        Commands::Stock(stock) => run_stock(&engine, stock)?,
        Commands::Import(import) => run_import(&engine, import)?,
    }
    Ok(())
}

fn run_stock(engine: &Engine, command: StockCommands) -> Result<()> {
    match command {
        StockCommands::Summary { branch } => {
            for level in engine.stock_summary(branch.as_deref())? {
                println!(
                    "{} {}: {} in stock, {} free boxes",
                    level.branch_id, level.box_type, level.count, level.free_boxes
                );
            }
        }
        StockCommands::Move {
            branch,
            box_type,
            direction,
            quantity,
            reason,
            actor,
        } => {
            let direction = match direction.as_str() {
                "in" => Direction::In,
                _ => Direction::Out,
            };
            let admin = AdminCapability::new(actor);
            let count = engine.record_stock_movement(
                &branch,
                &box_type,
                direction,
                quantity,
                &reason,
                Some(&admin),
            )?;
            println!("{branch} {box_type}: {count} in stock");
        }
    }
    Ok(())
}

fn run_import(engine: &Engine, command: ImportCommands) -> Result<()> {
    let conn = engine.database().acquire(None)?;
    match command {
        ImportCommands::Employee {
            national_id,
            name,
            category,
            blocked,
        } => {
            let national_id = claimgate_core::national_id::normalize(&national_id)
                .map_err(|e| anyhow!("bad national id: {e}"))?;
            let category = parse_category(&category)?;
            let id = import::upsert_employee(&conn, &national_id, &name, category)?;
            if blocked {
                import::set_employee_blocked(&conn, id, true)?;
            }
            println!("employee {id} ({national_id})");
        }
        ImportCommands::Cycle {
            label,
            starts,
            ends,
            active,
        } => {
            let id = import::upsert_cycle(&conn, &label, starts, ends, active)
                .context("cycle rejected (is another cycle already active?)")?;
            println!("cycle {id} ({label})");
        }
        ImportCommands::Benefit {
            name,
            box_type,
            eligible,
            no_gatekeeper,
        } => {
            let eligible = eligible
                .iter()
                .map(|c| parse_category(c))
                .collect::<Result<Vec<_>>>()?;
            let id =
                import::upsert_benefit_type(&conn, &name, !no_gatekeeper, &box_type, &eligible)?;
            println!("benefit {id} ({name})");
        }
        ImportCommands::Admit {
            cycle_id,
            benefit_id,
            primary,
        } => {
            import::admit_benefit(&conn, cycle_id, benefit_id)?;
            if primary {
                import::set_primary_benefit(&conn, cycle_id, benefit_id)?;
            }
            println!("benefit {benefit_id} admitted into cycle {cycle_id}");
        }
        ImportCommands::Boxes {
            branch,
            box_type,
            labels,
            actor,
        } => {
            let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            import::register_boxes(&conn, &branch, &box_type, &refs, &actor)?;
            println!("{} boxes registered at {branch}", labels.len());
        }
    }
    Ok(())
}

fn parse_category(token: &str) -> Result<ContractCategory> {
    ContractCategory::parse(&token.trim().replace('-', "_")).map_err(|_| {
        anyhow!("unknown contract category: {token} (expected permanent, fixed-term, part-time, fee, or external)")
    })
}
