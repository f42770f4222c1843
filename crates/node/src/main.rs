// node/src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use custody_core::{Amount, SystemClock, SECONDS_PER_DAY};
use node::{parse_account, NodeConfig, Runtime};
use strategy::MarketMakingParams;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "allocator-node")]
#[command(about = "Pooled custody allocator", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "./allocator.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config (if missing) and a fresh state file
    Init {
        /// Override data directory
        #[arg(long)]
        data_dir: Option<String>,

        /// Replace an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Mint test funds to an account
    Fund {
        account: String,
        asset: String,
        amount: Amount,
    },

    /// Set an allowance
    Approve {
        owner: String,
        asset: String,
        spender: String,
        amount: Amount,
    },

    /// Deposit into the orchestrator
    Deposit {
        user: String,
        asset: String,
        amount: Amount,
    },

    /// Withdraw from the orchestrator
    Withdraw {
        user: String,
        asset: String,
        amount: Amount,
    },

    /// Deposit directly into the lending ledger
    Lend {
        user: String,
        asset: String,
        amount: Amount,
    },

    /// Withdraw from the lending ledger (0 = everything)
    Redeem {
        user: String,
        asset: String,
        #[arg(default_value = "0")]
        amount: Amount,
    },

    /// Claim accrued lending interest
    Claim { user: String, asset: String },

    /// Move the pooled funds into the market-making venue
    ProvisionMm {
        caller: String,
        base: Amount,
        quote: Amount,

        #[arg(long)]
        spread: Option<u32>,

        #[arg(long)]
        levels: Option<u8>,

        #[arg(long)]
        step: Option<u32>,
    },

    /// Move the pooled funds into the lending venue
    ProvisionLending {
        caller: String,
        base: Amount,
        quote: Amount,
    },

    /// Pull everything back into custody
    Emergency { caller: String },

    /// Advance simulated time
    Advance {
        #[arg(long, default_value = "0")]
        seconds: u64,

        #[arg(long, default_value = "0")]
        days: u64,
    },

    /// Print the position summary as JSON
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "allocator_node={level},node={level},strategy={level},lending_ledger={level}",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Init { data_dir, force } = &cli.command {
        return init(&cli.config, data_dir.clone(), *force);
    }

    let config = NodeConfig::from_file(&cli.config)
        .with_context(|| format!("loading {} (run `allocator-node init` first)", cli.config))?;
    let state_path = config.state_path();
    let mut runtime = Runtime::load(&state_path)
        .with_context(|| format!("reading state from {}", state_path.display()))?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Fund {
            account,
            asset,
            amount,
        } => {
            runtime.fund(parse_account(&account)?, parse_account(&asset)?, amount)?;
        }
        Commands::Approve {
            owner,
            asset,
            spender,
            amount,
        } => {
            runtime.approve(
                parse_account(&owner)?,
                parse_account(&asset)?,
                parse_account(&spender)?,
                amount,
            )?;
        }
        Commands::Deposit {
            user,
            asset,
            amount,
        } => {
            runtime.deposit(parse_account(&user)?, parse_account(&asset)?, amount)?;
        }
        Commands::Withdraw {
            user,
            asset,
            amount,
        } => {
            runtime.withdraw(parse_account(&user)?, parse_account(&asset)?, amount)?;
        }
        Commands::Lend {
            user,
            asset,
            amount,
        } => {
            let shares = runtime.lend(parse_account(&user)?, parse_account(&asset)?, amount)?;
            println!("{}", shares);
        }
        Commands::Redeem {
            user,
            asset,
            amount,
        } => {
            let paid = runtime.redeem(parse_account(&user)?, parse_account(&asset)?, amount)?;
            println!("{}", paid);
        }
        Commands::Claim { user, asset } => {
            let paid = runtime.claim(parse_account(&user)?, parse_account(&asset)?)?;
            println!("{}", paid);
        }
        Commands::ProvisionMm {
            caller,
            base,
            quote,
            spread,
            levels,
            step,
        } => {
            let defaults = config.default_params();
            let params = MarketMakingParams {
                spread_bps: spread.unwrap_or(defaults.spread_bps),
                levels: levels.unwrap_or(defaults.levels),
                step_bps: step.unwrap_or(defaults.step_bps),
            };
            let handle =
                runtime.provision_market_making(parse_account(&caller)?, base, quote, params)?;
            println!("{}", handle.id);
        }
        Commands::ProvisionLending {
            caller,
            base,
            quote,
        } => {
            let handle = runtime.provision_lending(parse_account(&caller)?, base, quote)?;
            println!("{}", handle.id);
        }
        Commands::Emergency { caller } => {
            let report = runtime.emergency(parse_account(&caller)?)?;
            for step in &report.steps {
                println!("{}: {:?}", step.action, step.outcome);
            }
            if !report.is_clean() {
                tracing::warn!("Some recovery steps failed; see the event log");
            }
        }
        Commands::Advance { seconds, days } => {
            let now = runtime.advance(seconds + days * SECONDS_PER_DAY);
            println!("{}", now);
        }
        Commands::Status => {
            let status = runtime.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    runtime.save(&state_path)?;
    Ok(())
}

fn init(config_path: &str, data_dir: Option<String>, force: bool) -> anyhow::Result<()> {
    let mut config = if std::path::Path::new(config_path).exists() {
        NodeConfig::from_file(config_path)?
    } else {
        let config = NodeConfig::default();
        config.to_file(config_path)?;
        tracing::info!("Wrote default configuration to {}", config_path);
        config
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
        config.to_file(config_path)?;
    }

    let state_path = config.state_path();
    if state_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to start over",
            state_path.display()
        );
    }

    let runtime = Runtime::genesis(&config, &SystemClock::new())?;
    runtime.save(&state_path)?;

    tracing::info!("Initialized allocator state at {}", state_path.display());
    tracing::info!("Edit {} to configure accounts, assets and pools", config_path);
    Ok(())
}
