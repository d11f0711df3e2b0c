//! CLI commands and handlers
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::application::context::{OperationSettings, StoreContext};
use crate::application::orchestrator::TransactionCallbacks;
use crate::application::stores::swap::{SwapRequest, SwapStore, SwapSuccess};
use crate::domain::correlation::OperationOutcome;
use crate::domain::math::{min_expected_amount, withdraw_share, ConstantProductMath, Fee, PoolState};
use crate::infrastructure::preferences::Preferences;
use crate::infrastructure::provider::MemoryProvider;
use crate::infrastructure::simulation::{synthetic_address, DexSimulator};
use crate::shared::config::AppConfig;
use crate::shared::errors::{AppError, ProviderError};
use crate::shared::utils::{format_amount, to_base_units};

#[derive(Parser)]
#[command(name = "flatdex")]
#[command(version, about = "DEX client stores: quotes, liquidity shares and correlated swaps")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "Config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Quote a swap against explicit reserves
    Quote {
        /// Amount to spend, in token units
        #[arg(short, long)]
        amount: Decimal,

        /// Reserve of the spent token
        #[arg(long)]
        reserve_in: Decimal,

        /// Reserve of the received token
        #[arg(long)]
        reserve_out: Decimal,

        /// Fee numerator over 1_000_000
        #[arg(long, default_value_t = 3000)]
        fee: u64,

        /// Slippage tolerance in percent (saved preference when omitted)
        #[arg(short, long)]
        slippage: Option<Decimal>,

        /// Decimals of the received token
        #[arg(long, default_value_t = 9)]
        decimals: u8,
    },

    /// Reserves redeemable for an LP balance
    Share {
        /// LP balance in base units
        #[arg(long)]
        lp: u128,

        /// LP total supply in base units
        #[arg(long)]
        supply: u128,

        #[arg(long)]
        left_reserve: u128,

        #[arg(long)]
        right_reserve: u128,
    },

    /// Run a swap end to end against an in-memory DEX
    #[command(name = "simulate-swap")]
    Simulate {
        /// Amount of QUBE to spend
        #[arg(short, long, default_value_t = Decimal::TEN)]
        amount: Decimal,

        /// Slippage tolerance in percent (saved preference when omitted)
        #[arg(short, long)]
        slippage: Option<Decimal>,

        /// Route through WEVER instead of a direct pair
        #[arg(long)]
        cross: bool,

        /// Decline the signing request
        #[arg(long)]
        reject: bool,
    },

    /// Show or change saved preferences
    Prefs {
        /// New slippage tolerance in percent
        #[arg(long)]
        set_slippage: Option<Decimal>,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<(), AppError> {
        let preferences = Preferences::open(&config.preferences.path);
        let default_slippage = preferences.slippage(config.operations.default_slippage);
        match command {
            Commands::Quote {
                amount,
                reserve_in,
                reserve_out,
                fee,
                slippage,
                decimals,
            } => Self::execute_quote_command(
                amount,
                reserve_in,
                reserve_out,
                fee,
                slippage.unwrap_or(default_slippage),
                decimals,
            ),
            Commands::Share {
                lp,
                supply,
                left_reserve,
                right_reserve,
            } => Self::execute_share_command(lp, supply, left_reserve, right_reserve),
            Commands::Simulate {
                amount,
                slippage,
                cross,
                reject,
            } => {
                let settings = OperationSettings::from(&config.operations);
                Self::execute_simulate_command(amount, slippage.unwrap_or(default_slippage), cross, reject, settings)
                    .await
            }
            Commands::Prefs { set_slippage } => Self::execute_prefs_command(&preferences, set_slippage, default_slippage),
        }
    }

    fn execute_quote_command(
        amount: Decimal,
        reserve_in: Decimal,
        reserve_out: Decimal,
        fee: u64,
        slippage: Decimal,
        decimals: u8,
    ) -> Result<(), AppError> {
        let pool = PoolState::new(reserve_in, reserve_out, Fee::new(fee, 1_000_000)?);
        let expected = ConstantProductMath::expected_output(amount, &pool)?;
        let expected_units = to_base_units(expected, decimals)?;
        let minimum = min_expected_amount(expected_units, slippage)?;
        let impact = ConstantProductMath::price_impact(amount, &pool)?;

        println!("💱 Quote for {} (fee {}%)", amount, pool.fee.percent());
        println!("   Expected:      {}", format_amount(expected_units, decimals));
        println!("   Minimum:       {} (slippage {}%)", format_amount(minimum, decimals), slippage);
        println!("   Price impact:  {:.4}%", impact);
        if let Some(price) = ConstantProductMath::spot_price(&pool) {
            println!("   Spot price:    {}", price.normalize());
        }
        Ok(())
    }

    fn execute_share_command(lp: u128, supply: u128, left_reserve: u128, right_reserve: u128) -> Result<(), AppError> {
        let share = withdraw_share(lp, supply, left_reserve, right_reserve)?;
        println!("💧 LP share {}%", share.percent);
        println!("   Left:  {}", share.left);
        println!("   Right: {}", share.right);
        Ok(())
    }

    async fn execute_simulate_command(
        amount: Decimal,
        slippage: Decimal,
        cross: bool,
        reject: bool,
        settings: OperationSettings,
    ) -> Result<(), AppError> {
        info!("🚀 Starting in-memory DEX");
        let provider = Arc::new(MemoryProvider::new());
        let dex = DexSimulator::new(provider.clone());
        let qube = dex.add_token("QUBE", 9);
        let usdt = dex.add_token("USDT", 6);
        let wallet = synthetic_address(1);

        let ctx = StoreContext::new(provider.clone(), wallet.clone(), settings);
        let store = SwapStore::new(ctx.clone(), dex.dex_root().clone());
        if cross {
            let wever = dex.add_token("WEVER", 9);
            dex.add_pair(&qube, &wever, 1_000_000_000_000, 4_000_000_000_000, Fee::new(3000, 1_000_000)?);
            dex.add_pair(&wever, &usdt, 4_000_000_000_000, 2_000_000_000, Fee::new(3000, 1_000_000)?);
            store.register_pair(&qube, &wever).await?;
            store.register_pair(&wever, &usdt).await?;
        } else {
            dex.add_pair(&qube, &usdt, 1_000_000_000_000, 2_000_000_000, Fee::new(3000, 1_000_000)?);
            store.register_pair(&qube, &usdt).await?;
        }
        dex.mint(&qube.root, &wallet, to_base_units(amount, qube.decimals)?);

        if reject {
            provider.fail_next_send(ProviderError::user_rejected());
        }

        let decimals = usdt.decimals;
        let callbacks = TransactionCallbacks::new()
            .on_send(|receipt| println!("📨 Sent {} ({})", receipt.summary, receipt.message_hash))
            .on_success(move |success: &SwapSuccess| {
                println!("✅ Received {} USDT", format_amount(success.result.receive_amount, decimals))
            })
            .on_failure(|report| println!("❌ {} failed: {}", report.operation, report.message));

        let request = SwapRequest {
            spent: qube.clone(),
            receive: usdt.clone(),
            amount,
            slippage: Some(slippage),
        };
        let quote = store.quote(&request).await?;
        println!(
            "🔍 Route with {} hop(s): expected {} USDT, minimum {} USDT",
            quote.route.hops.len(),
            format_amount(quote.expected_amount, decimals),
            format_amount(quote.min_expected_amount, decimals)
        );

        match store.swap(request, callbacks).await? {
            OperationOutcome::Abandoned => println!("🚫 Signing declined, nothing sent"),
            OperationOutcome::Failed(reason) => warn!("⚠️ Swap failed: {}", reason),
            OperationOutcome::Succeeded(_) => {}
        }

        println!(
            "💰 Balances: {} QUBE, {} USDT",
            format_amount(dex.balance(&qube.root, &wallet), qube.decimals),
            format_amount(dex.balance(&usdt.root, &wallet), usdt.decimals)
        );
        for notification in ctx.notifications.recent() {
            println!("🔔 [{:?}] {}", notification.kind, notification.message);
        }
        Ok(())
    }

    fn execute_prefs_command(
        preferences: &Preferences,
        set_slippage: Option<Decimal>,
        current: Decimal,
    ) -> Result<(), AppError> {
        if let Some(slippage) = set_slippage {
            preferences.set_slippage(slippage)?;
            println!("✅ Slippage set to {}%", slippage);
            return Ok(());
        }
        println!("⚙️ Preferences at {}", preferences.path().display());
        println!("   Slippage: {}%", current);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::ConfigLoader;
    use rust_decimal_macros::dec;

    fn config(dir: &tempfile::TempDir) -> AppConfig {
        let toml = format!(
            "[network]\ndex_root = \"0:{}\"\n\n[preferences]\npath = \"{}\"\n",
            "11".repeat(32),
            dir.path().join("preferences.json").display()
        );
        ConfigLoader::parse(&toml).unwrap()
    }

    #[test]
    fn test_parse_simulate_swap() {
        let cli = Cli::try_parse_from(["flatdex", "simulate-swap", "--amount", "5", "--cross"]).unwrap();
        match cli.command {
            Commands::Simulate { amount, cross, reject, .. } => {
                assert_eq!(amount, dec!(5));
                assert!(cross);
                assert!(!reject);
            }
            _ => panic!("expected simulate-swap"),
        }
        assert_eq!(cli.config, "Config.toml");
    }

    #[tokio::test]
    async fn test_prefs_command_saves_slippage() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        CommandExecutor::execute(Commands::Prefs { set_slippage: Some(dec!(2)) }, config.clone())
            .await
            .unwrap();

        let preferences = Preferences::open(&config.preferences.path);
        assert_eq!(preferences.slippage(dec!(0.5)), dec!(2));
    }

    #[tokio::test]
    async fn test_simulate_swap_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        for (cross, reject) in [(false, false), (true, false), (false, true)] {
            let command = Commands::Simulate {
                amount: dec!(10),
                slippage: Some(dec!(1)),
                cross,
                reject,
            };
            CommandExecutor::execute(command, config(&dir)).await.unwrap();
        }
    }
}
