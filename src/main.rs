use anyhow::Result;
use clap::Parser;

use bridge_upgrade::cli::commands::init_config::InitConfigCommand;
use bridge_upgrade::cli::commands::run::RunCommand;
use bridge_upgrade::cli::commands::status::StatusCommand;
use bridge_upgrade::cli::commands::steps::StepsCommand;
use bridge_upgrade::cli::{Cli, Commands};
use bridge_upgrade::config::UpgradeConfig;
use bridge_upgrade::telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    UpgradeConfig::load_env_file()?;
    // Logging comes up before the command loads (and validates) its own config
    let observability = UpgradeConfig::load(cli.config.as_deref())
        .map(|c| c.observability)
        .unwrap_or_else(|_| UpgradeConfig::default().observability);
    telemetry::init(&observability.log_level, observability.json)?;

    match cli.command {
        Commands::Run {
            tag,
            account,
            state_file,
            json,
        } => tokio::runtime::Runtime::new()?.block_on(async {
            RunCommand::new(&tag, &account)
                .with_config(cli.config)
                .with_state_file(state_file)
                .with_json(json)
                .execute()
                .await
        }),
        Commands::Status { state_file } => tokio::runtime::Runtime::new()?.block_on(async {
            StatusCommand::new(cli.config, state_file).execute().await
        }),
        Commands::Steps => StepsCommand::new(cli.config).execute(),
        Commands::InitConfig { path, force } => InitConfigCommand::new(path).with_force(force).execute(),
    }
}
