//! `phonesimd`: runs the simulator as a standalone TCP daemon. Parses a
//! listen address and a rule-profile path, then hands off to
//! [`phonesim::server::run`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use phonesim::SimulatorConfig;

#[derive(Parser, Debug)]
#[command(name = "phonesimd", about = "AT-command phone/SIM simulator daemon")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:12345.
    #[arg(long, default_value = "127.0.0.1:12345")]
    listen: SocketAddr,

    /// Path to the XML rule profile to load.
    #[arg(long)]
    profile: PathBuf,

    /// Directory of standalone `<phonebook>` XML fragments, loaded after
    /// the profile and overriding any profile-seeded phonebook sharing a
    /// name.
    #[arg(long)]
    phonebook_dir: Option<PathBuf>,

    /// Log level passed to `env_logger` (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    let mut config = SimulatorConfig::new(args.listen, args.profile).with_log_level(args.log_level);
    if let Some(dir) = args.phonebook_dir {
        config = config.with_phonebook_dir(dir);
    }

    if let Err(e) = phonesim::server::run(config).await {
        log::error!("phonesimd exiting: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
