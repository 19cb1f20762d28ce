//! TCP front door: binds [`crate::config::SimulatorConfig::listen_addr`],
//! loads the profile once, and spawns one [`crate::session::SimulatorSession`]
//! per accepted peer. Adapted from the teacher's `examples/linux/src/main.rs`
//! connection setup, swapping its serial port for a listening socket.

use log::{info, warn};
use tokio::net::TcpListener;

use crate::config::SimulatorConfig;
use crate::error::Error;
use crate::profile::loader;
use crate::session::SimulatorSession;

/// Runs forever, accepting connections and driving one session per peer to
/// completion concurrently. Returns only if the listener itself fails.
pub async fn run(config: SimulatorConfig) -> Result<(), Error> {
    let mut profile = loader::load_from_path(config.profile_path())?;
    if let Some(dir) = config.phonebook_dir() {
        for seed in loader::load_phonebook_dir(dir)? {
            profile.phonebook_seeds.retain(|s| s.name != seed.name);
            profile.phonebook_seeds.push(seed);
        }
    }
    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!("listening on {}", config.listen_addr());

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("accepted connection from {peer}");
        let session = SimulatorSession::new(profile.clone());
        tokio::spawn(async move {
            if let Err(e) = session.run(stream).await {
                warn!("session with {peer} ended with error: {e}");
            } else {
                info!("session with {peer} closed");
            }
        });
    }
}
