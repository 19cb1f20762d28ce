use std::net::SocketAddr;
use std::path::PathBuf;

/// Process-level configuration for one simulator instance.
///
/// Built up with the usual chained-setter style, then handed to
/// [`crate::server::run`].
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    listen_addr: SocketAddr,
    profile_path: PathBuf,
    phonebook_dir: Option<PathBuf>,
    log_level: Option<String>,
}

impl SimulatorConfig {
    pub fn new(listen_addr: SocketAddr, profile_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr,
            profile_path: profile_path.into(),
            phonebook_dir: None,
            log_level: None,
        }
    }

    /// A directory of standalone `<phonebook>` XML fragments (one
    /// top-level `<phonebook name="..." size="...">` per file), loaded
    /// after the profile and overriding any profile-seeded phonebook of
    /// the same name.
    pub fn with_phonebook_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.phonebook_dir = Some(dir.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn profile_path(&self) -> &std::path::Path {
        &self.profile_path
    }

    pub fn phonebook_dir(&self) -> Option<&std::path::Path> {
        self.phonebook_dir.as_deref()
    }

    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }
}
