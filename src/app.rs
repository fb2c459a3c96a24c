//! Application bootstrap: configuration, profiles, modules and container in one call.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigLoader};
use crate::web::Router;
use crate::{ActiveProfiles, BootError, Container, Module, Registry};

/// Environment variable holding the log filter, e.g. `SPROUT_LOG=sprout=debug`
pub const LOG_ENV: &str = "SPROUT_LOG";

/// Default directory of the `application*.yaml` files
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Install a formatting subscriber filtered by `SPROUT_LOG`, or by `default_directive` when unset.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub struct Application {
    config_dir: PathBuf,
    registry: Arc<Registry>,
    modules: Vec<Box<dyn Module>>,
    auto_register: bool,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    /// Load the configuration, compute the active profiles, install the modules and build the container
    pub fn run(self) -> Result<ApplicationContext, BootError> {
        let loader = ConfigLoader::new(&self.config_dir);
        let base = loader.load_base()?;
        let profiles = ActiveProfiles::from_sources(&base);
        info!(%profiles, "active profiles");

        let config = loader.load(&profiles)?;
        for module in &self.modules {
            self.registry.install(module.as_ref(), &profiles);
        }

        // configuration first, raw environment for keys absent from the files
        let values = config.clone();
        let container = Container::builder()
            .registry(&self.registry)
            .value_source(move |key: &str| {
                values.get_string(key).or_else(|| std::env::var(key).ok())
            })
            .auto_register(self.auto_register)
            .build()?;

        Ok(ApplicationContext {
            profiles,
            config,
            container,
        })
    }
}

#[derive(Default)]
pub struct ApplicationBuilder {
    config_dir: Option<PathBuf>,
    registry: Option<Arc<Registry>>,
    modules: Vec<Box<dyn Module>>,
    auto_register: bool,
}

impl ApplicationBuilder {
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Registry receiving the modules, a fresh one by default
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn build(self) -> Application {
        Application {
            config_dir: self
                .config_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            registry: self.registry.unwrap_or_default(),
            modules: self.modules,
            auto_register: self.auto_register,
        }
    }
}

/// A running application
pub struct ApplicationContext {
    pub profiles: ActiveProfiles,
    pub config: Config,
    pub container: Container,
}

impl ApplicationContext {
    pub fn router(&self) -> Router<'_> {
        Router::from_container(&self.container)
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("profiles", &self.profiles)
            .field("container", &self.container)
            .finish()
    }
}
