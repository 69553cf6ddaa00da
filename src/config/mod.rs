mod settings;

use config::{Config, Environment, File};

use crate::utils::Result;

pub use settings::{
    FleetBackend, FleetSettings, LogSettings, ServerSettings, ServiceSettings, SessionSettings,
    Settings, StoreBackend, StoreSettings,
};

/// Loads the configuration from `config/default.*` (optional) and
/// `RELAYCHAT_*` environment variables, e.g. `RELAYCHAT_SERVER__PORT=9000`.
/// Anything left unspecified keeps its default.
pub fn load_config() -> Result<Settings> {
    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("RELAYCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    settings.session.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests;
