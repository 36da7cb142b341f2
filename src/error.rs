//! Crate-wide error taxonomy.
//!
//! Each layer has its own error enum; [`Error`] sorts them into what the
//! device does about them. Transient errors are logged and retried by the
//! activity that raised them. Configuration errors stop startup.

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::sensor::SensorError;
use crate::session::BrokerError;

/// Top-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The radio refused a connect request.
    TransientLink(LinkError),
    /// The broker could not be reached or the session broke.
    TransientBroker(BrokerError),
    /// A sensor read or decode failed.
    TransientSensor(SensorError),
    /// The configuration is unusable.
    Configuration(ConfigError),
    /// An activity thread could not be spawned.
    Startup,
}

impl Error {
    /// Whether the failing activity retries on its own.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::Configuration(_) | Error::Startup)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Error::TransientLink(e)
    }
}

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        Error::TransientBroker(e)
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Error::TransientSensor(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Configuration(e)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::TransientLink(e) => defmt::write!(f, "TransientLink({})", e),
            Error::TransientBroker(e) => defmt::write!(f, "TransientBroker({})", e),
            Error::TransientSensor(e) => defmt::write!(f, "TransientSensor({})", e),
            Error::Configuration(e) => defmt::write!(f, "Configuration({})", e),
            Error::Startup => defmt::write!(f, "Startup"),
        }
    }
}
