use ::core::fmt::Display;
use ::std::fmt;

pub type Result<T> = std::result::Result<T, SparkwatchError>;

/// Kinds of sparkwatch errors, used to decide how a failure is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SparkwatchErrorType {
    NotAllowed,
    NotFound,
    Cancelled,
    FailToLoadConfig,
    FailToCreateClient,
    FailToListApplications,
    FailToGetReport,
    FailToKillApplication,
    FailToCreateIngress,
    Other,
}

impl Display for SparkwatchErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            Self::NotAllowed => "Not allowed",
            Self::NotFound => "Not found",
            Self::Cancelled => "Cancelled",
            Self::FailToLoadConfig => "Fail to load config",
            Self::FailToCreateClient => "Fail to create cluster client",
            Self::FailToListApplications => "Fail to list applications",
            Self::FailToGetReport => "Fail to get application report",
            Self::FailToKillApplication => "Fail to kill application",
            Self::FailToCreateIngress => "Fail to create Spark UI ingress",
            Self::Other => "Other error",
        };
        write!(f, "{}", prefix)
    }
}

/// Error type for all sparkwatch crates: an error kind plus its source.
#[derive(Debug)]
pub struct SparkwatchError {
    error_type: SparkwatchErrorType,
    source: anyhow::Error,
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pub fn $name(source: impl Into<anyhow::Error>) -> Self {
            Self::new(SparkwatchErrorType::$variant, source)
        }
    };
}

impl SparkwatchError {
    fn new(error_type: SparkwatchErrorType, source: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            source: source.into(),
        }
    }

    pub fn get_error_type(&self) -> SparkwatchErrorType {
        self.error_type
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_type == SparkwatchErrorType::Cancelled
    }

    error_constructor!(not_allowed, NotAllowed);
    error_constructor!(not_found, NotFound);
    error_constructor!(cancelled, Cancelled);
    error_constructor!(fail_to_load_config, FailToLoadConfig);
    error_constructor!(fail_to_create_client, FailToCreateClient);
    error_constructor!(fail_to_list_applications, FailToListApplications);
    error_constructor!(fail_to_get_report, FailToGetReport);
    error_constructor!(fail_to_kill_application, FailToKillApplication);
    error_constructor!(fail_to_create_ingress, FailToCreateIngress);
    error_constructor!(other, Other);
}

impl Display for SparkwatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.source)
    }
}

impl std::error::Error for SparkwatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

impl<T> From<SparkwatchError> for Result<T> {
    fn from(val: SparkwatchError) -> Self {
        Result::Err(val)
    }
}

#[cfg(test)]
mod tests {
    use ::anyhow::anyhow;

    use super::*;

    #[test]
    fn display_error_with_prefix() {
        let error = SparkwatchError::not_allowed(anyhow!("tag cannot be empty."));
        assert_eq!(error.to_string(), "Not allowed: tag cannot be empty.");
    }

    #[test]
    fn error_type_is_preserved() {
        let error = SparkwatchError::cancelled(anyhow!("stopped"));
        assert_eq!(error.get_error_type(), SparkwatchErrorType::Cancelled);
        assert!(error.is_cancelled());
    }

    #[test]
    fn convert_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = SparkwatchError::fail_to_load_config(io);
        assert!(error.to_string().starts_with("Fail to load config:"));
    }
}
