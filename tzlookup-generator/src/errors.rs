//! Everything that can make the generator exit non-zero, and with which
//! code. The contract with the packaging scripts: 1 for validation
//! failures, 2 for unusable invocations or unreadable inputs, 3 for inputs
//! so broken that no validation was attempted.

use countryzones::aliases::AliasError;
use countryzones::input::InputError;
use countryzones::resolver::ResolverError;
use countryzones::rules::RulesError;
use countryzones::zone_tab::ZoneTabError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error parsing options: {0}")]
    Options(#[from] getopts::Fail),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Schema(#[from] InputError),
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error(transparent)]
    ZoneTab(#[from] ZoneTabError),
    #[error(transparent)]
    Version(#[from] ResolverError),
    #[error("validation failed:\n{0}")]
    Validation(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Options(_) | Error::Io { .. } => 2,
            Error::Rules(RulesError::Io { .. }) => 2,
            Error::Rules(RulesError::Parse { .. }) => 1,
            Error::Schema(_) | Error::Alias(_) | Error::Version(_) => 3,
            Error::ZoneTab(_) => 1,
            Error::Validation(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_packaging_contract() {
        let missing = Error::Io {
            path: "countryzones.txt".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(missing.exit_code(), 2);

        let schema = Error::Schema(InputError::Schema {
            file: "countryzones.txt".to_owned(),
            line: 3,
            message: "unknown field".to_owned(),
        });
        assert_eq!(schema.exit_code(), 3);

        let cycle = Error::Alias(AliasError::AliasCycle {
            file: "backward".to_owned(),
            link: "A".to_owned(),
            via: "B".to_owned(),
        });
        assert_eq!(cycle.exit_code(), 3);

        assert_eq!(Error::Validation("boom".to_owned()).exit_code(), 1);
    }
}
