use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialectError {
    #[error("{feature} is not supported by the {dialect} dialect")]
    FeatureNotSupported { dialect: &'static str, feature: &'static str },
}
