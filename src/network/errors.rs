use thiserror::Error;

// * Unified Error type for the Network Layer.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("client build failed: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error("invalid SOCKS5 proxy address `{0}`")]
    InvalidProxyAddress(String),

    #[error("invalid URL `{0}`")]
    InvalidUrl(String),
}
