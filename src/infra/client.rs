use std::time::Duration;

use reqwest::Client;

use super::error::InfraError;

pub fn user_agent() -> &'static str {
    concat!("purgeman/", env!("CARGO_PKG_VERSION"))
}

/// Shared outbound client. Without `timeout` requests run to the
/// transport's own completion.
pub fn build_http_client(timeout: Option<Duration>) -> Result<Client, InfraError> {
    let mut builder = Client::builder().user_agent(user_agent());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
