use thiserror::Error;
use url::Url;

/// Wardview client configuration: where the ward API lives.
#[derive(Clone, Debug)]
pub struct Config {
    base_url: Url,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid api configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Build a config from a base address. A `WARDVIEW_API_BASE` environment
    /// variable overrides the supplied value so callers and env stay
    /// consistent. A bare host gets a scheme inferred from its address class.
    pub fn new(api_base: impl AsRef<str>) -> Result<Self, ConfigError> {
        let mut base = std::env::var("WARDVIEW_API_BASE")
            .ok()
            .and_then(|s| {
                let trimmed = s.trim().to_string();
                if trimmed.is_empty() { None } else { Some(trimmed) }
            })
            .unwrap_or_else(|| api_base.as_ref().trim().to_string());
        if base.is_empty() {
            return Err(ConfigError::Invalid("api base url cannot be empty".into()));
        }
        if !base.contains("://") {
            let inferred = infer_scheme(&base);
            base = format!("{inferred}{base}");
        }
        let parsed = Url::parse(&base)
            .map_err(|err| ConfigError::Invalid(format!("invalid api base url: {err}")))?;
        Ok(Self { base_url: parsed })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new("127.0.0.1:8000")
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The websocket endpoint for a push channel: `/ws/STATION` for the
    /// station scope, `/ws/{token}` for an admission scope.
    pub fn channel_url(&self, channel: &str) -> Result<Url, ConfigError> {
        let mut url = self
            .base_url
            .join(&format!("ws/{channel}"))
            .map_err(|err| ConfigError::Invalid(format!("invalid channel url: {err}")))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::Invalid("unable to set websocket scheme".into()))?;
        Ok(url)
    }
}

/// The ward API is deployed either on the hospital LAN (plain http) or
/// behind a public TLS endpoint; pick the scheme from the address class.
fn infer_scheme(base: &str) -> &'static str {
    use std::net::IpAddr;

    let authority = base.split('/').next().unwrap_or(base);
    let host = if let Some(inner) = authority.strip_prefix('[') {
        inner.split(']').next().unwrap_or(inner)
    } else {
        authority.rsplit_once(':').map_or(authority, |(host, _)| host)
    };
    let local = match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_unspecified(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback(),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    };
    if local { "http://" } else { "https://" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_http_for_local_hosts() {
        for host in [
            "localhost",
            "localhost:8000",
            "127.0.0.1:8000",
            "10.20.0.4",
            "192.168.1.10",
            "0.0.0.0:8000",
            "[::1]",
        ] {
            assert_eq!(infer_scheme(host), "http://");
        }
    }

    #[test]
    fn infers_https_for_public_hosts() {
        assert_eq!(infer_scheme("ward.example.org"), "https://");
        assert_eq!(infer_scheme("13.215.162.4"), "https://");
    }

    #[test]
    fn channel_url_swaps_scheme() {
        let config = Config::new("https://ward.example.org").unwrap();
        let url = config.channel_url("STATION").unwrap();
        assert_eq!(url.as_str(), "wss://ward.example.org/ws/STATION");

        let config = Config::new("http://127.0.0.1:8000").unwrap();
        let url = config.channel_url("tok-1").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/tok-1");
    }
}
