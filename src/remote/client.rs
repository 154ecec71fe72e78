// HTTP client of the scan server

use crate::config::ServerConfig;
use crate::remote::protocol::{error_message, parse_scan_info, parse_submit_response};
use crate::remote::{RemoteError, RemoteResult, ScanId, ScanInfo, ScanService};
use crate::scan::ScanCommand;
use crate::xml;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Blocking client of a scan server at `http://host:port/`
///
/// Holds only the base address and a connection pool, so one instance can
/// be shared by any number of documents.
#[derive(Debug, Clone)]
pub struct ScanClient {
    base: Url,
    http: Client,
}

impl ScanClient {
    pub fn new(config: &ServerConfig) -> RemoteResult<Self> {
        let base = Url::parse(&config.base_url())
            .map_err(|e| RemoteError::InvalidAddress(format!("{}: {}", config.base_url(), e)))?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RemoteError::ServiceUnavailable(e.to_string()))?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidAddress(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn read(response: Response) -> RemoteResult<(StatusCode, String)> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RemoteError::ServiceUnavailable(e.to_string()))?;
        Ok((status, body))
    }

    /// GET a resource of an existing scan
    fn get_scan(&self, id: ScanId, segments: &[&str]) -> RemoteResult<String> {
        let id_text = id.to_string();
        let mut path = vec!["scan", id_text.as_str()];
        path.extend_from_slice(segments);
        let url = self.url(&path)?;

        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/xml")
            .send()
            .map_err(|e| RemoteError::ServiceUnavailable(e.to_string()))?;
        let (status, body) = Self::read(response)?;

        match status {
            status if status.is_success() => Ok(body),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id)),
            status => Err(RemoteError::ServiceUnavailable(format!(
                "HTTP {}: {}",
                status,
                error_message(&body)
            ))),
        }
    }
}

impl ScanService for ScanClient {
    fn submit(&self, name: &str, commands: &[ScanCommand]) -> RemoteResult<ScanId> {
        let body = xml::encode_string(commands)?;
        let url = self.url(&["scan", name])?;

        tracing::debug!(%url, commands = commands.len(), "POST scan");
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body)
            .send()
            .map_err(|e| RemoteError::ServiceUnavailable(e.to_string()))?;
        let (status, body) = Self::read(response)?;

        if status.is_success() {
            let id = parse_submit_response(&body)?;
            tracing::info!(scan = %id, name, "Submitted scan");
            return Ok(id);
        }
        match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                Err(RemoteError::ServiceUnavailable(error_message(&body)))
            }
            _ => Err(RemoteError::RejectedCommand(error_message(&body))),
        }
    }

    fn fetch(&self, id: ScanId) -> RemoteResult<Vec<ScanCommand>> {
        let body = self.get_scan(id, &["commands"])?;
        Ok(xml::decode_str(&body)?)
    }

    fn query_status(&self, id: ScanId) -> RemoteResult<ScanInfo> {
        let body = self.get_scan(id, &[])?;
        parse_scan_info(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_built_from_config() {
        let config = ServerConfig {
            host: "scan-host".to_string(),
            port: 4810,
            ..ServerConfig::default()
        };
        let client = ScanClient::new(&config).unwrap();

        assert_eq!(client.base_url().as_str(), "http://scan-host:4810/");
        assert_eq!(
            client.url(&["scan", "7", "commands"]).unwrap().as_str(),
            "http://scan-host:4810/scan/7/commands"
        );
        // Scan names are path-escaped
        assert_eq!(
            client.url(&["scan", "my scan/1"]).unwrap().as_str(),
            "http://scan-host:4810/scan/my%20scan%2F1"
        );
    }

    #[test]
    fn test_invalid_host() {
        let config = ServerConfig {
            host: "bad host".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            ScanClient::new(&config),
            Err(RemoteError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_unreachable_server_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            timeout_secs: 2,
        };
        let client = ScanClient::new(&config).unwrap();
        assert!(matches!(
            client.fetch(ScanId(1)),
            Err(RemoteError::ServiceUnavailable(_))
        ));
    }
}
