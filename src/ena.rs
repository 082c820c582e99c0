use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::EnaSettings;
use crate::domain::Source;
use crate::error::KiraError;
use crate::source::MetadataSource;

/// ENA Portal API `search` endpoint, `read_run` results as TSV.
#[derive(Clone)]
pub struct EnaPortalClient {
    client: Client,
    settings: EnaSettings,
}

impl EnaPortalClient {
    pub fn new(settings: EnaSettings) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-mf/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::EnaHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| KiraError::EnaHttp(err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.settings.base_url.trim_end_matches('/'))
    }

    pub fn search_params(&self, query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("result", "read_run".to_string()),
            ("query", query.to_string()),
            ("fields", self.settings.fields.join(",")),
            ("format", "tsv".to_string()),
            ("limit", self.settings.limit.to_string()),
        ]
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<(), KiraError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ENA request failed".to_string());
            return Err(KiraError::EnaStatus {
                status,
                message: message.trim().to_string(),
            });
        }
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| KiraError::EnaHttp(err.to_string()))?;
        Ok(())
    }
}

impl MetadataSource for EnaPortalClient {
    fn source(&self) -> Source {
        Source::Ena
    }

    fn count(&self, _query: &str) -> Option<Result<String, KiraError>> {
        None
    }

    fn fetch(&self, query: &str, destination: &Path) -> Result<(), KiraError> {
        let response = self
            .client
            .get(self.search_url())
            .query(&self.search_params(query))
            .send()
            .map_err(|err| KiraError::EnaHttp(err.to_string()))?;
        self.write_response_to_file(response, destination)
    }
}
