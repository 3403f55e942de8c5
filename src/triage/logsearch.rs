//! Log-search backend client

use super::LogSearchError;
use crate::config::LogSearchConfig;
use crate::evidence::{cookie_header, SearchParameters};
use chrono::SecondsFormat;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Runs one search and returns the matching log messages
pub trait LogSearch: Send + Sync {
    fn search(&self, params: &SearchParameters) -> Result<Vec<String>, LogSearchError>;
}

/// Talks to an OpenSearch Dashboards `_msearch` endpoint per pod
pub struct HttpLogSearch {
    client: Client,
    pod_urls: BTreeMap<String, String>,
    cookies: Option<String>,
    max_results: usize,
}

impl HttpLogSearch {
    pub fn new(config: &LogSearchConfig) -> Result<Self, LogSearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("osd-xsrf"),
            HeaderValue::from_static("true"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LogSearchError::Http {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            pod_urls: config.pod_urls.clone(),
            cookies: cookie_header(&config.cookies),
            max_results: config.max_results,
        })
    }

    fn endpoint(&self, pod: &str) -> Result<String, LogSearchError> {
        let base = self
            .pod_urls
            .get(pod)
            .ok_or_else(|| LogSearchError::UnknownPod(pod.to_string()))?;
        Ok(format!("{}/internal/_msearch", base.trim_end_matches('/')))
    }
}

impl LogSearch for HttpLogSearch {
    fn search(&self, params: &SearchParameters) -> Result<Vec<String>, LogSearchError> {
        let url = self.endpoint(params.pod())?;
        let body = build_msearch_body(params, self.max_results);
        debug!("POST {} query={:?}", url, params.query_string());

        let mut request = self.client.post(&url).json(&body);
        if let Some(cookies) = &self.cookies {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                LogSearchError::Timeout { url: url.clone() }
            } else {
                LogSearchError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().map_err(|e| LogSearchError::Http {
            url: url.clone(),
            message: e.to_string(),
        })?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LogSearchError::AuthenticationRequired {
                pod: params.pod().to_string(),
            });
        }

        let messages = parse_msearch_response(&text).map_err(|e| match e {
            LogSearchError::AuthenticationRequired { .. } => {
                LogSearchError::AuthenticationRequired {
                    pod: params.pod().to_string(),
                }
            }
            other => other,
        })?;
        info!("Log search on {} returned {} messages", params.pod(), messages.len());
        Ok(messages)
    }
}

/// Build the multi-search request body for one query
pub fn build_msearch_body(params: &SearchParameters, max_results: usize) -> Value {
    let range = params.time_range();
    json!({
        "searches": [{
            "header": { "index": params.index_pattern() },
            "body": {
                "version": true,
                "size": max_results,
                "sort": [
                    { "@timestamp": { "order": "asc", "unmapped_type": "boolean" } }
                ],
                "query": {
                    "bool": {
                        "must": [{
                            "query_string": {
                                "query": params.query_string(),
                                "analyze_wildcard": true,
                                "default_operator": "AND"
                            }
                        }],
                        "filter": [{
                            "range": {
                                "@timestamp": {
                                    "gte": range.gte.to_rfc3339_opts(SecondsFormat::Millis, true),
                                    "lte": range.lte.to_rfc3339_opts(SecondsFormat::Millis, true),
                                    "format": "strict_date_optional_time"
                                }
                            }
                        }]
                    }
                },
                "track_total_hits": false
            }
        }]
    })
}

/// Pull `_source.message` out of every hit of the first response.
///
/// A body that is not JSON is the login page of an expired session.
pub fn parse_msearch_response(body: &str) -> Result<Vec<String>, LogSearchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|_| LogSearchError::AuthenticationRequired {
            pod: String::new(),
        })?;

    let hits = value
        .pointer("/body/responses/0/hits/hits")
        .or_else(|| value.pointer("/responses/0/hits/hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            LogSearchError::MalformedResponse("missing responses[0].hits.hits".to_string())
        })?;

    Ok(hits
        .iter()
        .filter_map(|hit| hit.pointer("/_source/message"))
        .map(|message| match message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}
