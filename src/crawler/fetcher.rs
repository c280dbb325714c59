//! HTTP fetcher for comment and statistics pages
//!
//! This module handles every request the harvester sends, including:
//! - Building the HTTP client with browser-like headers and timeouts
//! - Building deterministic endpoint queries from a parameter bag
//! - Pacing each request through the [`RateGovernor`]
//! - Classifying transport and status failures
//! - Recording redacted evidence for every failed request

use crate::config::{CollectionConfig, Config, EndpointConfig, EndpointParams};
use crate::crawler::governor::{GovernorEvent, RateGovernor};
use crate::monitor::{EvidenceRecorder, FailedRequest};
use crate::state::{ArticleKey, PageScope};
use crate::{ConfigError, HarvestError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, REFERER};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Accept header sent with every API request
const ACCEPT_VALUE: &str = "application/json, text/javascript, */*; q=0.01";

/// A successfully fetched page body and the exact URL it came from
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `endpoint` - Endpoint addressing, including the user agent
/// * `collection` - Collection limits carrying the timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    endpoint: &EndpointConfig,
    collection: &CollectionConfig,
) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(endpoint.user_agent.clone())
        .timeout(Duration::from_secs(collection.read_timeout_secs))
        .connect_timeout(Duration::from_secs(collection.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Governed fetch adapter for the comment API
#[derive(Debug)]
pub struct CommentFetcher {
    client: Client,
    endpoint: EndpointConfig,
    governor: RateGovernor,
    evidence: Option<EvidenceRecorder>,
    header_map: HeaderMap,
    /// Request headers as recorded in evidence (before redaction)
    headers: Vec<(String, String)>,
    pending_events: Vec<GovernorEvent>,
}

impl CommentFetcher {
    /// Creates a fetcher with a fresh governor for one run
    pub fn new(config: &Config, evidence: Option<EvidenceRecorder>) -> Result<Self> {
        let client = build_http_client(&config.endpoint, &config.collection)?;
        let governor = RateGovernor::new(&config.rate_limit, &config.auto_throttle);
        Self::with_client(client, &config.endpoint, governor, evidence)
    }

    pub fn with_client(
        client: Client,
        endpoint: &EndpointConfig,
        governor: RateGovernor,
        evidence: Option<EvidenceRecorder>,
    ) -> Result<Self> {
        let mut headers = vec![
            ("User-Agent".to_string(), endpoint.user_agent.clone()),
            ("Referer".to_string(), endpoint.referer.clone()),
            ("Accept".to_string(), ACCEPT_VALUE.to_string()),
        ];
        headers.extend(
            endpoint
                .extra_headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        let mut header_map = HeaderMap::new();
        header_map.insert(REFERER, header_value(&endpoint.referer)?);
        header_map.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        for (name, value) in &endpoint.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Validation(format!("Invalid header name '{}': {}", name, e))
            })?;
            header_map.insert(name, header_value(value)?);
        }

        Ok(Self {
            client,
            endpoint: endpoint.clone(),
            governor,
            evidence,
            header_map,
            headers,
            pending_events: Vec::new(),
        })
    }

    /// Fetches one comment or reply page
    ///
    /// Always paces through the governor first and reports the response
    /// status back to it afterwards.
    ///
    /// # Arguments
    ///
    /// * `key` - The article being walked
    /// * `page` - 1-based page number within the walk
    /// * `scope` - Top-level listing or reply listing
    /// * `parent_id` - Parent comment for reply pages
    /// * `params` - The endpoint candidate in use
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - A 2xx/3xx response body
    /// * `Err(HarvestError)` - Classified transport, status or ban failure
    pub async fn fetch(
        &mut self,
        key: &ArticleKey,
        page: u32,
        scope: PageScope,
        parent_id: Option<&str>,
        params: &EndpointParams,
    ) -> Result<FetchedPage> {
        let query = self.build_comment_query(key, page, scope, parent_id, params);
        let context = json!({
            "scope": scope.as_str(),
            "oid": key.oid,
            "aid": key.aid,
            "page": page,
            "parent_id": parent_id,
            "params": query_json(&query),
        });
        let base = self.endpoint.comment_url.clone();
        self.send(&base, &query, context).await
    }

    /// Fetches the demographic statistics of an article
    pub async fn fetch_stats(
        &mut self,
        key: &ArticleKey,
        params: &EndpointParams,
    ) -> Result<FetchedPage> {
        let query = self.build_stats_query(key, params);
        let context = json!({
            "scope": "comment_stats",
            "oid": key.oid,
            "aid": key.aid,
            "params": query_json(&query),
        });
        let base = self.endpoint.stats_url.clone();
        self.send(&base, &query, context).await
    }

    async fn send(
        &mut self,
        base: &str,
        query: &[(&'static str, String)],
        context: serde_json::Value,
    ) -> Result<FetchedPage> {
        if let Some(reason) = self.governor.stop_reason() {
            return Err(HarvestError::Halted {
                reason: reason.to_string(),
            });
        }

        let url = Url::parse_with_params(base, query)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", base, e)))?;
        let url_text = url.to_string();

        self.governor.wait().await;
        debug!("GET {}", url_text);

        let response = match self
            .client
            .get(url)
            .headers(self.header_map.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let error_type = if e.is_timeout() {
                    "TIMEOUT"
                } else if e.is_connect() {
                    "CONNECT_ERROR"
                } else {
                    "REQUEST_EXCEPTION"
                };
                self.log_evidence(&url_text, None, error_type, context, None);
                return Err(HarvestError::Network {
                    url: url_text,
                    source: e,
                });
            }
        };

        let status = response.status().as_u16();
        if let Some(event) = self.governor.observe(status) {
            self.pending_events.push(event);
        }

        if status >= 400 {
            let body = response.bytes().await.ok();
            self.log_evidence(&url_text, Some(status), "HTTP_ERROR", context, body.as_deref());

            if status == self.ban_status() {
                return Err(HarvestError::Banned {
                    url: url_text,
                    status,
                });
            }
            return Err(HarvestError::HttpStatus {
                url: url_text,
                status,
            });
        }

        match response.text().await {
            Ok(body) => Ok(FetchedPage {
                url: url_text,
                status,
                body,
            }),
            Err(e) => {
                self.log_evidence(&url_text, Some(status), "BODY_READ_ERROR", context, None);
                Err(HarvestError::Network {
                    url: url_text,
                    source: e,
                })
            }
        }
    }

    /// Builds the query of a comment or reply listing request
    ///
    /// Reply scope forces the child listing mode, attaches the parent id and
    /// uses the reply page size.
    pub fn build_comment_query(
        &self,
        key: &ArticleKey,
        page: u32,
        scope: PageScope,
        parent_id: Option<&str>,
        params: &EndpointParams,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("ticket", params.ticket.clone()),
            ("templateId", params.template_id.clone()),
            ("pool", params.pool.clone()),
            ("lang", self.endpoint.lang.clone()),
            ("country", self.endpoint.country.clone()),
            ("objectId", self.object_id(key)),
            ("page", page.to_string()),
            ("pageSize", params.page_size.to_string()),
            ("indexSize", params.index_size.to_string()),
            ("pageType", "more".to_string()),
            ("listType", "OBJECT".to_string()),
            ("sort", params.sort.clone()),
            ("initialize", (page == 1).to_string()),
            ("replyPageSize", params.reply_page_size.to_string()),
            ("useAltSort", "true".to_string()),
            ("includeAllStatus", "true".to_string()),
        ];

        push_optional(&mut query, "cv", params.cv.as_deref());
        push_optional(&mut query, "template", params.template.as_deref());

        match scope {
            PageScope::Comment => {
                push_optional(&mut query, "moreType", params.more_type.as_deref());
            }
            PageScope::Reply => {
                set_param(&mut query, "pageSize", params.reply_page_size.to_string());
                query.push(("moreType", "child".to_string()));
                query.push(("parentCommentNo", parent_id.unwrap_or_default().to_string()));
            }
        }

        query
    }

    /// Builds the query of a statistics request
    pub fn build_stats_query(
        &self,
        key: &ArticleKey,
        params: &EndpointParams,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("lang", self.endpoint.lang.clone()),
            ("ticket", params.ticket.clone()),
            ("templateId", params.template_id.clone()),
            ("pool", params.pool.clone()),
            ("objectId", self.object_id(key)),
        ];
        push_optional(&mut query, "cv", params.cv.as_deref());
        push_optional(&mut query, "template", params.template.as_deref());
        query
    }

    /// Records evidence for a failure detected after the fetch returned
    ///
    /// Evidence write failures are logged and never mask the original error.
    pub fn log_evidence(
        &self,
        url: &str,
        status: Option<u16>,
        error_type: &str,
        context: serde_json::Value,
        body: Option<&[u8]>,
    ) {
        let Some(recorder) = &self.evidence else {
            return;
        };

        let request = FailedRequest {
            method: "GET",
            url,
            status,
            error_type,
            headers: &self.headers,
            context,
            body,
        };
        if let Err(e) = recorder.log_failed_request(&request) {
            warn!("Failed to record evidence for {}: {}", url, e);
        }
    }

    /// Takes the governor transitions observed since the last call
    pub fn drain_events(&mut self) -> Vec<GovernorEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    fn ban_status(&self) -> u16 {
        self.governor.ban_status()
    }

    fn object_id(&self, key: &ArticleKey) -> String {
        format!("{}{},{}", self.endpoint.object_prefix, key.oid, key.aid)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        HarvestError::Config(ConfigError::Validation(format!(
            "Invalid header value: {}",
            e
        )))
    })
}

fn push_optional(query: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        query.push((name, value.to_string()));
    }
}

fn set_param(query: &mut [(&'static str, String)], name: &str, value: String) {
    if let Some(slot) = query.iter_mut().find(|(n, _)| *n == name) {
        slot.1 = value;
    }
}

fn query_json(query: &[(&'static str, String)]) -> serde_json::Value {
    query
        .iter()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoThrottleConfig, RateLimitConfig};

    fn fetcher() -> CommentFetcher {
        let config = Config::with_database(":memory:");
        CommentFetcher::new(&config, None).unwrap()
    }

    fn value<'a>(query: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_build_http_client() {
        let config = Config::with_database(":memory:");
        assert!(build_http_client(&config.endpoint, &config.collection).is_ok());
    }

    #[test]
    fn test_comment_query() {
        let fetcher = fetcher();
        let key = ArticleKey::new("001", "0000001");
        let mut params = EndpointParams::new("news", "view_politics");
        params.cv = Some("20240101".to_string());

        let query = fetcher.build_comment_query(&key, 1, PageScope::Comment, None, &params);
        assert_eq!(value(&query, "objectId"), Some("news001,0000001"));
        assert_eq!(value(&query, "templateId"), Some("view_politics"));
        assert_eq!(value(&query, "initialize"), Some("true"));
        assert_eq!(value(&query, "cv"), Some("20240101"));
        assert_eq!(value(&query, "moreType"), None);
        assert_eq!(value(&query, "parentCommentNo"), None);

        let query = fetcher.build_comment_query(&key, 2, PageScope::Comment, None, &params);
        assert_eq!(value(&query, "initialize"), Some("false"));
    }

    #[test]
    fn test_reply_query_overrides() {
        let fetcher = fetcher();
        let key = ArticleKey::new("001", "0000001");
        let mut params = EndpointParams::default();
        params.page_size = 50;
        params.reply_page_size = 10;
        params.more_type = Some("next".to_string());

        let query = fetcher.build_comment_query(&key, 3, PageScope::Reply, Some("777"), &params);
        assert_eq!(value(&query, "moreType"), Some("child"));
        assert_eq!(value(&query, "parentCommentNo"), Some("777"));
        assert_eq!(value(&query, "pageSize"), Some("10"));
        assert_eq!(value(&query, "page"), Some("3"));
        assert_eq!(query.iter().filter(|(n, _)| *n == "moreType").count(), 1);
    }

    #[test]
    fn test_stats_query() {
        let fetcher = fetcher();
        let query = fetcher.build_stats_query(&ArticleKey::new("1", "2"), &EndpointParams::default());
        let names: Vec<_> = query.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["lang", "ticket", "templateId", "pool", "objectId"]);
    }

    #[test]
    fn test_invalid_extra_header_rejected() {
        let mut endpoint = EndpointConfig::default();
        endpoint
            .extra_headers
            .insert("bad header".to_string(), "x".to_string());
        let governor = RateGovernor::new(&RateLimitConfig::default(), &AutoThrottleConfig::default());
        let result = CommentFetcher::with_client(Client::new(), &endpoint, governor, None);
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }

    #[tokio::test]
    async fn test_stopped_governor_halts_before_sending() {
        let mut config = Config::with_database(":memory:");
        config.endpoint.comment_url = "http://127.0.0.1:9/list".to_string();
        config.rate_limit = RateLimitConfig {
            baseline_min_delay: 0.0,
            min_delay: 0.0,
            max_delay: 0.0,
        };
        let mut fetcher = CommentFetcher::new(&config, None).unwrap();
        fetcher.governor.observe(403);

        let err = fetcher
            .fetch(
                &ArticleKey::new("1", "2"),
                1,
                PageScope::Comment,
                None,
                &EndpointParams::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Halted { .. }));
        assert_eq!(fetcher.drain_events().len(), 0);
    }
}
