use super::rules::{select_search_plan, AuthMatcher, PlanInputs, SETTLED_SOURCES};
use super::{LogSearch, ReplyContext, Ticket, TriageError, AUTH_REQUEST, REPRODUCE_REQUEST};
use crate::config::{Config, LogSearchConfig, TriageConfig};
use crate::evidence::{
    extract_from_capture, parse_query_url, Capture, CaptureFindings, CaptureOptions,
    DetectedUrl, EvidenceBundle, EvidenceSource, SearchParameters,
    SearchUrlDetector, UrlKind, UrlResolver,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriageDecision {
    /// A search ran and its results are worth analysing
    Proceed {
        source: EvidenceSource,
        params: SearchParameters,
        logs: Vec<String>,
    },
    /// Nothing to analyse; ask the reporter for more
    InsufficientData {
        params: Option<SearchParameters>,
        request: String,
    },
    /// Hand off without searching
    Escalate {
        category: String,
        matched_keyword: String,
        request: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub path: PathBuf,
    pub findings: CaptureFindings,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    /// Identifies this run in logs and replies
    pub run_id: Uuid,
    pub ticket_id: String,
    pub reply_context: Option<ReplyContext>,
    pub decision: TriageDecision,
    pub capture_summary: Vec<CaptureSummary>,
    pub detected_urls: Vec<DetectedUrl>,
}

/// Runs the gather, select, escalate, search sequence for a ticket
pub struct Triage {
    config: TriageConfig,
    log_search_config: LogSearchConfig,
    detector: SearchUrlDetector,
    resolver: UrlResolver,
    auth: AuthMatcher,
    log_search: Box<dyn LogSearch>,
}

impl Triage {
    pub fn new(
        config: TriageConfig,
        log_search_config: LogSearchConfig,
        detector: SearchUrlDetector,
        resolver: UrlResolver,
        log_search: Box<dyn LogSearch>,
    ) -> Result<Self, TriageError> {
        let auth = AuthMatcher::new(&config.auth_keywords)?;
        Ok(Self {
            config,
            log_search_config,
            detector,
            resolver,
            auth,
            log_search,
        })
    }

    /// Wire up the HTTP-backed resolver and log search from configuration
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let detector = SearchUrlDetector::from_config(&config.log_search, &config.url_resolution)?;
        let resolver = UrlResolver::from_config(&config.url_resolution)?;
        let log_search = super::HttpLogSearch::new(&config.log_search)?;
        Ok(Self::new(
            config.triage.clone(),
            config.log_search.clone(),
            detector,
            resolver,
            Box::new(log_search),
        )?)
    }

    pub fn run(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<TriageReport, TriageError> {
        let run_id = Uuid::new_v4();
        info!("Triaging ticket {} (run {})", ticket.id, run_id);

        let capture_summary = self.scan_captures(ticket);
        let capture = merge_bundles(&capture_summary);
        let detected_urls = self.detector.find(&ticket.full_text());

        // A usable capture wins regardless of links, so skip resolving them
        let url_params = match &capture {
            Some(bundle) if !bundle.identifiers.is_empty() => None,
            _ => self.first_complete_url(&detected_urls, now),
        };

        let inputs = PlanInputs {
            ticket,
            capture: capture.as_ref(),
            url: url_params.as_ref(),
            config: &self.config,
            default_pod: &self.log_search_config.default_pod,
            index_pattern: &self.log_search_config.default_index_pattern,
        };
        let plan = select_search_plan(&inputs);

        // An attached capture already answers the request for one
        let settled = !capture_summary.is_empty()
            || plan
                .as_ref()
                .is_some_and(|p| SETTLED_SOURCES.contains(&p.source));
        let decision = match (plan, self.auth.find(&ticket.summary_text())) {
            (_, Some(keyword)) if !settled => {
                info!("Ticket {} looks like an authentication issue ({})", ticket.id, keyword);
                TriageDecision::Escalate {
                    category: "authentication".to_string(),
                    matched_keyword: keyword,
                    request: AUTH_REQUEST.to_string(),
                }
            }
            (None, _) => {
                info!("No usable evidence for ticket {}", ticket.id);
                TriageDecision::InsufficientData {
                    params: None,
                    request: REPRODUCE_REQUEST.to_string(),
                }
            }
            (Some(plan), _) => {
                info!(
                    "Searching {} logs from {} evidence: {}",
                    plan.params.pod(),
                    plan.source,
                    plan.params.query_string()
                );
                let logs = self.log_search.search(&plan.params)?;
                if logs.is_empty() && plan.source == EvidenceSource::Manual {
                    TriageDecision::InsufficientData {
                        params: Some(plan.params),
                        request: REPRODUCE_REQUEST.to_string(),
                    }
                } else {
                    TriageDecision::Proceed {
                        source: plan.source,
                        params: plan.params,
                        logs,
                    }
                }
            }
        };

        Ok(TriageReport {
            run_id,
            ticket_id: ticket.id.clone(),
            reply_context: ticket.reply_context.clone(),
            decision,
            capture_summary,
            detected_urls,
        })
    }

    fn scan_captures(&self, ticket: &Ticket) -> Vec<CaptureSummary> {
        let options = CaptureOptions::from(&self.config);
        ticket
            .capture_paths()
            .filter_map(|path| match Capture::from_path(path) {
                Ok(capture) => Some(CaptureSummary {
                    path: path.to_path_buf(),
                    findings: extract_from_capture(&capture, &options),
                }),
                Err(e) => {
                    warn!("Ignoring capture {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    }

    /// Resolve and parse detected links in order until one yields a full search.
    ///
    /// A link that cannot be resolved counts as absent evidence.
    fn first_complete_url(
        &self,
        urls: &[DetectedUrl],
        now: DateTime<Utc>,
    ) -> Option<SearchParameters> {
        let cookies: &BTreeMap<String, String> = &self.log_search_config.cookies;
        for detected in urls {
            let full_url = match detected.kind {
                UrlKind::Direct => detected.url.clone(),
                UrlKind::Short => match self.resolver.resolve_short_url(&detected.url, cookies) {
                    Ok(Some(resolved)) => resolved,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Skipping unresolvable link {}: {}", detected.url, e);
                        continue;
                    }
                },
            };

            let params = parse_query_url(&full_url, &self.log_search_config)
                .and_then(|partial| partial.complete(now));
            match params {
                Some(params) => return Some(params),
                None => debug!("{} does not describe a complete search", detected.url),
            }
        }
        None
    }
}

fn merge_bundles(summaries: &[CaptureSummary]) -> Option<EvidenceBundle> {
    let mut bundles = summaries.iter().filter_map(|s| s.findings.bundle());
    let mut merged = bundles.next()?.clone();
    for bundle in bundles {
        merged.identifiers.extend(bundle.identifiers.iter().cloned());
        merged.timestamps.extend(bundle.timestamps.iter().copied());
    }
    Some(merged)
}
