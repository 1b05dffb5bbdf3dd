//! Core data types flowing through the pipeline.

use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use mime::Mime;
use url::Url;

/// One unit of crawl work: a URL plus its broker delivery handle and, once
/// fetched, the response. A job is owned by exactly one stage task at a time
/// and handed forward by channel send.
#[derive(Debug)]
pub struct Job {
    /// Raw delivery payload.
    pub url: String,
    acker: Acker,
    pub response: Option<Response>,
}

impl Job {
    pub fn new(url: String, acker: Acker) -> Self {
        Self {
            url,
            acker,
            response: None,
        }
    }

    pub fn is_html(&self) -> bool {
        self.response.as_ref().map(|r| r.is_html()).unwrap_or(false)
    }

    /// Acknowledge the delivery. Failures are logged, never propagated: the
    /// broker will redeliver and idempotent persistence absorbs the repeat.
    pub async fn ack(&self, stage: &str) {
        if let Err(e) = self.acker.ack(BasicAckOptions::default()).await {
            tracing::warn!(url = %self.url, stage, error = %e, "Ack failed");
        }
    }

    /// Reject the delivery, optionally requeueing it.
    pub async fn reject(&self, requeue: bool, stage: &str) {
        if let Err(e) = self.acker.reject(BasicRejectOptions { requeue }).await {
            tracing::warn!(url = %self.url, stage, requeue, error = %e, "Reject failed");
        }
    }
}

/// A fetched response. Immutable after the fetch stage attaches it.
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Vec<u8>,
    pub mime: Mime,
    /// URL the body was served from, after any explicit redirect handling.
    pub final_url: Url,
    /// True when the body was synthesized from a 3xx `Location` header.
    pub from_redirect: bool,
}

impl Response {
    pub fn is_html(&self) -> bool {
        is_html(&self.mime)
    }
}

/// HTML detection used for extraction gating and filename derivation.
pub fn is_html(mime: &Mime) -> bool {
    (mime.type_() == mime::TEXT && mime.subtype() == mime::HTML)
        || (mime.type_() == mime::APPLICATION && mime.subtype().as_str() == "xhtml")
}

/// The set of content types the worker will persist to the mirror.
pub fn is_accepted(mime: &Mime) -> bool {
    if is_html(mime) || mime.type_() == mime::IMAGE {
        return true;
    }

    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("text", "css" | "csv" | "calendar" | "javascript" | "xml") => true,
        ("application", "json" | "javascript" | "xml" | "pdf") => true,
        ("application", "atom" | "rss") if mime.suffix() == Some(mime::XML) => true,
        ("application", "msword" | "vnd.ms-excel" | "vnd.ms-powerpoint") => true,
        ("application", subtype) => {
            subtype.starts_with("vnd.openxmlformats-officedocument.")
                || subtype.starts_with("vnd.oasis.opendocument.")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime(s: &str) -> Mime {
        s.parse().unwrap()
    }

    #[test]
    fn test_is_html() {
        assert!(is_html(&mime("text/html")));
        assert!(is_html(&mime("text/html; charset=utf-8")));
        assert!(is_html(&mime("application/xhtml+xml")));
        assert!(!is_html(&mime("application/json")));
    }

    #[test]
    fn test_accepted_content_types() {
        for accepted in [
            "text/html",
            "application/xhtml+xml",
            "application/atom+xml",
            "application/rss+xml",
            "text/xml",
            "application/xml",
            "application/json",
            "text/css",
            "text/javascript",
            "application/javascript",
            "image/png",
            "image/svg+xml",
            "application/pdf",
            "text/calendar",
            "text/csv",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.ms-excel",
            "application/vnd.oasis.opendocument.text",
        ] {
            assert!(is_accepted(&mime(accepted)), "{accepted} should be accepted");
        }
    }

    #[test]
    fn test_rejected_content_types() {
        for rejected in [
            "application/octet-stream",
            "video/mp4",
            "audio/mpeg",
            "application/zip",
            "application/x-shockwave-flash",
        ] {
            assert!(!is_accepted(&mime(rejected)), "{rejected} should be rejected");
        }
    }
}
