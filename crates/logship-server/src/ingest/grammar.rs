//! ALB/ELB access log grammars and field coercion
//!
//! The two line formats are fixed positional grammars published by AWS:
//! application load balancers,
//! <https://docs.aws.amazon.com/elasticloadbalancing/latest/application/load-balancer-access-logs.html>,
//! and classic load balancers,
//! <https://docs.aws.amazon.com/elasticloadbalancing/latest/classic/access-log-collection.html>.
//! A line is matched against the ALB grammar first, then classic ELB. The
//! token `-` or an empty capture means "absent" and coerces to `None`, never
//! the literal string.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use tracing::warn;

use logship_common::LogshipError;

const ALB_LOG_LINE_PATTERN: &str = concat!(
    r#"^(?P<type>[^ ]*)"#,
    r#" (?P<time>[^ ]*)"#,
    r#" (?P<elb>[^ ]*)"#,
    r#" (?P<client_ip>[^ ]*):(?P<client_port>[0-9]*)"#,
    r#" (?P<target_ip>[^ ]*)[:-](?P<target_port>[0-9]*)"#,
    r#" (?P<request_processing_time>[-.0-9]*)"#,
    r#" (?P<target_processing_time>[-.0-9]*)"#,
    r#" (?P<response_processing_time>[-.0-9]*)"#,
    r#" (?P<elb_status_code>[-0-9]*)"#,
    r#" (?P<target_status_code>[-0-9]*)"#,
    r#" (?P<received_bytes>[-0-9]*)"#,
    r#" (?P<sent_bytes>[-0-9]*)"#,
    r#" "(?P<request_verb>[^ ]*) (?P<request_url>[^ ]*) (?P<request_proto>-|[^ ]*) ?""#,
    r#" "(?P<user_agent>[^"]*)""#,
    r#" (?P<ssl_cipher>[A-Z0-9-]+)"#,
    r#" (?P<ssl_protocol>[A-Za-z0-9.-]*)"#,
    r#" (?P<target_group_arn>[^ ]*)"#,
    r#" "(?P<trace_id>[^"]*)""#,
    r#" "(?P<domain_name>[^"]*)""#,
    r#" "(?P<chosen_cert_arn>[^"]*)""#,
    r#" (?P<matched_rule_priority>[-.0-9]*)"#,
    r#" (?P<request_creation_time>[^ ]*)"#,
    r#" "(?P<actions_executed>[^"]*)""#,
    r#" "(?P<redirect_url>[^"]*)""#,
    r#"(?P<lambda_error_reason>$| "[^ ]*")"#,
    r#"(?P<new_field>.*)"#,
);

const ELB_LOG_LINE_PATTERN: &str = concat!(
    r#"^(?P<time>[^ ]*)"#,
    r#" (?P<elb>[^ ]*)"#,
    r#" (?P<client_ip>[^ ]*):(?P<client_port>[0-9]*)"#,
    r#" (?P<target_ip>[^ ]*)[:-](?P<target_port>[0-9]*)"#,
    r#" (?P<request_processing_time>[-.0-9]*)"#,
    r#" (?P<target_processing_time>[-.0-9]*)"#,
    r#" (?P<response_processing_time>[-.0-9]*)"#,
    r#" (?P<elb_status_code>[-0-9]*)"#,
    r#" (?P<target_status_code>-|[-0-9]*)"#,
    r#" (?P<received_bytes>[-0-9]*)"#,
    r#" (?P<sent_bytes>[-0-9]*)"#,
    r#" "(?P<request_verb>[^ ]*) (?P<request_url>[^ ]*) (?P<request_proto>-|[^ ]*) ?""#,
    r#" "(?P<user_agent>[^"]*)""#,
    r#" (?P<ssl_cipher>[A-Z0-9-]+)"#,
    r#" (?P<ssl_protocol>[A-Za-z0-9.-]*)"#,
);

/// A parsed log line, tagged by format. The two formats carry different
/// field sets and produce differently shaped documents; they are never
/// unified.
#[derive(Debug, Clone)]
pub enum ParsedRecord {
    Alb(AlbFields),
    Elb(ElbFields),
}

/// Typed fields of an application load balancer log line.
#[derive(Debug, Clone, Default)]
pub struct AlbFields {
    /// The `type` field of the line (http, https, h2, ws, wss).
    pub kind: Option<String>,
    pub time: Option<String>,
    pub elb: Option<String>,
    pub client_ip: Option<String>,
    pub client_port: Option<i64>,
    pub target_ip: Option<String>,
    pub target_port: Option<i64>,
    pub request_processing_time: Option<f64>,
    pub target_processing_time: Option<f64>,
    pub response_processing_time: Option<f64>,
    pub elb_status_code: Option<i64>,
    pub target_status_code: Option<i64>,
    pub received_bytes: Option<i64>,
    pub sent_bytes: Option<i64>,
    pub request_verb: Option<String>,
    pub request_url: Option<String>,
    pub request_proto: Option<String>,
    pub user_agent: Option<String>,
    pub ssl_cipher: Option<String>,
    pub ssl_protocol: Option<String>,
    pub target_group_arn: Option<String>,
    pub trace_id: Option<String>,
    pub domain_name: Option<String>,
    pub chosen_cert_arn: Option<String>,
    pub matched_rule_priority: Option<String>,
    pub request_creation_time: Option<String>,
    pub actions_executed: Option<String>,
    pub redirect_url: Option<String>,
}

/// Typed fields of a classic load balancer log line.
#[derive(Debug, Clone, Default)]
pub struct ElbFields {
    pub time: Option<String>,
    pub elb: Option<String>,
    pub client_ip: Option<String>,
    pub client_port: Option<i64>,
    pub target_ip: Option<String>,
    pub target_port: Option<i64>,
    pub request_processing_time: Option<f64>,
    pub target_processing_time: Option<f64>,
    pub response_processing_time: Option<f64>,
    pub elb_status_code: Option<i64>,
    pub target_status_code: Option<i64>,
    pub received_bytes: Option<i64>,
    pub sent_bytes: Option<i64>,
    pub request_verb: Option<String>,
    pub request_url: Option<String>,
    pub request_proto: Option<String>,
    pub user_agent: Option<String>,
    pub ssl_cipher: Option<String>,
    pub ssl_protocol: Option<String>,
}

impl AlbFields {
    fn from_captures(caps: &Captures<'_>) -> Self {
        Self {
            kind: coerce_text(group(caps, "type")),
            time: coerce_timestamp("time", group(caps, "time")),
            elb: coerce_text(group(caps, "elb")),
            client_ip: coerce_text(group(caps, "client_ip")),
            client_port: coerce_int("client_port", group(caps, "client_port")),
            target_ip: coerce_text(group(caps, "target_ip")),
            target_port: coerce_int("target_port", group(caps, "target_port")),
            request_processing_time: coerce_float(
                "request_processing_time",
                group(caps, "request_processing_time"),
            ),
            target_processing_time: coerce_float(
                "target_processing_time",
                group(caps, "target_processing_time"),
            ),
            response_processing_time: coerce_float(
                "response_processing_time",
                group(caps, "response_processing_time"),
            ),
            elb_status_code: coerce_int("elb_status_code", group(caps, "elb_status_code")),
            target_status_code: coerce_int("target_status_code", group(caps, "target_status_code")),
            received_bytes: coerce_int("received_bytes", group(caps, "received_bytes")),
            sent_bytes: coerce_int("sent_bytes", group(caps, "sent_bytes")),
            request_verb: coerce_text(group(caps, "request_verb")),
            request_url: coerce_text(group(caps, "request_url")),
            request_proto: coerce_text(group(caps, "request_proto")),
            user_agent: coerce_text(group(caps, "user_agent")),
            ssl_cipher: coerce_text(group(caps, "ssl_cipher")),
            ssl_protocol: coerce_text(group(caps, "ssl_protocol")),
            target_group_arn: coerce_text(group(caps, "target_group_arn")),
            trace_id: coerce_text(group(caps, "trace_id")),
            domain_name: coerce_text(group(caps, "domain_name")),
            chosen_cert_arn: coerce_text(group(caps, "chosen_cert_arn")),
            matched_rule_priority: coerce_text(group(caps, "matched_rule_priority")),
            request_creation_time: coerce_timestamp(
                "request_creation_time",
                group(caps, "request_creation_time"),
            ),
            actions_executed: coerce_text(group(caps, "actions_executed")),
            redirect_url: coerce_text(group(caps, "redirect_url")),
        }
    }
}

impl ElbFields {
    fn from_captures(caps: &Captures<'_>) -> Self {
        Self {
            time: coerce_timestamp("time", group(caps, "time")),
            elb: coerce_text(group(caps, "elb")),
            client_ip: coerce_text(group(caps, "client_ip")),
            client_port: coerce_int("client_port", group(caps, "client_port")),
            target_ip: coerce_text(group(caps, "target_ip")),
            target_port: coerce_int("target_port", group(caps, "target_port")),
            request_processing_time: coerce_float(
                "request_processing_time",
                group(caps, "request_processing_time"),
            ),
            target_processing_time: coerce_float(
                "target_processing_time",
                group(caps, "target_processing_time"),
            ),
            response_processing_time: coerce_float(
                "response_processing_time",
                group(caps, "response_processing_time"),
            ),
            elb_status_code: coerce_int("elb_status_code", group(caps, "elb_status_code")),
            target_status_code: coerce_int("target_status_code", group(caps, "target_status_code")),
            received_bytes: coerce_int("received_bytes", group(caps, "received_bytes")),
            sent_bytes: coerce_int("sent_bytes", group(caps, "sent_bytes")),
            request_verb: coerce_text(group(caps, "request_verb")),
            request_url: coerce_text(group(caps, "request_url")),
            request_proto: coerce_text(group(caps, "request_proto")),
            user_agent: coerce_text(group(caps, "user_agent")),
            ssl_cipher: coerce_text(group(caps, "ssl_cipher")),
            ssl_protocol: coerce_text(group(caps, "ssl_protocol")),
        }
    }
}

/// The compiled line grammars, built once per parser.
pub struct LineGrammar {
    alb: Regex,
    elb: Regex,
}

impl LineGrammar {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            alb: Regex::new(ALB_LOG_LINE_PATTERN)?,
            elb: Regex::new(ELB_LOG_LINE_PATTERN)?,
        })
    }

    /// Match a line against the ALB grammar first, then classic ELB.
    /// Returns `None` when neither format matches.
    pub fn parse(&self, line: &str) -> Option<ParsedRecord> {
        if let Some(caps) = self.alb.captures(line) {
            return Some(ParsedRecord::Alb(AlbFields::from_captures(&caps)));
        }
        if let Some(caps) = self.elb.captures(line) {
            return Some(ParsedRecord::Elb(ElbFields::from_captures(&caps)));
        }
        None
    }
}

fn group<'a>(caps: &'a Captures<'_>, name: &str) -> &'a str {
    caps.name(name).map(|m| m.as_str()).unwrap_or("")
}

fn coerce_text(raw: &str) -> Option<String> {
    if raw == "-" || raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn coerce_int(field: &str, raw: &str) -> Option<i64> {
    let raw = coerce_text(raw)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(field = field, value = %raw, error = %error, "failed to coerce integer field");
            None
        }
    }
}

fn coerce_float(field: &str, raw: &str) -> Option<f64> {
    let raw = coerce_text(raw)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(field = field, value = %raw, error = %error, "failed to coerce float field");
            None
        }
    }
}

fn coerce_timestamp(field: &str, raw: &str) -> Option<String> {
    let raw = coerce_text(raw)?;
    match reformat_timestamp(&raw) {
        Ok(formatted) => Some(formatted),
        Err(error) => {
            warn!(field = field, value = %raw, error = %error, "failed to coerce timestamp field");
            None
        }
    }
}

/// Re-encode a log timestamp as millisecond-precision UTC ISO-8601, the
/// shape Elasticsearch expects.
fn reformat_timestamp(raw: &str) -> Result<String, LogshipError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| LogshipError::Timestamp(format!("{:?}: {}", raw, e)))?;
    Ok(parsed
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALB_LINE: &str = r#"http 2018-07-02T22:23:00.186641Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.000 0.001 0.000 200 200 34 366 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.46.0" - - arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337262-36d228ad5d99923122bbe354" "-" "-" 0 2018-07-02T22:22:48.364000Z "forward" "-""#;

    const ELB_LINE: &str = r#"2015-05-13T23:39:43.945958Z my-loadbalancer 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 200 200 0 29 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.38.0" - -"#;

    const ELB_FAILED_LINE: &str = r#"2015-05-13T23:39:43.945958Z my-loadbalancer 192.168.131.39:2817 - -1 -1 -1 503 0 0 0 "- - - " "-" - -"#;

    fn grammar() -> LineGrammar {
        LineGrammar::new().unwrap()
    }

    #[test]
    fn test_alb_line_parses_as_alb() {
        let parsed = grammar().parse(ALB_LINE).unwrap();
        let fields = match parsed {
            ParsedRecord::Alb(fields) => fields,
            ParsedRecord::Elb(_) => panic!("ALB line took the ELB path"),
        };

        assert_eq!(fields.kind.as_deref(), Some("http"));
        assert_eq!(fields.time.as_deref(), Some("2018-07-02T22:23:00.186Z"));
        assert_eq!(
            fields.elb.as_deref(),
            Some("app/my-loadbalancer/50dc6c495c0c9188")
        );
        assert_eq!(fields.client_ip.as_deref(), Some("192.168.131.39"));
        assert_eq!(fields.client_port, Some(2817));
        assert_eq!(fields.target_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(fields.target_port, Some(80));
        assert_eq!(fields.request_processing_time, Some(0.0));
        assert_eq!(fields.target_processing_time, Some(0.001));
        assert_eq!(fields.elb_status_code, Some(200));
        assert_eq!(fields.received_bytes, Some(34));
        assert_eq!(fields.sent_bytes, Some(366));
        assert_eq!(fields.request_verb.as_deref(), Some("GET"));
        assert_eq!(
            fields.request_url.as_deref(),
            Some("http://www.example.com:80/")
        );
        assert_eq!(fields.request_proto.as_deref(), Some("HTTP/1.1"));
        assert_eq!(fields.user_agent.as_deref(), Some("curl/7.46.0"));
        assert_eq!(fields.ssl_cipher, None);
        assert_eq!(fields.ssl_protocol, None);
        assert_eq!(
            fields.trace_id.as_deref(),
            Some("Root=1-58337262-36d228ad5d99923122bbe354")
        );
        assert_eq!(fields.domain_name, None);
        assert_eq!(fields.chosen_cert_arn, None);
        assert_eq!(fields.matched_rule_priority.as_deref(), Some("0"));
        assert_eq!(
            fields.request_creation_time.as_deref(),
            Some("2018-07-02T22:22:48.364Z")
        );
        assert_eq!(fields.actions_executed.as_deref(), Some("forward"));
        assert_eq!(fields.redirect_url, None);
    }

    #[test]
    fn test_elb_line_parses_as_elb() {
        let parsed = grammar().parse(ELB_LINE).unwrap();
        let fields = match parsed {
            ParsedRecord::Elb(fields) => fields,
            ParsedRecord::Alb(_) => panic!("ELB line took the ALB path"),
        };

        assert_eq!(fields.time.as_deref(), Some("2015-05-13T23:39:43.945Z"));
        assert_eq!(fields.elb.as_deref(), Some("my-loadbalancer"));
        assert_eq!(fields.client_ip.as_deref(), Some("192.168.131.39"));
        assert_eq!(fields.client_port, Some(2817));
        assert_eq!(fields.target_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(fields.target_port, Some(80));
        assert_eq!(fields.request_processing_time, Some(0.000073));
        assert_eq!(fields.elb_status_code, Some(200));
        assert_eq!(fields.target_status_code, Some(200));
        assert_eq!(fields.received_bytes, Some(0));
        assert_eq!(fields.sent_bytes, Some(29));
        assert_eq!(fields.request_verb.as_deref(), Some("GET"));
        assert_eq!(fields.user_agent.as_deref(), Some("curl/7.38.0"));
        assert_eq!(fields.ssl_cipher, None);
        assert_eq!(fields.ssl_protocol, None);
    }

    #[test]
    fn test_elb_failed_request_line() {
        let parsed = grammar().parse(ELB_FAILED_LINE).unwrap();
        let fields = match parsed {
            ParsedRecord::Elb(fields) => fields,
            ParsedRecord::Alb(_) => panic!("ELB line took the ALB path"),
        };

        assert_eq!(fields.target_ip, None);
        assert_eq!(fields.target_port, None);
        assert_eq!(fields.request_processing_time, Some(-1.0));
        assert_eq!(fields.elb_status_code, Some(503));
        assert_eq!(fields.target_status_code, Some(0));
        assert_eq!(fields.request_verb, None);
        assert_eq!(fields.request_url, None);
        assert_eq!(fields.request_proto, None);
    }

    #[test]
    fn test_unmatched_lines() {
        let grammar = grammar();
        assert!(grammar.parse("").is_none());
        assert!(grammar.parse("not a load balancer log line").is_none());
        assert!(grammar
            .parse("2015-05-13T23:39:43.945958Z truncated line")
            .is_none());
    }

    #[test]
    fn test_coerce_text_null_tokens() {
        assert_eq!(coerce_text("-"), None);
        assert_eq!(coerce_text(""), None);
        assert_eq!(coerce_text("value"), Some("value".to_string()));
        // "-" is only null when it is the whole token
        assert_eq!(coerce_text("-1"), Some("-1".to_string()));
    }

    #[test]
    fn test_coerce_numeric_fields() {
        assert_eq!(coerce_int("f", "42"), Some(42));
        assert_eq!(coerce_int("f", "-"), None);
        assert_eq!(coerce_int("f", ""), None);
        assert_eq!(coerce_int("f", "12a3"), None);
        assert_eq!(coerce_float("f", "-1"), Some(-1.0));
        assert_eq!(coerce_float("f", "0.001"), Some(0.001));
        assert_eq!(coerce_float("f", "..."), None);
    }

    #[test]
    fn test_reformat_timestamp_truncates_to_millis() {
        assert_eq!(
            reformat_timestamp("2018-07-02T22:23:00.186641Z").unwrap(),
            "2018-07-02T22:23:00.186Z"
        );
    }

    #[test]
    fn test_reformat_timestamp_converts_to_utc() {
        assert_eq!(
            reformat_timestamp("2015-05-13T23:39:43.945958+02:00").unwrap(),
            "2015-05-13T21:39:43.945Z"
        );
    }

    #[test]
    fn test_reformat_timestamp_rejects_garbage() {
        assert!(reformat_timestamp("yesterday").is_err());
        assert_eq!(coerce_timestamp("time", "yesterday"), None);
    }
}
