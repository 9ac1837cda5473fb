//! Document shaping
//!
//! Turns a parsed log line into the document the search engine receives:
//! the format-specific nested body, recursive pruning of empty fields, the
//! constant metadata envelope, and the content-derived document id used for
//! dedup.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::grammar::{AlbFields, ElbFields, ParsedRecord};
use super::Record;

pub const INPUT_SOURCE: &str = "s3";
pub const SHIPPER_NAME: &str = "logship";
pub const SCHEMA_VERSION: &str = "1";
pub const SEVERITY: &str = "INFO";

/// Build the indexable record for a parsed line. Returns `None` when no
/// document id can be derived (an ALB line without a trace id, or an ELB
/// line missing part of the dedup composite).
pub fn build_record(parsed: &ParsedRecord, raw: &str, path: &str) -> Option<Record> {
    let id = identifier(parsed)?;

    let mut document = match parsed {
        ParsedRecord::Alb(fields) => alb_document(fields),
        ParsedRecord::Elb(fields) => elb_document(fields),
    };

    prune_empty(&mut document);
    attach_metadata(&mut document, raw, path);

    Some(Record { id, document })
}

/// Derive the document id. ALB lines already carry a unique correlation id;
/// for ELB lines, hash a composite of fields that together identify one
/// request. The hash keeps operators from reading meaning into the id.
pub fn identifier(parsed: &ParsedRecord) -> Option<String> {
    match parsed {
        ParsedRecord::Alb(fields) => fields.trace_id.clone(),
        ParsedRecord::Elb(fields) => elb_identifier(fields),
    }
}

fn elb_identifier(fields: &ElbFields) -> Option<String> {
    let key = format!(
        "{}:{}:{}:{}:{}",
        fields.elb.as_deref()?,
        fields.client_ip.as_deref()?,
        fields.client_port?,
        fields.time.as_deref()?,
        fields.received_bytes?,
    );

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}

fn alb_document(fields: &AlbFields) -> Value {
    json!({
        "@message": request_message(
            &fields.request_verb,
            &fields.request_url,
            &fields.request_proto,
        ),
        "@timestamp": fields.time,
        "@alb": {
            "matched_rule_priority": fields.matched_rule_priority,
            "actions_executed": fields.actions_executed,
            "target_group_arn": fields.target_group_arn,
            "domain_name": fields.domain_name,
            "alb": {
                "id": fields.elb,
                "status_code": fields.elb_status_code,
            },
            "received_bytes": fields.received_bytes,
            "chosen_cert_arn": fields.chosen_cert_arn,
            "client": {
                "ip": fields.client_ip,
                "port": fields.client_port,
            },
            "response": {
                "processing_time": fields.response_processing_time,
            },
            "redirect_url": fields.redirect_url,
            "sent_bytes": fields.sent_bytes,
            "trace_id": fields.trace_id,
            "target": {
                "port": fields.target_port,
                "processing_time": fields.target_processing_time,
                "status_code": fields.target_status_code,
                "ip": fields.target_ip,
            },
            "type": fields.kind,
            "request": {
                "verb": fields.request_verb,
                "url": fields.request_url,
                "protocol": fields.request_proto,
                "processing_time": fields.request_processing_time,
                "creation_time": fields.request_creation_time,
            },
            "user_agent": fields.user_agent,
        },
    })
}

fn elb_document(fields: &ElbFields) -> Value {
    json!({
        "@message": request_message(
            &fields.request_verb,
            &fields.request_url,
            &fields.request_proto,
        ),
        "@elb": {
            "response": {
                "processing_time": fields.response_processing_time,
            },
            "elb": {
                "id": fields.elb,
                "status_code": fields.elb_status_code,
            },
            "ssl": {
                "cipher": fields.ssl_cipher,
                "protocol": fields.ssl_protocol,
            },
            "sent_bytes": fields.sent_bytes,
            "target": {
                "port": fields.target_port,
                "processing_time": fields.target_processing_time,
                "status_code": fields.target_status_code,
                "ip": fields.target_ip,
            },
            "received_bytes": fields.received_bytes,
            "request": {
                "user_agent": fields.user_agent,
                "url": fields.request_url,
                "processing_time": fields.request_processing_time,
                "verb": fields.request_verb,
                "protocol": fields.request_proto,
            },
            "client": {
                "ip": fields.client_ip,
                "port": fields.client_port,
            },
        },
        "@timestamp": fields.time,
    })
}

/// The `@message` line. Absent request components render as `-`.
fn request_message(
    verb: &Option<String>,
    url: &Option<String>,
    proto: &Option<String>,
) -> String {
    format!(
        "{} {} {}",
        verb.as_deref().unwrap_or("-"),
        url.as_deref().unwrap_or("-"),
        proto.as_deref().unwrap_or("-"),
    )
}

/// Recursively remove empty leaves from nested objects. A leaf is empty when
/// it is null, an empty object, or an empty array; `false`, `0`, and `""`
/// are real values and stay.
pub fn prune_empty(value: &mut Value) {
    if let Value::Object(map) = value {
        let keys: Vec<String> = map.keys().cloned().collect();
        for key in keys {
            if let Some(child) = map.get_mut(&key) {
                prune_empty(child);
                if is_empty_leaf(child) {
                    map.remove(&key);
                }
            }
        }
    }
}

fn is_empty_leaf(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Attach the constant metadata envelope. Runs after pruning so the empty
/// `tags` list survives.
fn attach_metadata(document: &mut Value, raw: &str, path: &str) {
    if let Value::Object(map) = document {
        map.insert("@input".to_string(), json!(INPUT_SOURCE));
        map.insert("@shipper.name".to_string(), json!(SHIPPER_NAME));
        map.insert("@version".to_string(), json!(SCHEMA_VERSION));
        map.insert("@raw".to_string(), json!(raw));
        map.insert("@level".to_string(), json!(SEVERITY));
        map.insert("tags".to_string(), json!([]));
        map.insert("path".to_string(), json!(path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::grammar::LineGrammar;

    const ALB_LINE: &str = r#"http 2018-07-02T22:23:00.186641Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.000 0.001 0.000 200 200 34 366 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.46.0" - - arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337262-36d228ad5d99923122bbe354" "-" "-" 0 2018-07-02T22:22:48.364000Z "forward" "-""#;

    const ELB_LINE: &str = r#"2015-05-13T23:39:43.945958Z my-loadbalancer 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 200 200 0 29 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.38.0" - -"#;

    fn parse(line: &str) -> ParsedRecord {
        LineGrammar::new().unwrap().parse(line).unwrap()
    }

    fn elb_fields() -> ElbFields {
        ElbFields {
            elb: Some("my-loadbalancer".to_string()),
            client_ip: Some("192.168.131.39".to_string()),
            client_port: Some(2817),
            time: Some("2015-05-13T23:39:43.945Z".to_string()),
            received_bytes: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_prune_deeply_nested_empty() {
        let mut value = json!({"foo": {"bar": {"baz": {"quuz": {}}}}});
        prune_empty(&mut value);
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_prune_mixed_empty_and_nonempty() {
        let mut value = json!({"foo": 1, "bar": {"baz": {}}});
        prune_empty(&mut value);
        assert_eq!(value, json!({"foo": 1}));
    }

    #[test]
    fn test_prune_keeps_falsy_values() {
        let mut value = json!({"foo": false, "bar": 0, "baz": ""});
        prune_empty(&mut value);
        assert_eq!(value, json!({"foo": false, "bar": 0, "baz": ""}));
    }

    #[test]
    fn test_prune_removes_null_and_empty_array() {
        let mut value = json!({"foo": null, "bar": [], "baz": [1]});
        prune_empty(&mut value);
        assert_eq!(value, json!({"baz": [1]}));
    }

    #[test]
    fn test_alb_record_end_to_end() {
        let parsed = parse(ALB_LINE);
        let record = build_record(&parsed, ALB_LINE, "logs-working/file.log").unwrap();

        // ALBs carry their own correlation id
        assert_eq!(record.id, "Root=1-58337262-36d228ad5d99923122bbe354");

        let doc = &record.document;
        assert_eq!(
            doc["@message"],
            "GET http://www.example.com:80/ HTTP/1.1"
        );
        assert_eq!(doc["@timestamp"], "2018-07-02T22:23:00.186Z");

        let alb = &doc["@alb"];
        assert_eq!(alb["alb"]["id"], "app/my-loadbalancer/50dc6c495c0c9188");
        assert_eq!(alb["alb"]["status_code"], 200);
        assert_eq!(alb["client"]["ip"], "192.168.131.39");
        assert_eq!(alb["client"]["port"], 2817);
        assert_eq!(alb["target"]["ip"], "10.0.0.1");
        assert_eq!(alb["target"]["status_code"], 200);
        assert_eq!(alb["request"]["verb"], "GET");
        assert_eq!(alb["request"]["creation_time"], "2018-07-02T22:22:48.364Z");
        assert_eq!(alb["matched_rule_priority"], "0");
        assert_eq!(alb["actions_executed"], "forward");
        assert_eq!(alb["received_bytes"], 34);
        assert_eq!(alb["sent_bytes"], 366);
        assert_eq!(alb["type"], "http");

        // absent fields were pruned, not nulled
        assert!(alb.get("domain_name").is_none());
        assert!(alb.get("chosen_cert_arn").is_none());
        assert!(alb.get("redirect_url").is_none());
        // the ALB shape never carries ssl fields
        assert!(alb.get("ssl").is_none());

        assert_eq!(doc["@input"], "s3");
        assert_eq!(doc["@shipper.name"], "logship");
        assert_eq!(doc["@version"], "1");
        assert_eq!(doc["@level"], "INFO");
        assert_eq!(doc["@raw"], ALB_LINE);
        assert_eq!(doc["tags"], json!([]));
        assert_eq!(doc["path"], "logs-working/file.log");
    }

    #[test]
    fn test_elb_record_end_to_end() {
        let parsed = parse(ELB_LINE);
        let record = build_record(&parsed, ELB_LINE, "logs-working/file.log").unwrap();

        // ELB ids are opaque sha256 hex digests
        assert_eq!(record.id.len(), 64);
        assert!(record.id.chars().all(|c| c.is_ascii_hexdigit()));

        let doc = &record.document;
        assert_eq!(
            doc["@message"],
            "GET http://www.example.com:80/ HTTP/1.1"
        );
        assert_eq!(doc["@timestamp"], "2015-05-13T23:39:43.945Z");

        let elb = &doc["@elb"];
        assert_eq!(elb["elb"]["id"], "my-loadbalancer");
        assert_eq!(elb["elb"]["status_code"], 200);
        assert_eq!(elb["client"]["ip"], "192.168.131.39");
        assert_eq!(elb["request"]["user_agent"], "curl/7.38.0");
        assert_eq!(elb["received_bytes"], 0);
        // ssl was absent on this request and pruned whole
        assert!(elb.get("ssl").is_none());
        // ELB documents never carry the ALB-only fields
        assert!(doc.get("@alb").is_none());
    }

    #[test]
    fn test_elb_identifier_is_deterministic() {
        let fields = elb_fields();
        let first = identifier(&ParsedRecord::Elb(fields.clone())).unwrap();
        let second = identifier(&ParsedRecord::Elb(fields)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_elb_identifier_changes_with_any_component() {
        let base = identifier(&ParsedRecord::Elb(elb_fields())).unwrap();

        let mut changed = elb_fields();
        changed.elb = Some("other-loadbalancer".to_string());
        assert_ne!(base, identifier(&ParsedRecord::Elb(changed)).unwrap());

        let mut changed = elb_fields();
        changed.client_ip = Some("10.1.2.3".to_string());
        assert_ne!(base, identifier(&ParsedRecord::Elb(changed)).unwrap());

        let mut changed = elb_fields();
        changed.client_port = Some(2818);
        assert_ne!(base, identifier(&ParsedRecord::Elb(changed)).unwrap());

        let mut changed = elb_fields();
        changed.time = Some("2015-05-13T23:39:44.945Z".to_string());
        assert_ne!(base, identifier(&ParsedRecord::Elb(changed)).unwrap());

        let mut changed = elb_fields();
        changed.received_bytes = Some(1);
        assert_ne!(base, identifier(&ParsedRecord::Elb(changed)).unwrap());
    }

    #[test]
    fn test_identifier_requires_composite_components() {
        let mut fields = elb_fields();
        fields.client_port = None;
        assert!(identifier(&ParsedRecord::Elb(fields)).is_none());
    }

    #[test]
    fn test_alb_identifier_is_trace_id() {
        let fields = AlbFields {
            trace_id: Some("Root=1-abc".to_string()),
            ..Default::default()
        };
        assert_eq!(
            identifier(&ParsedRecord::Alb(fields)).as_deref(),
            Some("Root=1-abc")
        );

        let no_trace = AlbFields::default();
        assert!(identifier(&ParsedRecord::Alb(no_trace)).is_none());
    }

    #[test]
    fn test_message_defaults_absent_components() {
        let fields = ElbFields {
            request_url: Some("http://example.com/".to_string()),
            ..elb_fields()
        };
        let record = build_record(&ParsedRecord::Elb(fields), "raw", "p").unwrap();
        assert_eq!(record.document["@message"], "- http://example.com/ -");
    }
}
