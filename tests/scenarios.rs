//! End-to-end transaction scenarios.

use std::fs;
use zentinel_waf::{Disposition, Engine, Phase, Transaction, Value};

fn engine(rules: &str) -> Engine {
    Engine::from_string(rules).unwrap()
}

fn request(engine: &Engine, uri: &str, method: &str) -> Transaction {
    let mut tx = engine.new_transaction();
    tx.process_connection("192.0.2.10", 40000, "198.51.100.1", 443)
        .unwrap();
    tx.process_uri(uri, method, "HTTP/1.1").unwrap();
    tx.add_request_header("Host", "shop.example").unwrap();
    tx
}

#[test]
fn engine_off_never_evaluates() {
    let engine = engine(
        r#"
        SecRuleEngine Off
        SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny"
        SecAction "id:2,phase:5,pass,setvar:tx.logged=1"
    "#,
    );
    let mut tx = request(&engine, "/admin", "GET");
    tx.process_request_headers().unwrap();
    tx.process_request_body().unwrap();
    tx.set_response_status(200, "HTTP/1.1").unwrap();
    tx.process_response_headers().unwrap();
    tx.process_response_body().unwrap();
    tx.process_logging().unwrap();

    assert_eq!(tx.disposition(), &Disposition::Pass);
    assert!(tx.matched_rules().is_empty());
    assert_eq!(tx.get_variable("TX:logged"), None);
}

#[test]
fn oversized_declared_body_is_denied_before_phase_three() {
    let engine = engine(
        r#"
        SecRuleEngine On
        SecRequestBodyAccess On
        SecRequestBodyLimit 16777216
        SecRequestBodyLimitAction Reject
        SecAction "id:10,phase:3,pass,setvar:tx.response_seen=1"
    "#,
    );
    let mut tx = request(&engine, "/upload", "POST");
    tx.add_request_header("Content-Length", "20000000").unwrap();
    tx.add_request_header("Content-Type", "application/octet-stream")
        .unwrap();
    tx.process_request_headers().unwrap();
    tx.append_request_body(b"first chunk").unwrap();
    tx.process_request_body().unwrap();

    let intervention = tx.intervention().unwrap();
    assert_eq!(intervention.phase, Phase::RequestBody);
    assert_eq!(intervention.status(), 413);
    assert!(matches!(tx.disposition(), Disposition::Deny { status: 413, .. }));

    tx.set_response_status(413, "HTTP/1.1").unwrap();
    tx.process_response_headers().unwrap();
    tx.process_logging().unwrap();
    assert_eq!(tx.get_variable("TX:response_seen"), None);
    assert_eq!(tx.get_variable("INBOUND_DATA_ERROR"), Some(Value::Int(1)));
}

#[test]
fn multipart_without_boundary_raises_strict_error() {
    let engine = engine(
        r#"
        SecRequestBodyAccess On
        SecRule MULTIPART_STRICT_ERROR "!@eq 0" \
            "id:200,phase:2,deny,status:400,\
            msg:'Multipart strict error: RE %{REQBODY_ERROR}, UB %{MULTIPART_UNMATCHED_BOUNDARY}'"
    "#,
    );
    let mut tx = request(&engine, "/upload", "POST");
    tx.add_request_header("Content-Type", "multipart/form-data")
        .unwrap();
    tx.process_request_headers().unwrap();
    tx.append_request_body(b"--x\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--x--\r\n")
        .unwrap();
    tx.process_request_body().unwrap();

    assert_eq!(tx.get_variable("MULTIPART_STRICT_ERROR"), Some(Value::Int(1)));
    assert_eq!(tx.get_variable("REQBODY_ERROR"), Some(Value::Int(1)));

    let matched = &tx.matched_rules()[0];
    assert_eq!(matched.id, 200);
    assert_eq!(
        matched.message.as_deref(),
        Some("Multipart strict error: RE 1, UB 0")
    );
    assert_eq!(tx.intervention().map(|i| i.status()), Some(400));
}

#[test]
fn relevant_only_audit_honours_status_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.log");
    let engine = engine(&format!(
        r#"
        SecAuditEngine RelevantOnly
        SecAuditLogRelevantStatus "^(?:5|4(?!04))"
        SecAuditLogParts ABFHZ
        SecAuditLogType Serial
        SecAuditLog {}
    "#,
        log.display()
    ));

    let mut tx = request(&engine, "/missing", "GET");
    tx.process_request_headers().unwrap();
    tx.set_response_status(404, "HTTP/1.1").unwrap();
    tx.process_response_headers().unwrap();
    tx.process_logging().unwrap();
    assert!(tx.audit_record().is_none());
    assert!(!log.exists());

    let mut tx = request(&engine, "/broken", "GET");
    tx.process_request_headers().unwrap();
    tx.set_response_status(500, "HTTP/1.1").unwrap();
    tx.add_response_header("Content-Type", "text/html").unwrap();
    tx.process_response_headers().unwrap();
    tx.process_logging().unwrap();

    let record = tx.audit_record().unwrap();
    assert_eq!(record.part_codes(), "ABFHZ");

    let written = fs::read_to_string(&log).unwrap();
    assert!(written.contains(tx.unique_id()));
    assert!(written.contains("GET /broken HTTP/1.1"));
    for code in ['A', 'B', 'F', 'H', 'Z'] {
        assert!(written.contains(&format!("-{}--", code)), "missing part {}", code);
    }
    for code in ['C', 'E', 'I', 'J', 'K'] {
        assert!(!written.contains(&format!("-{}--", code)), "unexpected part {}", code);
    }
}

#[test]
fn regex_limit_degrades_to_no_match_and_is_visible_in_logging() {
    let engine = engine(
        r#"
        SecPcreMatchLimit 1000
        SecRule ARGS:q "@rx (a|b|ab)*(?=c)" "id:1,phase:1,deny"
        SecRule MSC_PCRE_LIMITS_EXCEEDED "@eq 1" "id:2,phase:5,pass,setvar:tx.limits_hit=1"
    "#,
    );
    let uri = format!("/search?q={}", "ab".repeat(30));
    let mut tx = request(&engine, &uri, "GET");
    tx.process_request_headers().unwrap();
    assert!(tx.intervention().is_none());

    tx.process_logging().unwrap();
    assert_eq!(tx.get_variable("MSC_PCRE_LIMITS_EXCEEDED"), Some(Value::Int(1)));
    assert_eq!(tx.get_variable("TX:limits_hit"), Some(Value::from("1")));
    assert_eq!(tx.disposition(), &Disposition::Pass);
}

#[test]
fn linear_patterns_are_not_subject_to_regex_limits() {
    let engine = engine(
        r#"
        SecPcreMatchLimit 10
        SecPcreMatchLimitRecursion 10
        SecRule ARGS:q "@rx (a+)+b" "id:1,phase:1,deny"
    "#,
    );
    let uri = format!("/search?q={}b", "a".repeat(200));
    let mut tx = request(&engine, &uri, "GET");
    tx.process_request_headers().unwrap();
    assert_eq!(tx.intervention().map(|i| i.status()), Some(403));
    assert_eq!(tx.get_variable("MSC_PCRE_LIMITS_EXCEEDED"), Some(Value::Int(0)));
}

#[test]
fn long_input_cannot_push_a_match_past_the_limits() {
    let engine = engine(r#"SecRule ARGS:q "@rx (union)+" "id:1,phase:1,deny""#);
    let uri = format!("/search?q={}union+select", "x".repeat(4000));
    let mut tx = request(&engine, &uri, "GET");
    tx.process_request_headers().unwrap();
    assert_eq!(tx.intervention().map(|i| i.status()), Some(403));
    assert_eq!(tx.get_variable("MSC_PCRE_LIMITS_EXCEEDED"), Some(Value::Int(0)));
}

#[test]
fn large_body_spills_and_abort_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&format!(
        r#"
        SecRequestBodyAccess On
        SecRequestBodyInMemoryLimit 64
        SecTmpDir {}
        SecRule REQUEST_BODY "@contains needle" "id:1,phase:2,pass,setvar:tx.found=1"
    "#,
        dir.path().display()
    ));
    let body = format!("{}needle{}", "x".repeat(100), "y".repeat(100));

    let mut tx = request(&engine, "/data", "POST");
    tx.add_request_header("Content-Type", "text/plain").unwrap();
    tx.process_request_headers().unwrap();
    tx.append_request_body(&body.as_bytes()[..50]).unwrap();
    assert!(tx.request_body_spill_path().is_none());
    tx.append_request_body(&body.as_bytes()[50..]).unwrap();

    let spill = tx.request_body_spill_path().unwrap().to_path_buf();
    assert!(spill.starts_with(dir.path()));
    assert_eq!(fs::metadata(&spill).unwrap().len(), body.len() as u64);

    tx.process_request_body().unwrap();
    assert_eq!(tx.get_variable("TX:found"), Some(Value::from("1")));
    assert_eq!(
        tx.get_variable("REQUEST_BODY_LENGTH"),
        Some(Value::Int(body.len() as i64))
    );

    tx.abort().unwrap();
    assert!(!spill.exists());
}

#[test]
fn small_body_stays_in_memory() {
    let engine = engine("SecRequestBodyAccess On\n");
    let mut tx = request(&engine, "/data", "POST");
    tx.process_request_headers().unwrap();
    tx.append_request_body(b"tiny").unwrap();
    assert!(tx.request_body_spill_path().is_none());
}

#[test]
fn chained_rule_needs_every_link() {
    let engine = engine(
        r#"
        SecRule REQUEST_METHOD "@streq POST" "id:300,phase:1,deny,status:405,msg:'post to %{REQUEST_URI}',chain"
            SecRule REQUEST_URI "@beginsWith /api" "chain"
            SecRule REQUEST_HEADERS:Content-Type "!@contains json"
    "#,
    );

    let mut tx = request(&engine, "/api/items", "POST");
    tx.add_request_header("Content-Type", "application/json")
        .unwrap();
    tx.process_request_headers().unwrap();
    assert!(tx.intervention().is_none());

    let mut tx = request(&engine, "/api/items", "POST");
    tx.add_request_header("Content-Type", "text/xml").unwrap();
    tx.process_request_headers().unwrap();
    let intervention = tx.intervention().unwrap();
    assert_eq!(intervention.status(), 405);
    assert_eq!(intervention.message.as_deref(), Some("post to /api/items"));
}

#[test]
fn json_body_via_ctl_processor() {
    let engine = engine(
        r#"
        SecRequestBodyAccess On
        SecRule REQUEST_HEADERS:Content-Type "@contains json" \
            "id:1,phase:1,pass,nolog,ctl:requestBodyProcessor=JSON"
        SecRule ARGS_POST:json.user.role "@streq admin" "id:2,phase:2,deny"
    "#,
    );
    let mut tx = request(&engine, "/profile", "PUT");
    tx.add_request_header("Content-Type", "text/json").unwrap();
    tx.process_request_headers().unwrap();
    tx.append_request_body(br#"{"user":{"role":"admin"}}"#).unwrap();
    tx.process_request_body().unwrap();

    assert_eq!(tx.get_variable("REQBODY_PROCESSOR"), Some(Value::from("JSON")));
    assert_eq!(tx.intervention().and_then(|i| i.rule_id), Some(2));
}

#[test]
fn include_loads_rules_relative_to_the_main_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("rules")).unwrap();
    fs::write(
        dir.path().join("rules").join("bad-agents.data"),
        "# scanners\nnikto\nsqlmap\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("rules").join("10-agents.conf"),
        r#"SecRule REQUEST_HEADERS:User-Agent "@pmFromFile bad-agents.data" "id:10,phase:1,deny""#,
    )
    .unwrap();
    let main = dir.path().join("main.conf");
    fs::write(&main, "SecRuleEngine On\nInclude rules/*.conf\n").unwrap();

    let engine = Engine::from_file(&main).unwrap();
    assert_eq!(engine.rule_count(), 1);

    let mut tx = request(&engine, "/", "GET");
    tx.add_request_header("User-Agent", "sqlmap/1.7").unwrap();
    tx.process_request_headers().unwrap();
    assert_eq!(tx.intervention().and_then(|i| i.rule_id), Some(10));
}

#[test]
fn transactions_run_concurrently_on_one_engine() {
    let engine = engine(
        r#"
        SecRule ARGS:user "@streq root" "id:1,phase:1,deny,status:403"
        SecRule ARGS:user "@rx ^([a-z]+)$" "id:2,phase:1,pass,capture,setvar:tx.user=%{TX.1}"
    "#,
    );

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                scope.spawn(move || {
                    let user = if i % 2 == 0 { "root" } else { "alice" };
                    let mut tx = request(&engine, &format!("/?user={}", user), "GET");
                    tx.process_request_headers().unwrap();
                    tx.process_logging().unwrap();
                    (user, tx.disposition().clone(), tx.get_variable("TX:user"))
                })
            })
            .collect();

        for handle in handles {
            let (user, disposition, captured) = handle.join().unwrap();
            if user == "root" {
                assert_eq!(disposition, Disposition::Deny { status: 403, drop: false });
                assert_eq!(captured, None);
            } else {
                assert_eq!(disposition, Disposition::Pass);
                assert_eq!(captured, Some(Value::from("alice")));
            }
        }
    });
}

#[test]
fn invalid_configuration_is_fatal() {
    assert!(Engine::from_string("SecRequestBodyLimit 0").is_err());
    assert!(Engine::from_string("SecRequestBodyLimit 100\nSecRequestBodyNoFilesLimit 200").is_err());
    assert!(Engine::from_string(r#"SecRule ARGS "@rx a" "phase:1,deny""#).is_err());
    assert!(Engine::from_string(r#"SecRule ARGS "@rx a" "id:1,phase:1,deny,chain""#).is_err());
    assert!(Engine::from_string("SecAuditLogType Concurrent").is_err());
}
