use super::*;

#[test]
fn quota_statuses_are_quota_errors() {
    assert!(matches!(
        classify_status(429, "slow down"),
        OracleError::QuotaExceeded(_)
    ));
    let body = r#"{"error": {"code": 403, "message": "quota", "status": "RESOURCE_EXHAUSTED"}}"#;
    let err = classify_status(403, body);
    assert!(matches!(err, OracleError::QuotaExceeded(ref m) if m.contains("RESOURCE_EXHAUSTED")));
}

#[test]
fn server_errors_are_transient_and_client_errors_fatal() {
    assert!(matches!(classify_status(503, ""), OracleError::TransientNetwork(_)));
    assert!(matches!(classify_status(408, ""), OracleError::TransientNetwork(_)));
    for status in [400, 401, 403, 404] {
        let err = classify_status(status, r#"{"error": {"message": "nope", "status": "INVALID_ARGUMENT"}}"#);
        assert!(matches!(err, OracleError::Fatal(_)), "{status}");
        assert!(!err.is_retryable());
    }
}

#[test]
fn long_error_bodies_are_truncated() {
    let body = "é".repeat(1000);
    let OracleError::Fatal(msg) = classify_status(400, &body) else {
        panic!("expected fatal");
    };
    assert!(msg.len() < 600);
}

#[test]
fn text_parts_are_concatenated() {
    let body = r#"{"candidates": [{"content": {"parts": [{"text": "[{\"id\""}, {"text": ": 0}]"}]},
                   "finishReason": "STOP"}]}"#;
    assert_eq!(extract_text(body).unwrap(), r#"[{"id": 0}]"#);
}

#[test]
fn empty_or_malformed_replies_are_fatal() {
    assert!(matches!(extract_text("not json"), Err(OracleError::Fatal(_))));
    assert!(matches!(extract_text(r#"{"candidates": []}"#), Err(OracleError::Fatal(_))));
    let blocked = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
    let Err(OracleError::Fatal(msg)) = extract_text(blocked) else {
        panic!("expected fatal");
    };
    assert!(msg.contains("SAFETY"));
}

#[test]
fn request_body_uses_inline_png_and_generation_config() {
    let config = GeminiConfig::new("k");
    let body = serde_json::to_value(build_request("hello", &[1, 2, 3], &config)).unwrap();
    let parts = &body["contents"][0]["parts"];
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(parts[0]["text"], "hello");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert_eq!(parts[1]["inlineData"]["data"], "AQID");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 32000);
    let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((temp - 0.1).abs() < 1e-6);
}

#[test]
fn config_defaults_url_and_validation() {
    let config = GeminiConfig::new("secret");
    assert!(config.validate().is_ok());
    assert_eq!(
        config.url(),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
    );
    assert!(!format!("{config:?}").contains("secret"));

    assert!(GeminiConfig::new(" ").validate().is_err());
    let mut bad = GeminiConfig::new("k");
    bad.temperature = 3.0;
    assert!(bad.validate().is_err());
    let mut bad = GeminiConfig::new("k");
    bad.endpoint = "ftp://x".to_string();
    assert!(GeminiOracle::new(bad).is_err());
}
