//! Integration tests for payload normalization.

use dashguard_core::{normalize_payload, SourceRecord};
use serde_json::json;

#[test]
fn test_nested_statistics_shape() {
    let payload = json!({"data": {"statistics": [{"source": "A", "revenue": 10}]}});
    let records = normalize_payload(&payload).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].adset_name, "A");
    assert_eq!(records[0].revenue, 10.0);
    assert_eq!(records[0].epl, 0.0);
    assert_eq!(records[0].epc, 0.0);
}

#[test]
fn test_list_shape_coerces_string_revenue() {
    let payload = json!({"data": [{"source": "B", "revenue": "5"}]});
    let records = normalize_payload(&payload).unwrap();

    assert_eq!(records, vec![SourceRecord::new("B", 5.0)]);
}

#[test]
fn test_keyed_shape() {
    let payload = json!({
        "data": {
            "row1": {"source": "C", "revenue": 1.5, "epl": 0.3},
            "row2": {"source": "D", "revenue": 2, "epc": "0.1"}
        }
    });
    let mut records = normalize_payload(&payload).unwrap();
    records.sort_by(|a, b| a.adset_name.cmp(&b.adset_name));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].adset_name, "C");
    assert_eq!(records[0].epl, 0.3);
    assert_eq!(records[1].adset_name, "D");
    assert_eq!(records[1].epc, 0.1);
}

#[test]
fn test_single_record_object() {
    let payload = json!({"data": {"source": "E", "revenue": 4}});
    let records = normalize_payload(&payload).unwrap();

    assert_eq!(records, vec![SourceRecord::new("E", 4.0)]);
}

#[test]
fn test_null_and_empty_data() {
    assert!(normalize_payload(&json!({"data": null})).unwrap().is_empty());
    assert!(normalize_payload(&json!({"data": []})).unwrap().is_empty());
}

#[test]
fn test_record_serialization() {
    let record = SourceRecord::new("A", 10.0);
    let value = serde_json::to_value(&record).unwrap();

    assert_eq!(value["adset_name"], "A");
    assert_eq!(value["revenue"], 10.0);
}
