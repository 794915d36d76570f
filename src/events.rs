/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/events.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! EventExtractor (§4.4): builds a templated `get events` query for a given
//! `(kind, name)` and parses the delimited response into a normalized
//! per-resource event list. Read-only (invariant 4, §3).

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::cluster_client::{ClusterRunner, RunOptions};

/// Record separator between events, field separator between an event's
/// fields. Control characters chosen specifically because they cannot
/// appear in human-authored event messages (§4.4: "two chosen separator
/// tokens").
const FIELD_SEP: &str = "\u{1e}";
const RECORD_SEP: &str = "\u{1f}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub involved_kind: String,
    pub involved_name: String,
    pub count: String,
    pub last_timestamp: String,
    pub reason: String,
    pub message: String,
}

pub struct EventExtractor;

impl EventExtractor {
    /// The go-template query string for `kubectl get events`. Filters out
    /// `Started`/`Created` events at query time and emits one
    /// field-separated record per remaining event.
    pub fn build_query() -> String {
        format!(
            "{{{{range .items}}}}{{{{if and (ne .reason \"Started\") (ne .reason \"Created\")}}}}\
             {{{{.involvedObject.kind}}}}{FIELD_SEP}{{{{.involvedObject.name}}}}{FIELD_SEP}\
             {{{{.count}}}}{FIELD_SEP}{{{{.lastTimestamp}}}}{FIELD_SEP}{{{{.reason}}}}{FIELD_SEP}\
             {{{{.message}}}}{RECORD_SEP}{{{{end}}}}{{{{end}}}}"
        )
    }

    /// Parses `build_query`'s output into one `EventRecord` per event.
    pub fn parse_records(raw: &str) -> Vec<EventRecord> {
        raw.split(RECORD_SEP)
            .filter(|record| !record.trim().is_empty())
            .filter_map(|record| {
                let fields: Vec<&str> = record.split(FIELD_SEP).collect();
                if fields.len() != 6 {
                    return None;
                }
                Some(EventRecord {
                    involved_kind: fields[0].to_string(),
                    involved_name: fields[1].to_string(),
                    count: fields[2].to_string(),
                    last_timestamp: fields[3].to_string(),
                    reason: fields[4].to_string(),
                    message: fields[5].to_string(),
                })
            })
            .collect()
    }

    /// Whether `record` is "seen" relative to a deploy's start: its
    /// `lastTimestamp` must be no more than 5 seconds before
    /// `deploy_started_at` (§4.4).
    fn is_seen(record: &EventRecord, deploy_started_at: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&record.last_timestamp) {
            Ok(ts) => ts.with_timezone(&Utc) >= deploy_started_at - ChronoDuration::seconds(5),
            Err(_) => false,
        }
    }

    /// Groups seen event records by resource id (`Kind/Name`) and renders
    /// each as `"<reason>: <message> (<count> events)"`.
    pub fn group_seen(records: Vec<EventRecord>, deploy_started_at: Option<DateTime<Utc>>) -> HashMap<String, Vec<String>> {
        let Some(deploy_started_at) = deploy_started_at else {
            return HashMap::new();
        };

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for record in records {
            if !Self::is_seen(&record, deploy_started_at) {
                continue;
            }
            let id = format!("{}/{}", record.involved_kind, record.involved_name);
            let text = format!("{}: {} ({} events)", record.reason, record.message, record.count);
            grouped.entry(id).or_default().push(text);
        }
        grouped
    }

    /// Fetches and parses events for a single `(kind, name)`, returning just
    /// that resource's event texts.
    pub async fn fetch(client: &dyn ClusterRunner, kind: &str, name: &str, deploy_started_at: Option<DateTime<Utc>>) -> anyhow::Result<Vec<String>> {
        let query = Self::build_query();
        let out = client
            .run(&["get", "events", &format!("--output=go-template={query}")], RunOptions::new(false))
            .await?;
        if !out.success {
            return Ok(Vec::new());
        }
        let records = Self::parse_records(&out.stdout);
        let grouped = Self::group_seen(records, deploy_started_at);
        Ok(grouped.get(&format!("{kind}/{name}")).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(n: usize) -> String {
        (0..n)
            .map(|i| format!("Deployment{FIELD_SEP}web{FIELD_SEP}{i}{FIELD_SEP}2026-01-01T00:00:00Z{FIELD_SEP}FailedScheduling{FIELD_SEP}no nodes available"))
            .collect::<Vec<_>>()
            .join(RECORD_SEP)
            + RECORD_SEP
    }

    #[test]
    fn parses_exactly_n_records() {
        let records = EventExtractor::parse_records(&sample_raw(3));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn round_trips_event_text_without_separator_collisions() {
        let raw = sample_raw(1);
        let records = EventExtractor::parse_records(&raw);
        assert_eq!(records[0].reason, "FailedScheduling");
        assert_eq!(records[0].message, "no nodes available");
    }

    #[test]
    fn only_seen_events_are_grouped() {
        let deploy_started_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:10Z").unwrap().with_timezone(&Utc);
        let records = vec![
            EventRecord {
                involved_kind: "Deployment".into(),
                involved_name: "web".into(),
                count: "1".into(),
                last_timestamp: "2026-01-01T00:00:08Z".into(),
                reason: "ScalingReplicaSet".into(),
                message: "Scaled up".into(),
            },
            EventRecord {
                involved_kind: "Deployment".into(),
                involved_name: "web".into(),
                count: "1".into(),
                last_timestamp: "2025-12-31T23:59:00Z".into(),
                reason: "ScalingReplicaSet".into(),
                message: "stale event".into(),
            },
        ];
        let grouped = EventExtractor::group_seen(records, Some(deploy_started_at));
        let texts = grouped.get("Deployment/web").cloned().unwrap_or_default();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Scaled up"));
    }
}
