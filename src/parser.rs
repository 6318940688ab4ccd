//! Decoders for the `data` payload of traffic-data API responses.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::analyzers::types::{DailyRecord, MonthlyRecord};
use crate::error::{Result, TrafficError};
use crate::fetch::extract;

const BY_MONTH: &[&str] = &["trafficData", "volume", "average", "daily", "byMonth"];
const BY_DAY: &[&str] = &["trafficData", "volume", "byDay", "edges"];

#[derive(Deserialize)]
struct MonthNode {
    month: u32,
    total: Option<MonthTotal>,
}

#[derive(Deserialize)]
struct MonthTotal {
    volume: Option<AverageVolume>,
    coverage: Option<Coverage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AverageVolume {
    average: Option<f64>,
    confidence_interval: Option<ConfidenceInterval>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfidenceInterval {
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
}

#[derive(Deserialize)]
struct Coverage {
    percentage: Option<f64>,
}

#[derive(Deserialize)]
struct DayEdge {
    node: DayNode,
}

#[derive(Deserialize)]
struct DayNode {
    from: DateTime<FixedOffset>,
    to: DateTime<FixedOffset>,
    total: Option<DayTotal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayTotal {
    volume_numbers: Option<VolumeNumbers>,
    coverage: Option<Coverage>,
}

#[derive(Deserialize)]
struct VolumeNumbers {
    volume: Option<f64>,
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| TrafficError::malformed(e.to_string()))
}

/// Decodes the monthly breakdown of a `byMonth` query.
///
/// Returns `Ok(None)` when the payload holds no months at all.
pub fn parse_monthly(data: &Value) -> Result<Option<Vec<MonthlyRecord>>> {
    let Some(months) = extract(data, BY_MONTH) else {
        return Ok(None);
    };

    let nodes: Vec<MonthNode> = decode(months)?;
    let records = nodes
        .into_iter()
        .map(|node| {
            let total = node.total;
            let volume = total.as_ref().and_then(|t| t.volume.as_ref());
            let interval = volume.and_then(|v| v.confidence_interval.as_ref());
            MonthlyRecord {
                month: node.month,
                average_volume: volume.and_then(|v| v.average),
                confidence_lower: interval.and_then(|ci| ci.lower_bound),
                confidence_upper: interval.and_then(|ci| ci.upper_bound),
                coverage_pct: total
                    .as_ref()
                    .and_then(|t| t.coverage.as_ref())
                    .and_then(|c| c.percentage),
            }
        })
        .collect();

    Ok(Some(records))
}

/// Decodes the per-day series of a `byDay` query.
///
/// Returns `Ok(None)` when the payload holds no days at all.
pub fn parse_daily(data: &Value) -> Result<Option<Vec<DailyRecord>>> {
    let Some(edges) = extract(data, BY_DAY) else {
        return Ok(None);
    };

    let edges: Vec<DayEdge> = decode(edges)?;
    let records = edges
        .into_iter()
        .map(|edge| {
            let total = edge.node.total;
            DailyRecord {
                from: edge.node.from,
                to: edge.node.to,
                volume: total
                    .as_ref()
                    .and_then(|t| t.volume_numbers.as_ref())
                    .and_then(|v| v.volume),
                coverage_pct: total
                    .as_ref()
                    .and_then(|t| t.coverage.as_ref())
                    .and_then(|c| c.percentage),
            }
        })
        .collect();

    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_monthly_full_record() {
        let data = json!({
            "trafficData": {"volume": {"average": {"daily": {"byMonth": [
                {
                    "month": 3,
                    "total": {
                        "volume": {
                            "average": 8123.0,
                            "confidenceInterval": {"lowerBound": 8000.0, "upperBound": 8250.0}
                        },
                        "coverage": {"percentage": 98.5}
                    }
                }
            ]}}}}
        });

        let records = parse_monthly(&data).unwrap().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].month, 3);
        assert_eq!(records[0].average_volume, Some(8123.0));
        assert_eq!(records[0].confidence_lower, Some(8000.0));
        assert_eq!(records[0].confidence_upper, Some(8250.0));
        assert_eq!(records[0].coverage_pct, Some(98.5));
    }

    #[test]
    fn test_parse_monthly_null_fields() {
        let data = json!({
            "trafficData": {"volume": {"average": {"daily": {"byMonth": [
                {"month": 1, "total": {"volume": {"average": null, "confidenceInterval": null}, "coverage": null}},
                {"month": 2, "total": null}
            ]}}}}
        });

        let records = parse_monthly(&data).unwrap().unwrap();

        assert_eq!(records[0].average_volume, None);
        assert_eq!(records[0].confidence_lower, None);
        assert_eq!(records[1].average_volume, None);
        assert_eq!(records[1].coverage_pct, None);
    }

    #[test]
    fn test_parse_monthly_empty_is_no_data() {
        let empty = json!({"trafficData": {"volume": {"average": {"daily": {"byMonth": []}}}}});
        assert_eq!(parse_monthly(&empty).unwrap(), None);
        assert_eq!(parse_monthly(&json!({"trafficData": null})).unwrap(), None);
        assert_eq!(parse_monthly(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_parse_monthly_wrong_shape_is_malformed() {
        let data = json!({"trafficData": {"volume": {"average": {"daily": {"byMonth": [{"month": "x"}]}}}}});
        let err = parse_monthly(&data).unwrap_err();
        assert!(matches!(err, TrafficError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_daily() {
        let data = json!({
            "trafficData": {"volume": {"byDay": {"edges": [
                {"node": {
                    "from": "2019-01-07T00:00:00+01:00",
                    "to": "2019-01-08T00:00:00+01:00",
                    "total": {"volumeNumbers": {"volume": 10500}, "coverage": {"percentage": 100.0}}
                }},
                {"node": {
                    "from": "2019-01-08T00:00:00+01:00",
                    "to": "2019-01-09T00:00:00+01:00",
                    "total": {"volumeNumbers": null, "coverage": {"percentage": 0.0}}
                }}
            ]}}}
        });

        let days = parse_daily(&data).unwrap().unwrap();

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].volume, Some(10500.0));
        assert_eq!(days[0].from.to_rfc3339(), "2019-01-07T00:00:00+01:00");
        assert!(days[0].is_valid());
        assert_eq!(days[1].volume, None);
        assert!(!days[1].is_valid());
    }

    #[test]
    fn test_parse_daily_empty_is_no_data() {
        let data = json!({"trafficData": {"volume": {"byDay": {"edges": []}}}});
        assert_eq!(parse_daily(&data).unwrap(), None);
    }
}
