//! GraphQL query templates for the traffic-data API.

use chrono::{DateTime, Days, FixedOffset, NaiveTime};

use crate::calendar::WeekRange;

/// Offset used for every date-time sent to the API (Norwegian winter time).
pub fn api_offset() -> FixedOffset {
    FixedOffset::east_opt(3600).expect("UTC+1 is a valid offset")
}

/// Query for per-month average daily volume, confidence interval and
/// coverage of one registration point during `year`.
pub fn monthly_query(point_id: &str, year: i32) -> String {
    format!(
        r#"{{
  trafficData(trafficRegistrationPointId: "{point_id}") {{
    volume {{
      average {{
        daily {{
          byMonth(year: {year}) {{
            month
            total {{
              volume {{
                average
                confidenceInterval {{
                  lowerBound
                  upperBound
                }}
              }}
              coverage {{
                percentage
              }}
            }}
          }}
        }}
      }}
    }}
  }}
}}"#
    )
}

/// Query for per-day volume and coverage of one registration point in the
/// half-open interval `[from, to)`.
pub fn daily_query(point_id: &str, from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> String {
    let from = from.to_rfc3339();
    let to = to.to_rfc3339();
    format!(
        r#"{{
  trafficData(trafficRegistrationPointId: "{point_id}") {{
    volume {{
      byDay(from: "{from}", to: "{to}") {{
        edges {{
          node {{
            from
            to
            total {{
              volumeNumbers {{
                volume
              }}
              coverage {{
                percentage
              }}
            }}
          }}
        }}
      }}
    }}
  }}
}}"#
    )
}

/// Date-time window covering every day of `week`: from its first midnight
/// up to the midnight after its last day.
pub fn week_window(week: &WeekRange) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let offset = api_offset();
    let from = week
        .start
        .and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()?;
    let to = week
        .end
        .checked_add_days(Days::new(1))?
        .and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()?;
    Some((from, to))
}
