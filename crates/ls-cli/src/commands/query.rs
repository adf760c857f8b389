//! Point-in-time and per-user queries printed by `lastseen watch`.

use std::collections::BTreeSet;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use ls_core::{PresenceService, Probability, QueryError, UserId};
use serde::Serialize;

use crate::commands::util::format_duration;

/// Results of the queries at one instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub at: DateTime<Utc>,
    pub users_online: usize,
    pub predicted_online: BTreeSet<UserId>,
    pub users: Vec<UserQuery>,
}

/// One requested user; `details` is absent when the user has no history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<UserDetails>,
}

/// Everything known about one tracked user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub was_online: bool,
    pub nearest_online_time: Option<DateTime<Utc>>,
    pub online_chance: Probability,
    pub will_be_online: bool,
    pub total_ms: i64,
    pub daily_average_ms: i64,
    pub weekly_average_ms: i64,
    pub min_ms: i64,
    pub max_ms: i64,
}

/// Parameters shared by every query.
#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    pub at: DateTime<Utc>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub tolerance: f64,
}

/// Runs the all-user queries at `window.at` plus the per-user ones.
pub fn evaluate(service: &PresenceService, users: &[UserId], window: QueryWindow) -> QueryOutput {
    let users = users
        .iter()
        .map(|user_id| UserQuery {
            user_id: *user_id,
            details: match user_details(service, user_id, window) {
                Ok(details) => Some(details),
                Err(err) => {
                    tracing::debug!(error = %err, "no history for requested user");
                    None
                }
            },
        })
        .collect();

    QueryOutput {
        at: window.at,
        users_online: service.users_online(window.at),
        predicted_online: service.predicted_online_users(window.at),
        users,
    }
}

fn user_details(
    service: &PresenceService,
    user_id: &UserId,
    window: QueryWindow,
) -> Result<UserDetails, QueryError> {
    let presence = service.user_presence(user_id, window.at)?;
    let prediction = service.user_prediction(user_id, window.at, window.tolerance)?;
    let total = service.user_total(user_id)?;
    let averages = service.user_averages(user_id)?;
    let min_max = service.user_min_max(user_id, window.from, window.to)?;

    Ok(UserDetails {
        was_online: presence.was_online,
        nearest_online_time: presence.nearest_online_time,
        online_chance: prediction.online_chance,
        will_be_online: prediction.will_be_online,
        total_ms: total.num_milliseconds(),
        daily_average_ms: averages.daily.num_milliseconds(),
        weekly_average_ms: averages.weekly.num_milliseconds(),
        min_ms: min_max.min.num_milliseconds(),
        max_ms: min_max.max.num_milliseconds(),
    })
}

fn duration_ms(ms: i64) -> String {
    format_duration(chrono::Duration::milliseconds(ms))
}

/// Formats query results as human-readable text.
pub fn format_query(query: &QueryOutput) -> String {
    let mut output = String::new();

    writeln!(output, "AT: {}", query.at.format("%Y-%m-%d %H:%M:%S UTC")).unwrap();
    writeln!(output, "Users online: {}", query.users_online).unwrap();
    writeln!(
        output,
        "Predicted online: {}",
        query.predicted_online.len()
    )
    .unwrap();

    for user in &query.users {
        let Some(details) = &user.details else {
            writeln!(output, "{}  not tracked", user.user_id).unwrap();
            continue;
        };

        let nearest = details.nearest_online_time.map_or_else(
            || "none".to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        writeln!(
            output,
            "{}  {}  nearest {nearest}",
            user.user_id,
            if details.was_online { "online" } else { "offline" }
        )
        .unwrap();
        writeln!(
            output,
            "  chance {}  {}",
            details.online_chance,
            if details.will_be_online {
                "likely online"
            } else {
                "likely offline"
            }
        )
        .unwrap();
        writeln!(
            output,
            "  total {}  daily {}  weekly {}  min {}  max {}",
            duration_ms(details.total_ms),
            duration_ms(details.daily_average_ms),
            duration_ms(details.weekly_average_ms),
            duration_ms(details.min_ms),
            duration_ms(details.max_ms)
        )
        .unwrap();
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use insta::assert_snapshot;
    use ls_core::{FixedClock, OnlineDetector, PresenceStore, ReconstructConfig, Roster, Sample};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn user(n: u128) -> UserId {
        UserId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn service() -> PresenceService {
        let store = Arc::new(PresenceStore::new());
        for minute in [0, 5, 10, 30, 32] {
            let roster: Roster = [(user(0xabcd), Sample::active_at(ts(minute)))].into();
            store.merge(&roster);
        }
        let detector = OnlineDetector::new(ReconstructConfig {
            staleness_threshold: Duration::minutes(8),
        });
        PresenceService::new(store, detector, Arc::new(FixedClock(ts(60))))
    }

    fn window(at: DateTime<Utc>) -> QueryWindow {
        QueryWindow {
            at,
            from: ts(0),
            to: ts(60),
            tolerance: 0.5,
        }
    }

    #[test]
    fn test_query_tracked_and_unknown_users() {
        let query = evaluate(&service(), &[user(0xabcd), user(1)], window(ts(7)));

        assert_eq!(query.users_online, 1);
        assert!(query.predicted_online.contains(&user(0xabcd)));
        assert!(query.users[1].details.is_none());

        let details = query.users[0].details.as_ref().unwrap();
        assert!(details.was_online);
        assert_eq!(details.total_ms, 12 * 60 * 1000);
        assert_eq!(details.max_ms, 10 * 60 * 1000);
    }

    #[test]
    fn test_format_query() {
        let query = evaluate(&service(), &[user(0xabcd), user(1)], window(ts(20)));
        assert_snapshot!(format_query(&query), @r"
        AT: 2024-01-01 09:20:00 UTC
        Users online: 0
        Predicted online: 1
        00000000-0000-0000-0000-00000000abcd  offline  nearest 2024-01-01 09:10:00
          chance 1.00  likely online
          total 12m 0s  daily 12m 0s  weekly 12m 0s  min 2m 0s  max 10m 0s
        00000000-0000-0000-0000-000000000001  not tracked
        ");
    }

    #[test]
    fn test_unknown_user_has_no_details_in_json() {
        let query = evaluate(&service(), &[user(1)], window(ts(7)));
        let value = serde_json::to_value(&query).unwrap();
        assert!(value["users"][0].get("details").is_none());
        assert_eq!(value["usersOnline"], 1);
    }
}
