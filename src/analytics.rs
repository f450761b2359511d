//! Call statistics aggregated from the log store.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub tool_id: String,
    pub tool_name: String,
    pub call_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub success_rate: f64,
    pub avg_response_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayStats {
    pub date: String,
    pub call_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub server_id: String,
    pub time_range: TimeRange,
    pub total_calls: i64,
    pub successful_calls: i64,
    pub failed_calls: i64,
    pub success_rate: f64,
    #[serde(rename = "avg_response_time_ms")]
    pub avg_response_time: f64,
    pub top_tools: Vec<ToolStats>,
    pub calls_by_day: Vec<DayStats>,
}

/// Percentage of successful calls; zero when there were no calls at all.
pub fn calculate_success_rate(success_count: i64, total_count: i64) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    success_count as f64 / total_count as f64 * 100.0
}

/// Assembles [`Statistics`], filling in the success rates of the whole and
/// of every sub-aggregate once all counts are known.
pub struct StatisticsBuilder {
    stats: Statistics,
}

impl StatisticsBuilder {
    pub fn new(server_id: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            stats: Statistics {
                server_id: server_id.into(),
                time_range,
                total_calls: 0,
                successful_calls: 0,
                failed_calls: 0,
                success_rate: 0.0,
                avg_response_time: 0.0,
                top_tools: Vec::new(),
                calls_by_day: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn total_calls(mut self, count: i64) -> Self {
        self.stats.total_calls = count;
        self
    }

    #[must_use]
    pub fn successful_calls(mut self, count: i64) -> Self {
        self.stats.successful_calls = count;
        self
    }

    #[must_use]
    pub fn failed_calls(mut self, count: i64) -> Self {
        self.stats.failed_calls = count;
        self
    }

    #[must_use]
    pub fn avg_response_time(mut self, avg_ms: f64) -> Self {
        self.stats.avg_response_time = avg_ms;
        self
    }

    #[must_use]
    pub fn top_tools(mut self, tools: Vec<ToolStats>) -> Self {
        self.stats.top_tools = tools;
        self
    }

    #[must_use]
    pub fn calls_by_day(mut self, days: Vec<DayStats>) -> Self {
        self.stats.calls_by_day = days;
        self
    }

    pub fn build(mut self) -> Statistics {
        self.stats.success_rate =
            calculate_success_rate(self.stats.successful_calls, self.stats.total_calls);
        for tool in &mut self.stats.top_tools {
            tool.success_rate = calculate_success_rate(tool.success_count, tool.call_count);
        }
        for day in &mut self.stats.calls_by_day {
            day.success_rate = calculate_success_rate(day.success_count, day.call_count);
        }
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> TimeRange {
        let end = Utc::now();
        TimeRange {
            start: end - chrono::Duration::days(30),
            end,
        }
    }

    #[test]
    fn success_rate_of_nothing_is_zero() {
        assert_eq!(calculate_success_rate(0, 0), 0.0);
    }

    #[test]
    fn success_rate_is_percentage() {
        assert_eq!(calculate_success_rate(1, 2), 50.0);
        assert_eq!(calculate_success_rate(3, 4), 75.0);
        assert_eq!(calculate_success_rate(5, 5), 100.0);
    }

    #[test]
    fn builder_fills_sub_aggregate_rates() {
        let stats = StatisticsBuilder::new("srv-1", range())
            .total_calls(10)
            .successful_calls(8)
            .failed_calls(2)
            .avg_response_time(12.5)
            .top_tools(vec![ToolStats {
                tool_id: "t1".into(),
                tool_name: "get_users".into(),
                call_count: 4,
                success_count: 3,
                error_count: 1,
                success_rate: 0.0,
                avg_response_ms: 10.0,
            }])
            .calls_by_day(vec![DayStats {
                date: "2026-08-01".into(),
                call_count: 2,
                success_count: 1,
                error_count: 1,
                success_rate: 0.0,
            }])
            .build();

        assert_eq!(stats.success_rate, 80.0);
        assert_eq!(stats.top_tools[0].success_rate, 75.0);
        assert_eq!(stats.calls_by_day[0].success_rate, 50.0);
        assert_eq!(stats.avg_response_time, 12.5);
    }
}
