// 📊 Dashboard Rows
// Public projection of a server record: billing status computed fresh on
// every read, runtime metrics as placeholders until agents report

use crate::cycle::{parse_cycle, CycleWindow};
use crate::db::VpsInstance;
use crate::expiry::{compute_expiry, compute_progress, DaysRemaining, Progress};
use chrono::NaiveDate;
use serde::Serialize;

const NOT_AVAILABLE: &str = "N/A";

/// Derived billing state for one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatus {
    pub end_date: Option<String>,
    pub cycle: Option<String>,
    pub days_to_expiry: DaysRemaining,
    pub window: CycleWindow,
    pub progress: Progress,
}

impl BillingStatus {
    pub fn compute(instance: &VpsInstance, today: NaiveDate) -> Self {
        let end_date = instance.billing_end_date.as_deref();
        let cycle = instance.billing_cycle.as_deref();

        let window = parse_cycle(end_date, cycle);
        let days_to_expiry = compute_expiry(end_date, today);
        let progress = compute_progress(days_to_expiry, window.total_days_in_cycle);

        Self {
            end_date: instance.billing_end_date.clone(),
            cycle: instance.billing_cycle.clone(),
            days_to_expiry,
            window,
            progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Usage {
    pub used: String,
    pub total: String,
    pub percentage: f64,
}

impl Usage {
    fn placeholder(unit: &str) -> Self {
        Self {
            used: format!("0 {}", unit),
            total: format!("0 {}", unit),
            percentage: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTotals {
    pub total_in: String,
    pub total_out: String,
    pub current_month_in: String,
    pub current_month_out: String,
}

/// Runtime metrics. Constant placeholders: nothing ingests agent telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub uptime: String,
    pub load: f64,
    pub nic_down: String,
    pub nic_up: String,
    pub cpu_model: String,
    pub cpu_cores: u32,
    pub cpu_usage: f64,
    pub ram: Usage,
    pub disk: Usage,
    pub swap: Usage,
    pub network: NetworkTotals,
    pub load_average: [f64; 3],
    pub process_count: u32,
    pub tcp_connections: u32,
    pub udp_connections: u32,
    pub boot_time: String,
    pub last_active: String,
}

impl Metrics {
    pub fn placeholder(created_at: &str) -> Self {
        Self {
            uptime: NOT_AVAILABLE.to_string(),
            load: 0.0,
            nic_down: "0 KB/s".to_string(),
            nic_up: "0 KB/s".to_string(),
            cpu_model: NOT_AVAILABLE.to_string(),
            cpu_cores: 0,
            cpu_usage: 0.0,
            ram: Usage::placeholder("MB"),
            disk: Usage::placeholder("GB"),
            swap: Usage::placeholder("MB"),
            network: NetworkTotals {
                total_in: "0 GB".to_string(),
                total_out: "0 GB".to_string(),
                current_month_in: "0 GB".to_string(),
                current_month_out: "0 GB".to_string(),
            },
            load_average: [0.0, 0.0, 0.0],
            process_count: 0,
            tcp_connections: 0,
            udp_connections: 0,
            boot_time: created_at.to_string(),
            last_active: created_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Error => "error",
        }
    }
}

/// One row of the public dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRow {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub system: String,
    pub country_region: String,
    pub price: String,
    pub billing_cycle: String,
    pub plan_bandwidth: String,
    pub plan_traffic_type: String,
    pub days_to_expiry: DaysRemaining,
    pub billing: BillingStatus,
    pub metrics: Metrics,
}

fn or_na(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

impl DashboardRow {
    pub fn from_instance(instance: &VpsInstance, today: NaiveDate) -> Self {
        let billing = BillingStatus::compute(instance, today);
        Self {
            id: instance.id.to_string(),
            name: instance.name.clone(),
            // No agent reports yet
            status: AgentStatus::Offline,
            system: instance
                .server_type
                .clone()
                .unwrap_or_else(|| "Unknown OS".to_string()),
            country_region: or_na(&instance.country_region),
            price: or_na(&instance.billing_amount),
            billing_cycle: or_na(&instance.billing_cycle),
            plan_bandwidth: or_na(&instance.plan_bandwidth),
            plan_traffic_type: instance
                .plan_traffic_type
                .map_or_else(|| NOT_AVAILABLE.to_string(), |t| t.label().to_string()),
            days_to_expiry: billing.days_to_expiry,
            billing,
            metrics: Metrics::placeholder(&instance.created_at),
        }
    }
}

pub fn build_rows(instances: &[VpsInstance], today: NaiveDate) -> Vec<DashboardRow> {
    instances
        .iter()
        .map(|instance| DashboardRow::from_instance(instance, today))
        .collect()
}

/// Text progress bar, `width` cells wide
pub fn progress_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled.min(width)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::parse_date;
    use crate::db::TrafficType;
    use crate::expiry::Severity;

    fn instance(end: Option<&str>, cycle: Option<&str>) -> VpsInstance {
        VpsInstance {
            id: 7,
            name: "edge-1".to_string(),
            server_type: None,
            group_name: None,
            ip_address: None,
            country_region: Some("DE / Frankfurt".to_string()),
            agent_version: None,
            secret: "s".to_string(),
            install_command: "curl".to_string(),
            billing_start_date: None,
            billing_end_date: end.map(str::to_string),
            billing_cycle: cycle.map(str::to_string),
            billing_amount: Some("$5.00".to_string()),
            plan_bandwidth: None,
            plan_traffic_type: Some(TrafficType::Both),
            created_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_row_projection() {
        let today = parse_date("2024-06-01").unwrap();
        let row = DashboardRow::from_instance(&instance(Some("2024-06-16"), Some("Monthly")), today);

        assert_eq!(row.id, "7");
        assert_eq!(row.status, AgentStatus::Offline);
        assert_eq!(row.system, "Unknown OS");
        assert_eq!(row.price, "$5.00");
        assert_eq!(row.plan_bandwidth, "N/A");
        assert_eq!(row.plan_traffic_type, "Both");
        assert_eq!(row.days_to_expiry, DaysRemaining::Days(15));
        assert_eq!(row.billing.progress.severity, Some(Severity::Warning));
        // May 16 → June 16: 31 days in May
        assert_eq!(row.billing.window.total_days_in_cycle, 31);
        assert_eq!(row.metrics.boot_time, "2024-01-01 00:00:00");
    }

    #[test]
    fn test_row_without_billing() {
        let today = parse_date("2024-06-01").unwrap();
        let row = DashboardRow::from_instance(&instance(None, None), today);
        assert_eq!(row.days_to_expiry, DaysRemaining::NotAvailable);
        assert_eq!(row.billing.progress.percentage, 0.0);
        assert_eq!(row.billing.window, CycleWindow::EMPTY);
        assert_eq!(row.billing_cycle, "N/A");
    }

    #[test]
    fn test_row_serializes_feed_shape() {
        let today = parse_date("2024-06-10").unwrap();
        let rows = build_rows(&[instance(Some("2024-06-01"), Some("Monthly"))], today);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["daysToExpiry"], serde_json::json!(-9));
        assert_eq!(json["status"], "offline");
        assert_eq!(json["billing"]["progress"]["severity"], "expired");
        assert_eq!(json["countryRegion"], "DE / Frankfurt");
    }

    #[test]
    fn test_progress_bar_width() {
        assert_eq!(progress_bar(50.0, 10), "█████░░░░░");
        assert_eq!(progress_bar(0.0, 4), "░░░░");
        assert_eq!(progress_bar(250.0, 4), "████");
    }
}
