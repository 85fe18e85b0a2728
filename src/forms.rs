// 📐 Admin Forms - Validation
// Raw add/edit submissions in, validated `NewVpsInstance` out

use crate::db::{NewVpsInstance, TrafficType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// Traffic type as submitted: a number from JSON, a string from HTML forms and CSV
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TrafficTypeInput {
    Code(i64),
    Text(String),
}

/// Add-server submission. Field names match the HTML form and CSV header;
/// editing submits the same fields for an existing id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerForm {
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: Option<String>,
    pub group_name: Option<String>,
    pub country_region: Option<String>,
    pub note_billing_start_date: Option<String>,
    pub note_billing_end_date: Option<String>,
    pub note_billing_cycle: Option<String>,
    pub note_billing_amount: Option<String>,
    pub note_plan_bandwidth: Option<String>,
    pub note_plan_traffic_type: Option<TrafficTypeInput>,
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn traffic_type(input: &Option<TrafficTypeInput>) -> Result<Option<TrafficType>, ValidationError> {
    let code = match input {
        None => return Ok(None),
        Some(TrafficTypeInput::Code(code)) => *code,
        Some(TrafficTypeInput::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<i64>().map_err(|_| {
                ValidationError::new("note_plan_traffic_type", "Traffic type must be a number")
            })?
        }
    };
    TrafficType::from_code(code)
        .map(Some)
        .ok_or_else(|| ValidationError::new("note_plan_traffic_type", "Traffic type must be 0, 1 or 2"))
}

impl ServerForm {
    pub fn validate(&self) -> ValidationResult<NewVpsInstance> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push(ValidationError::new("name", "Name is required"));
        }

        let plan_traffic_type = match traffic_type(&self.note_plan_traffic_type) {
            Ok(t) => t,
            Err(e) => {
                errors.push(e);
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewVpsInstance {
            name: name.to_string(),
            server_type: optional(&self.server_type),
            group_name: optional(&self.group_name),
            country_region: optional(&self.country_region),
            billing_start_date: optional(&self.note_billing_start_date),
            billing_end_date: optional(&self.note_billing_end_date),
            billing_cycle: optional(&self.note_billing_cycle),
            billing_amount: optional(&self.note_billing_amount),
            plan_bandwidth: optional(&self.note_plan_bandwidth),
            plan_traffic_type,
        })
    }
}

/// Joined messages, for flash banners and CLI output
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of reading one CSV row
pub type CsvRow = (usize, Result<NewVpsInstance, String>);

/// Read add-server rows from CSV with a header line using the form field names.
/// Each row carries its line number; rows that fail to parse or validate carry the reason.
pub fn load_csv<R: std::io::Read>(reader: R) -> Vec<CsvRow> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    rdr.deserialize::<ServerForm>()
        .enumerate()
        .map(|(index, result)| {
            // Header is line 1
            let line = index + 2;
            let row = result
                .map_err(|e| format!("unreadable row: {}", e))
                .and_then(|form| form.validate().map_err(|errors| describe(&errors)));
            (line, row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_required() {
        let form = ServerForm {
            name: "   ".to_string(),
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
        assert_eq!(errors[0].message, "Name is required");
    }

    #[test]
    fn test_blank_optionals_become_absent() {
        let form = ServerForm {
            name: " web-1 ".to_string(),
            group_name: Some("".to_string()),
            note_billing_cycle: Some("  Monthly ".to_string()),
            note_billing_end_date: Some(" 2024-06-01".to_string()),
            ..Default::default()
        };
        let new = form.validate().unwrap();
        assert_eq!(new.name, "web-1");
        assert_eq!(new.group_name, None);
        assert_eq!(new.billing_cycle.as_deref(), Some("Monthly"));
        assert_eq!(new.billing_end_date.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn test_traffic_type_range() {
        let mut form = ServerForm {
            name: "x".to_string(),
            note_plan_traffic_type: Some(TrafficTypeInput::Code(2)),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap().plan_traffic_type, Some(TrafficType::InboundOnly));

        form.note_plan_traffic_type = Some(TrafficTypeInput::Text("1".to_string()));
        assert_eq!(form.validate().unwrap().plan_traffic_type, Some(TrafficType::OutboundOnly));

        form.note_plan_traffic_type = Some(TrafficTypeInput::Text("".to_string()));
        assert_eq!(form.validate().unwrap().plan_traffic_type, None);

        form.note_plan_traffic_type = Some(TrafficTypeInput::Code(3));
        assert_eq!(form.validate().unwrap_err()[0].field, "note_plan_traffic_type");

        form.note_plan_traffic_type = Some(TrafficTypeInput::Text("both".to_string()));
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let form = ServerForm {
            note_plan_traffic_type: Some(TrafficTypeInput::Code(-1)),
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(describe(&errors).contains("Name is required"));
    }

    #[test]
    fn test_deserializes_json_with_numeric_traffic_type() {
        let form: ServerForm = serde_json::from_str(
            r#"{"name":"db","type":"KVM","note_plan_traffic_type":0,"note_billing_cycle":"Annually"}"#,
        )
        .unwrap();
        let new = form.validate().unwrap();
        assert_eq!(new.server_type.as_deref(), Some("KVM"));
        assert_eq!(new.plan_traffic_type, Some(TrafficType::Both));
    }

    #[test]
    fn test_load_csv_reports_bad_rows() {
        let data = "\
name,type,note_billing_end_date,note_billing_cycle,note_plan_traffic_type
web-1,KVM,2024-07-01,Monthly,1
,KVM,2024-07-01,Monthly,
db-1,,,,7
";
        let rows = load_csv(data.as_bytes());
        assert_eq!(rows.len(), 3);

        let (line, first) = &rows[0];
        assert_eq!(*line, 2);
        let first = first.as_ref().unwrap();
        assert_eq!(first.name, "web-1");
        assert_eq!(first.billing_cycle.as_deref(), Some("Monthly"));
        assert_eq!(first.plan_traffic_type, Some(TrafficType::OutboundOnly));

        assert_eq!(rows[1].0, 3);
        assert!(rows[1].1.as_ref().unwrap_err().contains("Name is required"));
        assert!(rows[2].1.as_ref().unwrap_err().contains("Traffic type must be 0, 1 or 2"));
    }
}
