use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Which direction of traffic counts against the plan allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    Both,
    OutboundOnly,
    InboundOnly,
}

impl TrafficType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TrafficType::Both),
            1 => Some(TrafficType::OutboundOnly),
            2 => Some(TrafficType::InboundOnly),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            TrafficType::Both => 0,
            TrafficType::OutboundOnly => 1,
            TrafficType::InboundOnly => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrafficType::Both => "Both",
            TrafficType::OutboundOnly => "Outbound only",
            TrafficType::InboundOnly => "Inbound only",
        }
    }
}

/// A rented server as stored by the admin area
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VpsInstance {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: Option<String>,
    pub group_name: Option<String>,
    /// Reported by the agent, never entered by hand
    pub ip_address: Option<String>,
    pub country_region: Option<String>,
    pub agent_version: Option<String>,
    pub secret: String,
    pub install_command: String,
    pub billing_start_date: Option<String>,
    pub billing_end_date: Option<String>,
    pub billing_cycle: Option<String>,
    pub billing_amount: Option<String>,
    pub plan_bandwidth: Option<String>,
    pub plan_traffic_type: Option<TrafficType>,
    pub created_at: String,
}

/// Validated fields for a new instance; secret and install command are generated on insert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVpsInstance {
    pub name: String,
    pub server_type: Option<String>,
    pub group_name: Option<String>,
    pub country_region: Option<String>,
    pub billing_start_date: Option<String>,
    pub billing_end_date: Option<String>,
    pub billing_cycle: Option<String>,
    pub billing_amount: Option<String>,
    pub plan_bandwidth: Option<String>,
    pub plan_traffic_type: Option<TrafficType>,
}

// ============================================================================
// FIELD CHANGES
// ============================================================================

/// Columns an update may touch. Identity, secret and agent-reported data are not editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    Type,
    GroupName,
    CountryRegion,
    BillingStartDate,
    BillingEndDate,
    BillingCycle,
    BillingAmount,
    PlanBandwidth,
    PlanTrafficType,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Type => "type",
            Column::GroupName => "group_name",
            Column::CountryRegion => "country_region",
            Column::BillingStartDate => "note_billing_start_date",
            Column::BillingEndDate => "note_billing_end_date",
            Column::BillingCycle => "note_billing_cycle",
            Column::BillingAmount => "note_billing_amount",
            Column::PlanBandwidth => "note_plan_bandwidth",
            Column::PlanTrafficType => "note_plan_traffic_type",
        }
    }
}

/// Ordered set of column assignments for `RecordStore::update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldChanges {
    changes: Vec<(Column, Value)>,
}

impl FieldChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a text column; `None` writes NULL. A later set of the same column replaces the earlier one.
    pub fn text(mut self, column: Column, value: Option<&str>) -> Self {
        let value = match value {
            Some(v) => Value::Text(v.to_string()),
            None => Value::Null,
        };
        self.push(column, value);
        self
    }

    pub fn traffic_type(mut self, value: Option<TrafficType>) -> Self {
        let value = match value {
            Some(t) => Value::Integer(t.code()),
            None => Value::Null,
        };
        self.push(Column::PlanTrafficType, value);
        self
    }

    fn push(&mut self, column: Column, value: Value) {
        self.changes.retain(|(c, _)| *c != column);
        self.changes.push((column, value));
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.changes.iter().map(|(c, _)| c.as_str()).collect()
    }

    /// Every editable column set from a full record of new values
    pub fn replace_all(new: &NewVpsInstance) -> Self {
        FieldChanges::new()
            .text(Column::Name, Some(&new.name))
            .text(Column::Type, new.server_type.as_deref())
            .text(Column::GroupName, new.group_name.as_deref())
            .text(Column::CountryRegion, new.country_region.as_deref())
            .text(Column::BillingStartDate, new.billing_start_date.as_deref())
            .text(Column::BillingEndDate, new.billing_end_date.as_deref())
            .text(Column::BillingCycle, new.billing_cycle.as_deref())
            .text(Column::BillingAmount, new.billing_amount.as_deref())
            .text(Column::PlanBandwidth, new.plan_bandwidth.as_deref())
            .traffic_type(new.plan_traffic_type)
    }
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// CRUD over server records. Updates are atomic per row and blind: last write wins.
pub trait RecordStore {
    fn insert(&self, new: &NewVpsInstance) -> Result<i64>;
    fn get_by_id(&self, id: i64) -> Result<Option<VpsInstance>>;
    /// Newest first
    fn list_all(&self) -> Result<Vec<VpsInstance>>;
    /// Rows affected: 0 when the record does not exist
    fn update(&self, id: i64, changes: &FieldChanges) -> Result<usize>;
    fn delete(&self, id: i64) -> Result<usize>;
}

/// Event for the audit trail: every admin mutation is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Stored admin credential
#[derive(Debug, Clone)]
pub struct AdminRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery and concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vps_instances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT,
            group_name TEXT,
            ip_address TEXT,
            country_region TEXT,
            agent_version TEXT,
            secret TEXT UNIQUE NOT NULL,
            install_command TEXT NOT NULL,
            note_billing_start_date TEXT,
            note_billing_end_date TEXT,
            note_billing_cycle TEXT,
            note_billing_amount TEXT,
            note_plan_bandwidth TEXT,
            note_plan_traffic_type INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vps_end_date ON vps_instances(note_billing_end_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_admins(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))?;
    Ok(count)
}

pub fn insert_admin(conn: &Connection, username: &str, password_hash: &str, password_salt: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO admins (username, password_hash, password_salt) VALUES (?1, ?2, ?3)",
        params![username, password_hash, password_salt],
    )
    .with_context(|| format!("Failed to create admin '{}'", username))?;
    Ok(conn.last_insert_rowid())
}

pub fn get_admin_by_username(conn: &Connection, username: &str) -> Result<Option<AdminRecord>> {
    let admin = conn
        .query_row(
            "SELECT id, username, password_hash, password_salt FROM admins WHERE username = ?1",
            [username],
            |row| {
                Ok(AdminRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    password_salt: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(admin)
}

const INSTANCE_COLUMNS: &str = "id, name, type, group_name, ip_address, country_region, agent_version,
                secret, install_command,
                note_billing_start_date, note_billing_end_date, note_billing_cycle, note_billing_amount,
                note_plan_bandwidth, note_plan_traffic_type, created_at";

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<VpsInstance> {
    let traffic_code: Option<i64> = row.get(14)?;
    Ok(VpsInstance {
        id: row.get(0)?,
        name: row.get(1)?,
        server_type: row.get(2)?,
        group_name: row.get(3)?,
        ip_address: row.get(4)?,
        country_region: row.get(5)?,
        agent_version: row.get(6)?,
        secret: row.get(7)?,
        install_command: row.get(8)?,
        billing_start_date: row.get(9)?,
        billing_end_date: row.get(10)?,
        billing_cycle: row.get(11)?,
        billing_amount: row.get(12)?,
        plan_bandwidth: row.get(13)?,
        plan_traffic_type: traffic_code.and_then(TrafficType::from_code),
        created_at: row.get(15)?,
    })
}

/// One-line agent installer for a freshly generated secret
pub fn install_command(public_url: &str, secret: &str) -> String {
    format!(
        "curl -sSL {}/install_agent.sh | sudo bash -s {}",
        public_url.trim_end_matches('/'),
        secret
    )
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// `RecordStore` backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
    public_url: String,
    actor: String,
}

impl SqliteStore {
    pub fn open(path: &Path, public_url: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        Self::from_connection(conn, public_url)
    }

    pub fn open_in_memory(public_url: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, public_url)
    }

    fn from_connection(conn: Connection, public_url: &str) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            public_url: public_url.to_string(),
            actor: "admin".to_string(),
        })
    }

    /// Name recorded as the actor of audit events
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    /// Exclusive access to the underlying connection
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database lock poisoned"))
    }

    pub fn events_for(&self, id: i64) -> Result<Vec<Event>> {
        let conn = self.connection()?;
        get_events_for_entity(&conn, "vps_instance", &id.to_string())
    }

    fn record_event(&self, conn: &Connection, event_type: &str, id: i64, data: serde_json::Value) {
        let event = Event::new(event_type, "vps_instance", &id.to_string(), data, &self.actor);
        if let Err(e) = insert_event(conn, &event) {
            tracing::warn!(id, event_type, error = %e, "failed to write audit event");
        }
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, new: &NewVpsInstance) -> Result<i64> {
        let secret = uuid::Uuid::new_v4().simple().to_string();
        let command = install_command(&self.public_url, &secret);
        let conn = self.connection()?;

        conn.execute(
            "INSERT INTO vps_instances (
                name, type, group_name, country_region, secret, install_command,
                note_billing_start_date, note_billing_end_date, note_billing_cycle,
                note_billing_amount, note_plan_bandwidth, note_plan_traffic_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                new.name,
                new.server_type,
                new.group_name,
                new.country_region,
                secret,
                command,
                new.billing_start_date,
                new.billing_end_date,
                new.billing_cycle,
                new.billing_amount,
                new.plan_bandwidth,
                new.plan_traffic_type.map(|t| t.code()),
            ],
        )
        .context("Failed to insert VPS instance")?;

        let id = conn.last_insert_rowid();
        self.record_event(&conn, "vps_created", id, serde_json::json!({ "name": new.name }));
        tracing::info!(id, name = %new.name, "VPS instance created");
        Ok(id)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<VpsInstance>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {} FROM vps_instances WHERE id = ?1", INSTANCE_COLUMNS);
        let instance = conn.query_row(&sql, [id], instance_from_row).optional()?;
        Ok(instance)
    }

    fn list_all(&self) -> Result<Vec<VpsInstance>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {} FROM vps_instances ORDER BY created_at DESC, id DESC",
            INSTANCE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let instances = stmt
            .query_map([], instance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(instances)
    }

    fn update(&self, id: i64, changes: &FieldChanges) -> Result<usize> {
        let conn = self.connection()?;

        if changes.is_empty() {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vps_instances WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            return Ok(exists as usize);
        }

        let assignments: Vec<String> = changes
            .changes
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column.as_str(), i + 1))
            .collect();
        let sql = format!(
            "UPDATE vps_instances SET {} WHERE id = ?{}",
            assignments.join(", "),
            changes.changes.len() + 1
        );

        let mut values: Vec<Value> = changes.changes.iter().map(|(_, v)| v.clone()).collect();
        values.push(Value::Integer(id));

        let affected = conn
            .execute(&sql, params_from_iter(values))
            .with_context(|| format!("Failed to update VPS instance {}", id))?;

        if affected > 0 {
            self.record_event(
                &conn,
                "vps_updated",
                id,
                serde_json::json!({ "columns": changes.columns() }),
            );
            tracing::info!(id, columns = ?changes.columns(), "VPS instance updated");
        }
        Ok(affected)
    }

    fn delete(&self, id: i64) -> Result<usize> {
        let conn = self.connection()?;
        let affected = conn
            .execute("DELETE FROM vps_instances WHERE id = ?1", [id])
            .with_context(|| format!("Failed to delete VPS instance {}", id))?;
        if affected > 0 {
            self.record_event(&conn, "vps_deleted", id, serde_json::json!({}));
            tracing::info!(id, "VPS instance deleted");
        }
        Ok(affected)
    }
}
