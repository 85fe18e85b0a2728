// 🔐 Admin Authentication
// Salted credential hashes in SQLite, in-memory session tokens behind a cookie

use crate::config::AppConfig;
use crate::db::{count_admins, get_admin_by_username, insert_admin};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

pub const SESSION_COOKIE: &str = "admin-session";

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", salt, password));
    format!("{:x}", hasher.finalize())
}

/// Compare without short-circuiting on the first differing byte
fn hashes_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Seed the first admin from configuration if the table is empty.
/// Returns true when an admin was created.
pub fn ensure_initial_admin(conn: &Connection, config: &AppConfig) -> Result<bool> {
    if count_admins(conn)? > 0 {
        return Ok(false);
    }
    config.warn_on_insecure_defaults();

    let salt = uuid::Uuid::new_v4().simple().to_string();
    let hash = hash_password(&config.initial_admin_password, &salt);
    insert_admin(conn, &config.initial_admin_username, &hash, &salt)?;
    tracing::info!(username = %config.initial_admin_username, "initial admin user created");
    Ok(true)
}

pub fn authenticate(conn: &Connection, username: &str, password: &str) -> Result<bool> {
    let Some(admin) = get_admin_by_username(conn, username.trim())? else {
        return Ok(false);
    };
    Ok(hashes_match(
        &hash_password(password, &admin.password_salt),
        &admin.password_hash,
    ))
}

// ============================================================================
// SESSIONS
// ============================================================================

/// Live admin sessions: token → expiry
pub struct SessionStore {
    sessions: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn create(&self, now: DateTime<Utc>) -> Result<String> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.lock().map_err(|_| anyhow!("session lock poisoned"))?;
        sessions.retain(|_, expires| *expires > now);
        sessions.insert(token.clone(), now + self.ttl);
        Ok(token)
    }

    pub fn is_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.sessions.lock() {
            Ok(sessions) => sessions.get(token).map_or(false, |expires| *expires > now),
            Err(_) => false,
        }
    }

    pub fn revoke(&self, token: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(token);
        }
    }
}

// ============================================================================
// COOKIES
// ============================================================================

pub fn session_cookie(token: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// Session token from a `Cookie` request header
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
    })
}
