use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::now_rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Admin" => Some(Role::Admin),
            "Teacher" => Some(Role::Teacher),
            "Student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Caller identity resolved from a bearer token for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
    pub school_id: String,
}

impl Session {
    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn is_self(&self, role: Role, id: &str) -> bool {
        self.role == role && self.user_id == id
    }
}

pub fn hash_password(plain: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plain, cost)
}

/// A malformed stored hash is treated as a mismatch.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match bcrypt::verify(plain, hash) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash could not be verified");
            false
        }
    }
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issues a fresh opaque token. Only its digest is persisted.
pub fn issue_token(conn: &Connection, session: &Session) -> rusqlite::Result<String> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    conn.execute(
        "INSERT INTO auth_tokens(token_hash, owner_id, role, school_id, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            token_digest(&token),
            &session.user_id,
            session.role.as_str(),
            &session.school_id,
            now_rfc3339(),
        ),
    )?;
    Ok(token)
}

pub fn resolve_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<Session>> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT owner_id, role, school_id FROM auth_tokens WHERE token_hash = ?",
            [token_digest(token)],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    Ok(row.and_then(|(user_id, role, school_id)| {
        Role::parse(&role).map(|role| Session {
            user_id,
            role,
            school_id,
        })
    }))
}

pub fn revoke_token(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM auth_tokens WHERE token_hash = ?",
        [token_digest(token)],
    )?;
    Ok(n > 0)
}

/// Strips an optional `Bearer ` prefix.
pub fn bearer_value(raw: &str) -> Option<&str> {
    let t = raw.trim_start();
    let t = t.strip_prefix("Bearer ").unwrap_or(t).trim();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}
