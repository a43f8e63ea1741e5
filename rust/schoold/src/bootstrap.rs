use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::auth;
use crate::config::Config;
use crate::db::{now_rfc3339, school_name_taken};

/// Seeds a first admin when the bootstrap flags are set and no admin with
/// that email exists yet. Returns the admin id when one was created.
pub fn initialize_admin(conn: &Connection, cfg: &Config) -> Result<Option<String>> {
    let (Some(email), Some(password)) = (
        cfg.bootstrap_admin_email.as_deref(),
        cfg.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(None);
    };
    let email = email.trim().to_lowercase();

    let existing: Option<String> = conn
        .query_row("SELECT id FROM admins WHERE email = ?", [&email], |r| r.get(0))
        .optional()
        .context("failed to check existing admin")?;
    if existing.is_some() {
        tracing::info!(email = %email, "bootstrap admin already exists, skipping");
        return Ok(None);
    }

    if school_name_taken(conn, &cfg.bootstrap_school_name, None)
        .context("failed to check bootstrap school name")?
    {
        bail!(
            "bootstrap school name {:?} is already registered",
            cfg.bootstrap_school_name
        );
    }

    let hash = auth::hash_password(password, cfg.bcrypt_cost)
        .context("failed to hash bootstrap admin password")?;
    let admin_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO admins(id, name, email, password_hash, school_name, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &admin_id,
            "Administrator",
            &email,
            &hash,
            &cfg.bootstrap_school_name,
            now_rfc3339(),
        ),
    )
    .context("failed to insert bootstrap admin")?;

    tracing::info!(admin_id = %admin_id, email = %email, school = %cfg.bootstrap_school_name, "bootstrap admin created");
    tracing::warn!("change the bootstrap admin password after first login");
    Ok(Some(admin_id))
}
