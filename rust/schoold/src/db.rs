use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "school.sqlite3";

pub fn open_db(data_dir: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            data_dir.to_string_lossy()
        )
    })?;
    let db_path = data_dir.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // The admin id doubles as the school id for every school-scoped table.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            school_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sclasses(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES admins(id),
            UNIQUE(school_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sclasses_school ON sclasses(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            sessions INTEGER NOT NULL DEFAULT 0,
            teacher_id TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES admins(id),
            FOREIGN KEY(class_id) REFERENCES sclasses(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            UNIQUE(class_id, code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_class ON subjects(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_school ON subjects(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES admins(id),
            FOREIGN KEY(class_id) REFERENCES sclasses(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_school ON teachers(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_classes(
            teacher_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            PRIMARY KEY(teacher_id, class_id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_id) REFERENCES sclasses(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            roll_num INTEGER NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES admins(id),
            FOREIGN KEY(class_id) REFERENCES sclasses(id),
            UNIQUE(school_id, class_id, roll_num)
        )",
        [],
    )?;
    ensure_column(conn, "students", "updated_at", "TEXT")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    // `seq` keeps insertion order stable for drill-down display.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('Present', 'Absent')),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, subject_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_subject ON attendance(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_results(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            assignment REAL,
            attendance REAL,
            mid_exam REAL,
            final_exam REAL,
            marks_obtained REAL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(student_id, subject_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            title TEXT NOT NULL,
            details TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES admins(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notices_school ON notices(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS complains(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            complaint TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES admins(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_complains_school ON complains(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS auth_tokens(
            token_hash TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            role TEXT NOT NULL,
            school_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_auth_tokens_owner ON auth_tokens(owner_id)",
        [],
    )?;

    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, column)? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
        [],
    )
    .with_context(|| format!("failed to add {}.{}", table, column))?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// True when another admin already registered `school_name`.
pub fn school_name_taken(
    conn: &Connection,
    school_name: &str,
    except_admin: Option<&str>,
) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM admins WHERE school_name = ? AND id <> ?",
            (school_name, except_admin.unwrap_or("")),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().expect("open");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "students", "updated_at").expect("pragma"));
        assert!(!table_has_column(&conn, "students", "nope").expect("pragma"));
    }

    #[test]
    fn school_name_check_skips_the_owner() {
        let conn = open_in_memory().expect("open");
        conn.execute(
            "INSERT INTO admins(id, name, email, password_hash, school_name, created_at)
             VALUES('a1', 'A', 'a@x.test', 'h', 'North High', ?)",
            [now_rfc3339()],
        )
        .expect("insert admin");
        assert!(school_name_taken(&conn, "North High", None).expect("check"));
        assert!(!school_name_taken(&conn, "North High", Some("a1")).expect("check"));
        assert!(!school_name_taken(&conn, "South High", None).expect("check"));
    }
}
