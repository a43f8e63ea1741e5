#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar(data_dir: &std::path::Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .arg("--stdio")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--bcrypt-cost")
        .arg("4")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    token: Option<&str>,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(t) = token {
        payload["token"] = json!(t);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    token: Option<&str>,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params, token);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Returns the error code of a request that is expected to fail.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    token: Option<&str>,
) -> String {
    let value = request(stdin, reader, id, method, params, token);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

/// One admin, one class with two subjects (3 and 2 sessions), one student.
pub struct School {
    pub admin_id: String,
    pub admin_token: String,
    pub class_id: String,
    pub maths_id: String,
    pub science_id: String,
    pub student_id: String,
    pub student_token: String,
}

pub fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    tag: &str,
) -> School {
    let admin = request_ok(
        stdin,
        reader,
        "seed-1",
        "admin.register",
        json!({
            "name": "Head",
            "email": format!("head-{}@school.test", tag),
            "password": "admin-pw",
            "schoolName": format!("School {}", tag),
        }),
        None,
    );
    let admin_id = str_field(&admin, "id");
    let admin_token = str_field(&admin, "token");

    let class = request_ok(
        stdin,
        reader,
        "seed-2",
        "sclass.create",
        json!({ "sclassName": "7A" }),
        Some(&admin_token),
    );
    let class_id = str_field(&class, "id");

    let subjects = request_ok(
        stdin,
        reader,
        "seed-3",
        "subject.create",
        json!({
            "sclassName": class_id,
            "subjects": [
                { "subName": "Maths", "subCode": "M7", "sessions": 3 },
                { "subName": "Science", "subCode": "S7", "sessions": 2 }
            ]
        }),
        Some(&admin_token),
    );
    let subjects = subjects.as_array().expect("subjects array");
    let maths_id = str_field(&subjects[0], "id");
    let science_id = str_field(&subjects[1], "id");

    let student = request_ok(
        stdin,
        reader,
        "seed-4",
        "student.register",
        json!({
            "name": "Asha",
            "rollNum": 1,
            "password": "student-pw",
            "sclassName": class_id,
        }),
        Some(&admin_token),
    );
    let student_id = str_field(&student, "id");

    let login = request_ok(
        stdin,
        reader,
        "seed-5",
        "student.login",
        json!({ "rollNum": 1, "studentName": "Asha", "password": "student-pw" }),
        None,
    );
    let student_token = str_field(&login, "token");

    School {
        admin_id,
        admin_token,
        class_id,
        maths_id,
        science_id,
        student_id,
        student_token,
    }
}
