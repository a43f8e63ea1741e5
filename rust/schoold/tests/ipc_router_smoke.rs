mod test_support;

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar, str_field, temp_dir};

fn send_raw(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, line: &str) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    serde_json::from_str(out.trim()).expect("parse response json")
}

#[test]
fn router_dispatch_smoke() {
    let workspace = temp_dir("schoold-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}), None);
    assert!(health.get("version").is_some());
    assert!(workspace.join("school.sqlite3").exists());

    let bad = send_raw(&mut stdin, &mut reader, "{not json");
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        bad.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_json")
    );

    // Deletes are refused before authentication.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "student.delete",
        json!({ "id": "x" }),
        None,
    );
    assert_eq!(code, "delete_disabled");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "sclass.create",
        json!({ "sclassName": "1A" }),
        None,
    );
    assert_eq!(code, "unauthorized");

    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "admin.register",
        json!({
            "name": "Smoke",
            "email": "smoke@school.test",
            "password": "pw",
            "schoolName": "Smoke School"
        }),
        None,
    );
    let token = str_field(&admin, "token");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "grades.explode",
        json!({}),
        Some(&token),
    );
    assert_eq!(code, "not_implemented");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "student.get",
        json!({ "id": "nobody" }),
        Some(&token),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let status = child.wait().expect("wait for exit");
    assert!(status.success());
}

#[test]
fn data_survives_restart() {
    let workspace = temp_dir("schoold-router-restart");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "admin.register",
            json!({
                "name": "Keep",
                "email": "keep@school.test",
                "password": "keep-pw",
                "schoolName": "Keep School"
            }),
            None,
        );
        drop(stdin);
        let _ = child.wait();
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admin.login",
        json!({ "email": "keep@school.test", "password": "keep-pw" }),
        None,
    );
    assert_eq!(str_field(&login, "schoolName"), "Keep School");
}
