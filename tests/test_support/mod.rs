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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_coverd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn coverd");
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
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
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
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Sends a request that must fail; returns the error object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

/// Opens a fresh workspace seeded with a small staff room and timetable.
///
/// Staff: `s1` Ada, `s2` Ben, `s3` Cy. Lessons recur weekly from Monday
/// 2024-01-08: `maths` (s1, 09:00-10:00, group 10A), `art` (s1, 11:00-12:00,
/// group 9B), `pe` (s2, 09:00-10:00, group 8C), `music` (s3, 11:00-12:00).
pub fn seeded_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (id, name) in [("s1", "Ada"), ("s2", "Ben"), ("s3", "Cy")] {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-staff-{id}"),
            "staff.create",
            json!({ "id": id, "displayName": name }),
        );
    }
    let _ = request_ok(stdin, reader, "seed-room", "rooms.create", json!({ "id": "R1", "name": "Room 1" }));
    let _ = request_ok(
        stdin,
        reader,
        "seed-absence-type",
        "absenceTypes.create",
        json!({ "id": "sick", "name": "Sick" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-sub-type",
        "substitutionTypes.create",
        json!({ "id": "internal", "name": "Internal cover" }),
    );
    for (id, staff, group, start, end) in [
        ("maths", "s1", "10A", "09:00", "10:00"),
        ("art", "s1", "9B", "11:00", "12:00"),
        ("pe", "s2", "8C", "09:00", "10:00"),
        ("music", "s3", "7D", "11:00", "12:00"),
    ] {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-lesson-{id}"),
            "lessons.create",
            json!({
                "id": id,
                "staffId": staff,
                "title": id,
                "subjectGroupId": group,
                "roomId": "R1",
                "firstDate": "2024-01-08",
                "startTime": start,
                "endTime": end,
                "weeklyUntil": "2024-03-25",
                "attendees": [{ "type": "subjectGroup", "id": group, "displayName": group }]
            }),
        );
    }
    workspace
}
