#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

pub const CSV_HEADER: &str = "dni,apellidos,nombres,materia,nota_parcial,recuperatorio,porcentaje_asistencia,porcentaje_tp_aprobados,diario_clase,condicion";

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

fn sidecar_command() -> Command {
    let exe = env!("CARGO_BIN_EXE_gradelookupd");
    let mut cmd = Command::new(exe);
    cmd.env_remove("GRADELOOKUP_WORKSPACE")
        .env_remove("GRADELOOKUP_ADMIN_PASSWORD_SHA256")
        .env_remove("GRADELOOKUP_ENV")
        .env_remove("GRADELOOKUP_SESSION_DAYS")
        .env("GRADELOOKUP_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    cmd
}

fn spawn(mut cmd: Command) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut child = cmd.spawn().expect("spawn gradelookupd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut cmd = sidecar_command();
    cmd.env("GRADELOOKUP_ADMIN_USER", ADMIN_USER)
        .env("GRADELOOKUP_ADMIN_PASSWORD", ADMIN_PASSWORD);
    spawn(cmd)
}

/// Spawns with admin credentials plus extra environment; used for start-up checks.
pub fn spawn_sidecar_with_env(extra: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut cmd = sidecar_command();
    cmd.env("GRADELOOKUP_ADMIN_USER", ADMIN_USER)
        .env("GRADELOOKUP_ADMIN_PASSWORD", ADMIN_PASSWORD);
    for (k, v) in extra {
        cmd.env(k, v);
    }
    spawn(cmd)
}

pub fn spawn_sidecar_without_admin() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut cmd = sidecar_command();
    cmd.env_remove("GRADELOOKUP_ADMIN_USER")
        .env_remove("GRADELOOKUP_ADMIN_PASSWORD");
    spawn(cmd)
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
    value["result"].clone()
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

/// Selects a fresh workspace and logs in; returns the admin token.
pub fn setup_admin(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let login = request_ok(
        stdin,
        reader,
        "setup-login",
        "auth.login",
        json!({ "username": ADMIN_USER, "password": ADMIN_PASSWORD }),
    );
    login["token"].as_str().expect("token").to_string()
}

pub fn student(dni: &str, apellidos: &str, nombres: &str) -> serde_json::Value {
    json!({
        "dni": dni,
        "apellidos": apellidos,
        "nombres": nombres,
        "materia": "Historia",
        "nota_parcial": "7",
        "recuperatorio": "",
        "porcentaje_asistencia": 85,
        "porcentaje_tp_aprobados": "",
        "diario_clase": "Completo",
        "condicion": "REGULAR"
    })
}
