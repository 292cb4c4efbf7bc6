mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradelookup-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert_eq!(health["workspacePath"], json!(null));
    assert_eq!(health["authConfigured"], json!(true));

    // Store-backed methods need a workspace first.
    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.lookup",
        json!({ "dni": "30111222" }),
    );
    assert_eq!(error_code(&early), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("gradelookup.sqlite3").is_file());

    let families = [
        ("4", "grades.lookup", json!({ "dni": "30111222" })),
        ("5", "auth.check", json!({})),
        ("6", "visibility.list", json!({})),
        ("7", "students.list", json!({})),
        ("8", "students.importCsv", json!({ "csvText": "" })),
    ];
    for (id, method, params) in families {
        let resp = request(&mut stdin, &mut reader, id, method, params);
        assert_ne!(
            error_code(&resp),
            Some("not_implemented"),
            "unexpected unknown method for {}",
            method
        );
    }

    let unknown = request(&mut stdin, &mut reader, "9", "classes.list", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let missing_path = request(&mut stdin, &mut reader, "10", "workspace.select", json!({}));
    assert_eq!(error_code(&missing_path), Some("bad_params"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let garbage: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&garbage), Some("bad_json"));

    // The loop keeps serving after a bad line.
    let _ = request_ok(&mut stdin, &mut reader, "11", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}
