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

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: PathBuf,
}

impl Sidecar {
    /// Spawns the daemon without selecting a workspace.
    pub fn spawn(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let exe = env!("CARGO_BIN_EXE_sekolahd");
        let mut child = Command::new(exe)
            .current_dir(&workspace)
            .env_remove("SEKOLAHD_WORKSPACE")
            .env_remove("SEKOLAHD_DEFAULT_RADIUS_M")
            .env_remove("SEKOLAHD_LOG_LEVEL")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sekolahd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace,
        }
    }

    /// Spawns the daemon and selects a fresh workspace.
    pub fn start(prefix: &str) -> Self {
        let mut sidecar = Self::spawn(prefix);
        let path = sidecar.workspace.to_string_lossy().to_string();
        sidecar.ok("workspace.select", json!({ "path": path }));
        sidecar
    }

    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response");
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Sends a request that must succeed and returns its `result`.
    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value["result"].clone()
    }

    /// Sends a request that must fail and returns its error object.
    pub fn fail(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"].clone()
    }

    pub fn create_user(&mut self, body: serde_json::Value) -> String {
        let created = self.ok("users.create", body);
        created["user"]["id"].as_str().expect("user id").to_string()
    }

    pub fn create_student(&mut self, name: &str, class: &str) -> String {
        let email = format!("{}@siswa.sch.id", name.to_lowercase().replace(' ', "."));
        self.create_user(json!({
            "name": name,
            "email": email,
            "role": "STUDENT",
            "nis": format!("NIS-{}", name.to_lowercase().replace(' ', "-")),
            "class": class
        }))
    }

    pub fn create_teacher(&mut self, name: &str) -> String {
        let email = format!("{}@guru.sch.id", name.to_lowercase().replace(' ', "."));
        self.create_user(json!({
            "name": name,
            "email": email,
            "role": "TEACHER",
            "nip": "198001012005011001"
        }))
    }

    pub fn create_location(&mut self, body: serde_json::Value) -> String {
        let created = self.ok("locations.create", body);
        created["location"]["id"]
            .as_str()
            .expect("location id")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.workspace);
    }
}
