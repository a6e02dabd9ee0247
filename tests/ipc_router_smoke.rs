mod support;

use serde_json::json;
use support::Sidecar;

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sc = Sidecar::start("sekolah-router-smoke");

    let health = sc.ok("health", json!({}));
    assert_eq!(health["version"], json!(env!("CARGO_PKG_VERSION")));
    assert!(health["workspacePath"].is_string());
    assert_eq!(health["databaseOpen"], json!(true));
    assert_eq!(health["defaultRadiusMeters"], json!(100.0));

    let student = sc.create_student("Lina Marpaung", "X-1");
    let teacher = sc.create_teacher("Pak Anwar");
    let gate = sc.create_location(json!({
        "name": "Gerbang",
        "latitude": -6.2,
        "longitude": 106.816666
    }));

    let calls = [
        ("users.get", json!({ "userId": student })),
        ("users.students", json!({})),
        ("users.teachers", json!({})),
        ("locations.list", json!({})),
        (
            "attendance.create",
            json!({ "actorId": student, "locationId": gate, "type": "CHECK_IN", "method": "MANUAL" }),
        ),
        ("attendance.today", json!({ "actorId": student })),
        ("attendance.history", json!({ "actorId": student })),
        ("attendance.students", json!({})),
        ("leaves.list", json!({ "actorId": teacher })),
        ("leaves.pending", json!({})),
        ("homeVisits.list", json!({})),
        ("documents.list", json!({ "actorId": student })),
        ("documents.students", json!({})),
    ];
    for (method, params) in calls {
        let value = sc.request(method, params);
        assert_eq!(value["ok"], json!(true), "{} failed: {}", method, value);
    }

    let unknown = sc.fail("grades.list", json!({}));
    assert_eq!(unknown["code"], json!("not_implemented"));
}

#[test]
fn malformed_lines_and_missing_workspace_are_reported() {
    let mut sc = Sidecar::spawn("sekolah-router-errors");

    let bad = sc.send_raw("{not json");
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_json"));

    let no_ws = sc.fail("users.teachers", json!({}));
    assert_eq!(no_ws["code"], json!("no_workspace"));

    let no_path = sc.fail("workspace.select", json!({}));
    assert_eq!(no_path["code"], json!("bad_params"));

    let health = sc.ok("health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));
    assert_eq!(health["databaseOpen"], json!(false));
}

#[test]
fn users_registration_rules() {
    let mut sc = Sidecar::start("sekolah-users");

    let no_nis = sc.fail(
        "users.create",
        json!({ "name": "A", "email": "a@x.id", "role": "STUDENT", "class": "X-1" }),
    );
    assert_eq!(no_nis["code"], json!("bad_params"));

    let no_nip = sc.fail(
        "users.create",
        json!({ "name": "B", "email": "b@x.id", "role": "TEACHER" }),
    );
    assert_eq!(no_nip["code"], json!("bad_params"));

    let bad_role = sc.fail(
        "users.create",
        json!({ "name": "C", "email": "c@x.id", "role": "JANITOR" }),
    );
    assert_eq!(bad_role["code"], json!("bad_params"));

    let admin = sc.create_user(json!({ "name": "Admin", "email": "Admin@X.id", "role": "ADMIN" }));
    let profile = sc.ok("users.get", json!({ "userId": admin }));
    assert_eq!(profile["user"]["email"], json!("admin@x.id"));
    assert_eq!(profile["user"]["role"], json!("ADMIN"));

    let dup = sc.fail(
        "users.create",
        json!({ "name": "Admin 2", "email": "admin@x.id", "role": "ADMIN" }),
    );
    assert_eq!(dup["code"], json!("bad_params"));

    sc.create_student("Zaki", "X-2");
    sc.create_student("Ayu", "X-1");
    let x1 = sc.ok("users.students", json!({ "class": "X-1" }));
    pretty_assertions::assert_eq!(
        x1["students"],
        json!([{
            "id": x1["students"][0]["id"],
            "name": "Ayu",
            "nis": "NIS-ayu",
            "class": "X-1",
            "email": "ayu@siswa.sch.id"
        }])
    );

    let missing = sc.fail("users.get", json!({ "userId": "ghost" }));
    assert_eq!(missing["code"], json!("not_found"));
}

#[test]
fn documents_record_metadata_per_owner() {
    let mut sc = Sidecar::start("sekolah-documents");
    let a = sc.create_student("Maya", "XII-1");
    let b = sc.create_student("Rudi", "XII-2");

    let created = sc.ok(
        "documents.create",
        json!({
            "actorId": a,
            "title": "Surat Dokter",
            "fileUrl": "https://files.example/surat.pdf",
            "type": "MEDICAL"
        }),
    );
    assert_eq!(created["document"]["fileUrl"], json!("https://files.example/surat.pdf"));
    assert_eq!(created["document"]["userId"], json!(a));

    sc.ok(
        "documents.create",
        json!({ "actorId": b, "title": "Rapor", "fileUrl": "https://files.example/rapor.pdf", "type": "REPORT" }),
    );

    let mine = sc.ok("documents.list", json!({ "actorId": a }));
    assert_eq!(mine["documents"].as_array().map(|v| v.len()), Some(1));

    let xii2 = sc.ok("documents.students", json!({ "class": "XII-2" }));
    let rows = xii2["documents"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], json!("Rapor"));
    assert_eq!(rows[0]["user"]["name"], json!("Rudi"));

    let blank = sc.fail(
        "documents.create",
        json!({ "actorId": a, "title": "", "fileUrl": "x", "type": "y" }),
    );
    assert_eq!(blank["code"], json!("bad_params"));
}
