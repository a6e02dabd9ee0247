mod support;

use serde_json::json;
use support::Sidecar;

fn counselor(sc: &mut Sidecar) -> String {
    sc.create_user(json!({
        "name": "Bu Ratna",
        "email": "ratna@bk.sch.id",
        "role": "COUNSELOR"
    }))
}

#[test]
fn home_visit_create_update_delete() {
    let mut sc = Sidecar::start("sekolah-home-visits");
    let bk = counselor(&mut sc);
    let student = sc.create_student("Andi Wijaya", "XI IPA 2");

    let created = sc.ok(
        "homeVisits.create",
        json!({
            "actorId": bk,
            "studentId": student,
            "date": "2024-09-10",
            "purpose": "Absensi rendah",
            "parentName": "Ibu Wijaya",
            "address": "Jl. Melati 7",
            "findings": "Membantu orang tua berjualan",
            "status": "PLANNED"
        }),
    );
    let visit = &created["visit"];
    assert_eq!(visit["counselorId"], json!(bk));
    assert_eq!(visit["student"]["name"], json!("Andi Wijaya"));
    assert_eq!(visit["recommendations"], json!(null));
    let visit_id = visit["id"].as_str().expect("visit id").to_string();

    let updated = sc.ok(
        "homeVisits.update",
        json!({
            "visitId": visit_id,
            "status": "COMPLETED",
            "recommendations": "Jadwal belajar sore"
        }),
    );
    assert_eq!(updated["visit"]["status"], json!("COMPLETED"));
    assert_eq!(updated["visit"]["recommendations"], json!("Jadwal belajar sore"));
    assert_eq!(updated["visit"]["purpose"], json!("Absensi rendah"));

    let listed = sc.ok("homeVisits.list", json!({}));
    assert_eq!(listed["visits"].as_array().map(|v| v.len()), Some(1));

    let deleted = sc.ok("homeVisits.delete", json!({ "visitId": visit_id }));
    assert_eq!(deleted, json!({ "success": true }));

    let again = sc.fail("homeVisits.delete", json!({ "visitId": visit_id }));
    assert_eq!(again["code"], json!("not_found"));
}

#[test]
fn home_visit_requires_a_student_and_known_status() {
    let mut sc = Sidecar::start("sekolah-home-visits-validation");
    let bk = counselor(&mut sc);
    let teacher = sc.create_teacher("Pak Yusuf");

    let base = json!({
        "actorId": bk,
        "studentId": teacher,
        "date": "2024-09-10",
        "purpose": "Kunjungan",
        "parentName": "Bapak",
        "address": "Jl. Mawar 1",
        "findings": "-",
        "status": "PLANNED"
    });
    let not_student = sc.fail("homeVisits.create", base.clone());
    assert_eq!(not_student["code"], json!("bad_params"));

    let mut unknown = base.clone();
    unknown["studentId"] = json!("ghost");
    let unknown = sc.fail("homeVisits.create", unknown);
    assert_eq!(unknown["code"], json!("not_found"));

    let mut bad_status = base;
    bad_status["status"] = json!("DONE");
    let bad_status = sc.fail("homeVisits.create", bad_status);
    assert_eq!(bad_status["code"], json!("bad_params"));
}
