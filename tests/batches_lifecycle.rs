mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, shutdown, spawn_sidecar, temp_dir};

fn batch_ids(list: &serde_json::Value) -> Vec<String> {
    list["batches"]
        .as_array()
        .expect("batches")
        .iter()
        .map(|b| b["id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn fresh_workspace_lists_seed_batches_with_unique_counts() {
    let workspace = temp_dir("marksheet-batches-seed");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let selected = select_workspace(&mut stdin, &mut reader, &workspace);
    assert_eq!(
        selected["seeded"],
        json!(["batches", "subjects", "students"])
    );

    // Same roll number in two semesters counts once.
    for (i, (sem, section, name, roll)) in [
        (1, "1A", "Asha", "R1"),
        (2, "2A", "Asha", "R1"),
        (1, "1B", "Ben", "R2"),
    ]
    .into_iter()
    .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "students.create",
            json!({
                "batchId": "2022",
                "semester": sem,
                "section": section,
                "name": name,
                "rollNo": roll
            }),
        );
    }

    let list = request_ok(&mut stdin, &mut reader, "1", "batches.list", json!({}));
    assert_eq!(batch_ids(&list), vec!["2021", "2022", "2023"]);
    let b2022 = &list["batches"][1];
    assert_eq!(b2022["name"], json!("2022 Batch"));
    assert_eq!(b2022["startYear"], json!(2022));
    assert_eq!(b2022["active"], json!(true));
    assert_eq!(b2022["semesters"], json!(6));
    assert_eq!(b2022["uniqueStudentCount"], json!(2));
    assert_eq!(list["batches"][0]["uniqueStudentCount"], json!(0));

    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sections.list",
        json!({ "batchId": "2022", "semester": 3 }),
    );
    assert_eq!(sections["sections"], json!(["3A", "3B", "3C"]));

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_and_delete_batches_with_validation() {
    let workspace = temp_dir("marksheet-batches-crud");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "batches.create",
        json!({ "id": "2024", "semesters": 3 }),
    );
    assert_eq!(created["batch"]["id"], json!("2024"));
    assert_eq!(created["batch"]["semesters"], json!(3));
    assert_eq!(created["persisted"], json!(true));

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.list",
        json!({ "batchId": "2024", "semester": 3 }),
    );
    assert_eq!(subjects["subjects"].as_array().map(|a| a.len()), Some(5));

    // Numeric ids are accepted and the setup default applies.
    let defaulted = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "batches.create",
        json!({ "id": 2025 }),
    );
    assert_eq!(defaulted["batch"]["semesters"], json!(6));

    assert_eq!(
        request_err(&mut stdin, &mut reader, "4", "batches.create", json!({ "id": "2024" })),
        "conflict"
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "5", "batches.create", json!({ "id": "next" })),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "6",
            "batches.create",
            json!({ "id": "2030", "semesters": 13 })
        ),
        "bad_params"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "batchId": "2024", "semester": 1, "section": "1A", "name": "Kai", "rollNo": "R1" }),
    );
    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "batches.delete",
        json!({ "batchId": "2024" }),
    );
    assert_eq!(deleted["removedStudents"], json!(1));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "batches.delete",
            json!({ "batchId": "2024" })
        ),
        "not_found"
    );

    for (i, id) in ["2021", "2022", "2023"].into_iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            "batches.delete",
            json!({ "batchId": id }),
        );
    }
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "10",
            "batches.delete",
            json!({ "batchId": "2025" })
        ),
        "last_remaining"
    );

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn semesters_add_up_to_twelve_and_remove_cascades() {
    let workspace = temp_dir("marksheet-batches-semesters");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "batches.create",
        json!({ "id": "2024", "semesters": 11 }),
    );
    let grown = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "batches.addSemester",
        json!({ "batchId": "2024" }),
    );
    assert_eq!(grown["batch"]["semesters"], json!(12));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "batches.addSemester",
            json!({ "batchId": "2024" })
        ),
        "limit_reached"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "batchId": "2024", "semester": 12, "section": "12A", "name": "Lee", "rollNo": "R9" }),
    );
    let shrunk = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "batches.removeSemester",
        json!({ "batchId": "2024" }),
    );
    assert_eq!(shrunk["batch"]["semesters"], json!(11));
    assert_eq!(shrunk["removedStudents"], json!(1));

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.list",
        json!({ "batchId": "2024", "semester": 12 }),
    );
    assert_eq!(subjects["subjects"], json!([]));

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "batches.create",
        json!({ "id": "2026", "semesters": 1 }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "batches.removeSemester",
            json!({ "batchId": "2026" })
        ),
        "last_remaining"
    );

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}
