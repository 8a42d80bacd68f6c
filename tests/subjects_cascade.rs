mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, shutdown, spawn_sidecar, temp_dir};

fn subject_names(result: &serde_json::Value) -> Vec<String> {
    result["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .map(|s| s["name"].as_str().expect("name").to_string())
        .collect()
}

#[test]
fn subject_create_backfills_and_delete_strips_marks() {
    let workspace = temp_dir("marksheet-subjects-cascade");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let mut ids = Vec::new();
    for (i, (section, roll)) in [("2A", "R1"), ("2B", "R2")].into_iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "students.create",
            json!({
                "batchId": "2023",
                "semester": 2,
                "section": section,
                "name": format!("Student {}", roll),
                "rollNo": roll,
                "marks": { "Physics": 64 }
            }),
        );
        ids.push(created["student"]["id"].as_str().expect("id").to_string());
    }

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.create",
        json!({ "batchId": "2023", "semester": 2, "section": "2A", "name": "Statistics", "maxMarks": 50 }),
    );
    assert_eq!(
        subject_names(&created),
        vec!["Mathematics", "Physics", "Chemistry", "Programming", "English", "Statistics"]
    );
    assert_eq!(created["subjects"][5]["maxMarks"], json!(50));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "subjects.create",
            json!({ "batchId": "2023", "semester": 2, "section": "2A", "name": "Statistics" })
        ),
        "conflict"
    );

    let section_a = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.list",
        json!({ "batchId": "2023", "semester": 2, "section": "2A" }),
    );
    assert_eq!(section_a["rows"][0]["marks"]["Statistics"], json!(0));
    let section_b = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "batchId": "2023", "semester": 2, "section": "2B" }),
    );
    assert!(section_b["rows"][0]["marks"].get("Statistics").is_none());

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.delete",
        json!({ "batchId": "2023", "semester": 2, "name": "Physics" }),
    );
    assert!(!subject_names(&removed).contains(&"Physics".to_string()));
    for (i, section) in ["2A", "2B"].into_iter().enumerate() {
        let listed = request_ok(
            &mut stdin,
            &mut reader,
            &format!("l{}", i),
            "students.list",
            json!({ "batchId": "2023", "semester": 2, "section": section }),
        );
        assert!(listed["rows"][0]["marks"].get("Physics").is_none());
    }

    // Other semesters keep their list.
    let sem1 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.list",
        json!({ "batchId": "2023", "semester": 1 }),
    );
    assert!(subject_names(&sem1).contains(&"Physics".to_string()));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "subjects.delete",
            json!({ "batchId": "2023", "semester": 2, "name": "Physics" })
        ),
        "not_found"
    );

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn max_marks_update_and_last_subject_guard() {
    let workspace = temp_dir("marksheet-subjects-max");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.updateMaxMarks",
        json!({ "batchId": "2021", "semester": 1, "name": "English", "maxMarks": 75 }),
    );
    assert_eq!(updated["subjects"][4], json!({ "name": "English", "maxMarks": 75 }));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "subjects.updateMaxMarks",
            json!({ "batchId": "2021", "semester": 1, "name": "English", "maxMarks": 0 })
        ),
        "bad_params"
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "batchId": "2021", "semester": 1, "section": "1A", "name": "Mo", "rollNo": "R1" }),
    );
    let student_id = student["student"]["id"].as_str().expect("id").to_string();
    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.updateMark",
        json!({ "studentId": student_id, "subject": "English", "value": 90 }),
    );
    assert_eq!(marked["student"]["marks"]["English"], json!(75));

    for (i, name) in ["Mathematics", "Physics", "Chemistry", "Programming"]
        .into_iter()
        .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            "subjects.delete",
            json!({ "batchId": "2021", "semester": 1, "name": name }),
        );
    }
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "5",
            "subjects.delete",
            json!({ "batchId": "2021", "semester": 1, "name": "English" })
        ),
        "last_remaining"
    );

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}
