mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, select_workspace, shutdown, spawn_sidecar, temp_dir};

fn names(result: &serde_json::Value) -> Vec<String> {
    result["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| r["name"].as_str().expect("name").to_string())
        .collect()
}

fn list(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    query: serde_json::Value,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "students.list",
        json!({ "batchId": "2022", "semester": 1, "section": "1A", "query": query }),
    )
}

#[test]
fn list_filters_by_scope_and_search_then_sorts_and_pages() {
    let workspace = temp_dir("marksheet-students-list");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let roster = [
        ("1A", "charlie", "R3", 60),
        ("1A", "Alice", "R10", 90),
        ("1A", "bob", "R2", 30),
        ("1B", "Alicia", "R4", 80),
    ];
    for (i, (section, name, roll, math)) in roster.into_iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "students.create",
            json!({
                "batchId": "2022",
                "semester": 1,
                "section": section,
                "name": name,
                "rollNo": roll,
                "marks": { "Mathematics": math }
            }),
        );
    }

    let all = list(&mut stdin, &mut reader, "1", json!({}));
    assert_eq!(names(&all), vec!["charlie", "Alice", "bob"]);
    assert_eq!(all["totalCount"], json!(3));
    assert_eq!(all["filteredCount"], json!(3));
    assert_eq!(all["pageSize"], json!(10));
    assert_eq!(all["pageCount"], json!(1));
    assert_eq!(all["subjects"].as_array().map(|a| a.len()), Some(5));
    // 90 of 500
    assert_eq!(all["rows"][1]["percentage"], json!(18.0));

    let by_name = list(&mut stdin, &mut reader, "2", json!({ "sortBy": "name" }));
    assert_eq!(names(&by_name), vec!["Alice", "bob", "charlie"]);

    let by_roll_desc = list(
        &mut stdin,
        &mut reader,
        "3",
        json!({ "sortBy": "rollNo", "sortDir": "desc" }),
    );
    // Lexicographic: "R3" > "R2" > "R10".
    assert_eq!(names(&by_roll_desc), vec!["charlie", "bob", "Alice"]);

    let by_average = list(
        &mut stdin,
        &mut reader,
        "4",
        json!({ "sortBy": "average", "sortDir": "desc" }),
    );
    assert_eq!(names(&by_average), vec!["Alice", "charlie", "bob"]);

    let search = list(&mut stdin, &mut reader, "5", json!({ "search": "  ALI " }));
    assert_eq!(names(&search), vec!["Alice"]);
    assert_eq!(search["totalCount"], json!(3));
    assert_eq!(search["filteredCount"], json!(1));

    let by_roll_search = list(&mut stdin, &mut reader, "6", json!({ "search": "r2" }));
    assert_eq!(names(&by_roll_search), vec!["bob"]);

    let paged = list(
        &mut stdin,
        &mut reader,
        "7",
        json!({ "sortBy": "name", "page": 2, "pageSize": 2 }),
    );
    assert_eq!(names(&paged), vec!["charlie"]);
    assert_eq!(paged["pageCount"], json!(2));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "students.list",
            json!({ "batchId": "2022", "semester": 1, "section": "1A", "query": { "sortBy": "grade" } })
        ),
        "bad_params"
    );

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_update_and_delete_students() {
    let workspace = temp_dir("marksheet-students-crud");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "1",
            "students.create",
            json!({ "batchId": "2022", "semester": 1, "section": "1A", "name": " ", "rollNo": "R1" })
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "students.create",
            json!({ "batchId": "2022", "semester": 9, "section": "9A", "name": "Ola", "rollNo": "R1" })
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "students.create",
            json!({ "batchId": "1999", "semester": 1, "section": "1A", "name": "Ola", "rollNo": "R1" })
        ),
        "not_found"
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "batchId": "2022",
            "semester": 1,
            "section": "1A",
            "name": "Ola",
            "rollNo": "R1",
            "marks": { "Mathematics": "77", "Physics": 140 }
        }),
    );
    let student = &created["student"];
    assert_eq!(student["batch"], json!("2022"));
    assert_eq!(student["section"], json!("1A"));
    assert_eq!(student["marks"]["Mathematics"], json!(77));
    assert_eq!(student["marks"]["Physics"], json!(100));
    let id = student["id"].as_str().expect("id").to_string();

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.updateMark",
        json!({ "studentId": id, "subject": "Chemistry", "value": -5 }),
    );
    assert_eq!(updated["student"]["marks"]["Chemistry"], json!(0));

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.delete",
        json!({ "studentId": id }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "students.updateMark",
            json!({ "studentId": id, "subject": "Chemistry", "value": 5 })
        ),
        "not_found"
    );
    let empty = list(&mut stdin, &mut reader, "8", json!({}));
    assert_eq!(empty["rows"], json!([]));
    assert_eq!(empty["pageCount"], json!(0));

    shutdown(child, stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn huge_page_number_returns_an_empty_page() {
    let workspace = temp_dir("marksheet-students-huge-page");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "students.create",
        json!({ "batchId": "2022", "semester": 1, "section": "1A", "name": "Alice", "rollNo": "R1" }),
    );
    let page = list(&mut stdin, &mut reader, "l1", json!({ "page": u64::MAX }));
    assert!(names(&page).is_empty());
    assert_eq!(page["filteredCount"], 1);

    let health = request_ok(&mut stdin, &mut reader, "h1", "health", json!({}));
    assert!(health["version"].is_string());
    shutdown(child, stdin);
}
