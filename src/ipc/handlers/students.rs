use crate::calc::{self, SortDir, SortKey, SortSpec, StudentQuery};
use crate::db::Collection;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    action_err, db_conn, loaded_records, required_scope, required_str, workspace_mut,
};
use crate::ipc::types::{AppState, Request};
use crate::records::NewStudent;
use crate::sheet::parse_int_prefix;
use serde_json::{json, Value};
use std::collections::BTreeMap;

struct ListQuery {
    query: StudentQuery,
    page: usize,
    page_size: Option<usize>,
}

fn parse_search(v: Option<&Value>) -> Result<Option<String>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.search must be string or null".to_string());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

fn parse_sort_by(v: Option<&Value>) -> Result<Option<SortKey>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.sortBy must be a string".to_string());
    };
    SortKey::parse(raw)
        .map(Some)
        .ok_or_else(|| "query.sortBy must be one of: name, rollNo, average".to_string())
}

fn parse_sort_dir(v: Option<&Value>) -> Result<SortDir, String> {
    let Some(value) = v else {
        return Ok(SortDir::Asc);
    };
    let Some(raw) = value.as_str() else {
        return Err("query.sortDir must be a string".to_string());
    };
    if raw.eq_ignore_ascii_case("asc") {
        Ok(SortDir::Asc)
    } else if raw.eq_ignore_ascii_case("desc") {
        Ok(SortDir::Desc)
    } else {
        Err("query.sortDir must be one of: asc, desc".to_string())
    }
}

fn parse_page(v: Option<&Value>) -> Result<usize, String> {
    let Some(value) = v else {
        return Ok(1);
    };
    let Some(page) = value.as_u64() else {
        return Err("query.page must be a positive integer".to_string());
    };
    if page == 0 {
        return Err("query.page must be >= 1".to_string());
    }
    Ok(usize::try_from(page).unwrap_or(usize::MAX))
}

fn parse_page_size(v: Option<&Value>) -> Result<Option<usize>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    let Some(size) = value.as_u64() else {
        return Err("query.pageSize must be a positive integer".to_string());
    };
    if size == 0 || size > 500 {
        return Err("query.pageSize must be in range 1..=500".to_string());
    }
    Ok(Some(size as usize))
}

fn parse_list_query(req: &Request) -> Result<ListQuery, Value> {
    let query = req
        .params
        .get("query")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let bad = |msg: String| err(&req.id, "bad_params", msg, None);

    let search = parse_search(query.get("search")).map_err(bad)?;
    let key = parse_sort_by(query.get("sortBy")).map_err(bad)?;
    let direction = parse_sort_dir(query.get("sortDir")).map_err(bad)?;
    let page = parse_page(query.get("page")).map_err(bad)?;
    let page_size = parse_page_size(query.get("pageSize")).map_err(bad)?;

    Ok(ListQuery {
        query: StudentQuery {
            search,
            sort: key.map(|key| SortSpec { key, direction }),
        },
        page,
        page_size,
    })
}

fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let Some(start) = page.saturating_sub(1).checked_mul(page_size) else {
        return Vec::new();
    };
    if start >= items.len() {
        return Vec::new();
    }
    let end = start.saturating_add(page_size).min(items.len());
    items[start..end].to_vec()
}

/// Accepts integers, floats (truncated) and numeric strings; anything else
/// is 0.
fn lenient_mark(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => parse_int_prefix(s).unwrap_or(0),
        _ => 0,
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let list = match parse_list_query(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let page_size = list
        .page_size
        .unwrap_or_else(|| setup::load_display(conn).page_size);
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let subjects = records.subjects(&scope.batch_id, scope.semester);
    let total_count = calc::scope_students(&records.students, &scope).len();
    let filtered = calc::filter_students(&records.students, &scope, &list.query, subjects);
    let page_rows = paginate(&filtered, list.page, page_size);
    let rows = page_rows
        .iter()
        .map(|s| {
            let mut row = json!(s);
            row["percentage"] = json!(calc::round_off_2_decimals(calc::overall_percentage(
                s, subjects
            )));
            row
        })
        .collect::<Vec<_>>();

    ok(
        &req.id,
        json!({
            "subjects": subjects,
            "rows": rows,
            "totalCount": total_count,
            "filteredCount": filtered.len(),
            "page": list.page,
            "pageSize": page_size,
            "pageCount": filtered.len().div_ceil(page_size)
        }),
    )
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let roll_no = match required_str(req, "rollNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let marks = match req.params.get("marks") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(m)) => m
            .iter()
            .map(|(k, v)| (k.clone(), lenient_mark(v)))
            .collect(),
        Some(_) => return err(&req.id, "bad_params", "marks must be an object", None),
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match records.add_student(
        &scope,
        NewStudent {
            name,
            roll_no,
            marks,
        },
    ) {
        Ok(s) => s.clone(),
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &[Collection::Students]);
    ok(
        &req.id,
        json!({ "student": student, "persisted": persisted }),
    )
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = records.remove_student(&student_id) {
        return action_err(req, e);
    }
    let persisted = records.save(conn, &[Collection::Students]);
    ok(&req.id, json!({ "ok": true, "persisted": persisted }))
}

fn handle_students_update_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(value) = req.params.get("value").map(lenient_mark) else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match records.set_mark(&student_id, &subject, value) {
        Ok(s) => s.clone(),
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &[Collection::Students]);
    ok(
        &req.id,
        json!({ "student": student, "persisted": persisted }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.updateMark" => Some(handle_students_update_mark(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_mark_truncates_and_defaults_to_zero() {
        assert_eq!(lenient_mark(&json!(88)), 88);
        assert_eq!(lenient_mark(&json!(72.9)), 72);
        assert_eq!(lenient_mark(&json!("65")), 65);
        assert_eq!(lenient_mark(&json!("abc")), 0);
        assert_eq!(lenient_mark(&json!(null)), 0);
    }

    #[test]
    fn paginate_clamps_to_available_rows() {
        let items = (1..=25).collect::<Vec<_>>();
        assert_eq!(paginate(&items, 1, 10), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(&items, 3, 10), vec![21, 22, 23, 24, 25]);
        assert!(paginate(&items, 4, 10).is_empty());
    }

    #[test]
    fn paginate_far_past_the_end_is_empty() {
        let items = (1..=25).collect::<Vec<_>>();
        assert!(paginate(&items, usize::MAX, 10).is_empty());
        assert!(paginate(&items, usize::MAX / 10 + 2, 10).is_empty());
        assert_eq!(paginate(&items, 1, usize::MAX), items);
    }

    #[test]
    fn parse_page_accepts_any_positive_integer() {
        assert_eq!(parse_page(None), Ok(1));
        assert_eq!(parse_page(Some(&json!(u64::MAX))).map(|p| p >= 1), Ok(true));
        assert!(parse_page(Some(&json!(0))).is_err());
        assert!(parse_page(Some(&json!(-1))).is_err());
    }
}
